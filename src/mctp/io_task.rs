//! Async serial I/O task: a reactor-driven bridge between byte
//! transports and the control loop.
//!
//! Runs in a dedicated thread using `edge-executor` for cooperative
//! scheduling and `async-io-mini` for reactor-driven timers (no
//! busy-spinning). Two concurrent futures:
//!
//! 1. **Read**: polls every link every 1ms via reactor timer and pushes
//!    decoded packets into `RX_CHANNEL`
//! 2. **Write**: truly async via `TX_CHANNEL.receive().await`
//!    (wakes as soon as the control loop queues a packet)
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────┐
//!  │  I/O Thread                                          │
//!  │  ┌────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                  │  │
//!  │  │  ┌──────────────┐    ┌──────────────────────┐  │  │
//!  │  │  │ Read links   │    │ Write (async)        │  │  │
//!  │  │  │ 1ms ⏱        │    │ wake-on-send         │  │  │
//!  │  │  └──────────────┘    └──────────────────────┘  │  │
//!  │  └────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────┘
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::rc::Rc;

use embassy_sync::channel::TrySendError;
use log::{info, warn};

use super::channels::{InboundPacket, OutboundPacket, RX_CHANNEL, TX_CHANNEL};
use super::endpoint::Endpoint;
use super::link::SerialLink;
use super::packet::Packet;
use super::routing::LinkId;
use super::transport::Transport;

const READ_INTERVAL: Duration = Duration::from_millis(1);

static STOP: AtomicBool = AtomicBool::new(false);

type SharedLinks<T> = Rc<RefCell<Vec<(LinkId, SerialLink<T>)>>>;

// ── Async I/O loop ───────────────────────────────────────────

/// Read task. Returns once [`stop`] is called.
async fn read_loop<T: Transport>(links: SharedLinks<T>) {
    while !STOP.load(Ordering::Acquire) {
        {
            let mut links = links.borrow_mut();
            for (id, link) in links.iter_mut() {
                let id = *id;
                let result = link.poll(|packet| {
                    if RX_CHANNEL.try_send(InboundPacket { link: id, packet }).is_err() {
                        warn!("IO[{}]: rx channel full, dropping packet", id);
                    }
                });
                if let Err(e) = result {
                    warn!("IO[{}]: {}", id, e);
                }
            }
        }
        async_io_mini::Timer::after(READ_INTERVAL).await;
    }
}

/// Write task. Wakes when the control loop pushes into `TX_CHANNEL`.
async fn write_loop<T: Transport>(links: SharedLinks<T>) {
    loop {
        let out = TX_CHANNEL.receive().await;
        let mut links = links.borrow_mut();
        let Some((_, link)) = links.iter_mut().find(|(id, _)| *id == out.link) else {
            warn!("IO[{}]: unknown link, dropping packet", out.link);
            continue;
        };
        if let Err(e) = link.send_packet(&out.packet) {
            warn!("IO[{}]: write failed: {}", out.link, e);
        }
    }
}

fn run_io_loop<T: Transport>(links: Vec<(LinkId, T)>) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();

    let count = links.len();
    let links: SharedLinks<T> = Rc::new(RefCell::new(
        links
            .into_iter()
            .map(|(id, t)| (id, SerialLink::new(t)))
            .collect(),
    ));

    executor.spawn(write_loop(links.clone())).detach();

    info!("IO task started ({} link(s))", count);
    futures_lite::future::block_on(executor.run(read_loop(links)));
    info!("IO task stopped");
}

// ── Thread spawn ─────────────────────────────────────────────

/// Spawn the I/O thread. Takes ownership of the transports; link ids
/// must match those registered with the endpoint.
pub fn spawn<T>(links: Vec<(LinkId, T)>) -> std::io::Result<std::thread::JoinHandle<()>>
where
    T: Transport + Send + 'static,
{
    STOP.store(false, Ordering::Release);
    std::thread::Builder::new()
        .name("mctp-io".into())
        .spawn(move || run_io_loop(links))
}

/// Ask the I/O thread to exit after its current read pass.
pub fn stop() {
    STOP.store(true, Ordering::Release);
}

// ── Channel accessors for the control loop ───────────────────

/// Queue a packet for the I/O thread. Returns `false` if the channel
/// is full.
pub fn send_packet(link: LinkId, packet: Packet) -> bool {
    TX_CHANNEL.try_send(OutboundPacket { link, packet }).is_ok()
}

/// Try to receive an inbound packet from the I/O thread.
pub fn try_recv_packet() -> Option<InboundPacket> {
    RX_CHANNEL.try_receive().ok()
}

/// Move packets between the channels and `endpoint`. Returns the number
/// of packets moved.
pub fn pump_channels(endpoint: &mut Endpoint, now_ms: u64) -> usize {
    let mut moved = 0;
    while let Some(InboundPacket { link, packet }) = try_recv_packet() {
        match endpoint.handle_packet(link, packet, now_ms) {
            Ok(()) => moved += 1,
            Err(e) => warn!("MCTP[{}]: {}", link, e),
        }
    }
    while let Some((link, packet)) = endpoint.next_outgoing() {
        match TX_CHANNEL.try_send(OutboundPacket { link, packet }) {
            Ok(()) => moved += 1,
            Err(TrySendError::Full(out)) => {
                endpoint.unsend(out.link, out.packet);
                break;
            }
        }
    }
    moved
}
