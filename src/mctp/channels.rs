//! Inter-task packet channels.
//!
//! Uses `embassy-sync` bounded MPMC channels to bridge the async I/O
//! thread with the synchronous control loop that owns the [`Endpoint`].
//! Both sides share these static channels.
//!
//! ```text
//! ┌──────────────┐ InboundPacket  ┌──────────────┐
//! │  I/O Thread  │──────────────▶│ Control Loop │
//! │  (async)     │◀──────────────│ (sync)       │
//! └──────────────┘ OutboundPacket └──────────────┘
//! ```
//!
//! [`Endpoint`]: super::endpoint::Endpoint

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use super::packet::Packet;
use super::routing::LinkId;

/// Packet decoded from a link, delivered to the control loop.
pub struct InboundPacket {
    pub link: LinkId,
    pub packet: Packet,
}

/// Packet from the control loop, to be framed onto a link.
pub struct OutboundPacket {
    pub link: LinkId,
    pub packet: Packet,
}

/// Channel depth for inbound packets.
const RX_DEPTH: usize = 16;

/// Channel depth for outbound packets. Packets that do not fit stay in
/// the endpoint outbox until the next pump.
const TX_DEPTH: usize = 32;

/// Inbound channel: I/O thread → control loop.
pub static RX_CHANNEL: Channel<CriticalSectionRawMutex, InboundPacket, RX_DEPTH> = Channel::new();

/// Outbound channel: control loop → I/O thread.
pub static TX_CHANNEL: Channel<CriticalSectionRawMutex, OutboundPacket, TX_DEPTH> = Channel::new();
