//! Endpoint discovery: run the bus owner directly on serial lines and
//! report what answers.
//!
//! ```text
//!   lines ──▶ LinkSet ──▶ BusOwner ──enumerate_link──▶ Set EID ─▶ types ─▶ pool
//!                ▲            │
//!                └── pump ◀── tick ◀── Clock::sleep until settled or timeout
//! ```
//!
//! Devices that stay silent for the whole window are left out of the
//! result; their links end up `Failed` inside the owner.

use core::time::Duration;

use log::{info, warn};
use serde::Serialize;

use crate::bus::{BusOwner, BusOwnerConfig, DownstreamPool};
use crate::config::MctpConfig;
use crate::error::{LinkError, Result};
use crate::mctp::eid::{Eid, EidPool};
use crate::mctp::link::LinkSet;
use crate::mctp::transport::Transport;
use crate::mctp::{Endpoint, EndpointConfig};

use super::ports::{Clock, EventSink};

/// How long discovery waits for the bus to settle.
pub const DISCOVERY_TIMEOUT_MS: u64 = 30_000;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A remote endpoint found on one of the lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEndpoint {
    pub eid: Eid,
    pub network_id: u32,
    pub device: String,
    pub message_types: Vec<u8>,
    pub downstream: Option<DownstreamPool>,
}

/// Enumerate every line in `lines` (device name and its transport).
///
/// The owner takes the first EID of the configured dynamic range and hands
/// out the rest. Returns the endpoints that accepted an EID, ordered by EID.
pub fn discover<T, C, E>(
    config: &MctpConfig,
    lines: Vec<(String, T)>,
    clock: &mut C,
    sink: &mut E,
    timeout_ms: u64,
) -> Result<Vec<RemoteEndpoint>>
where
    T: Transport,
    C: Clock,
    E: EventSink,
{
    if lines.is_empty() {
        return Err(LinkError::NoDevices.into());
    }

    let range = config.eid_range();
    let own = Eid(*range.start());
    let mut endpoint = Endpoint::new(EndpointConfig::from_config(config, own));
    let mut links = LinkSet::new();
    let mut devices = Vec::with_capacity(lines.len());
    for (device, transport) in lines {
        let id = links.add(&mut endpoint, transport);
        devices.push((id, device));
    }

    let pool = EidPool::new(range, config.bus_owner.max_pool_size)?;
    let mut owner = BusOwner::new(endpoint, pool, BusOwnerConfig::from_config(config));
    info!("bus: discovering on {} line(s) as EID {}", devices.len(), own);

    let start = clock.now_ms();
    for (id, device) in &devices {
        if let Err(e) = owner.enumerate_link(*id, start) {
            warn!("bus: cannot enumerate {}: {}", device, e);
        }
    }

    loop {
        let now = clock.now_ms();
        links.pump(owner.endpoint_mut(), now);
        owner.tick(now, sink);
        if owner.is_settled() {
            break;
        }
        if now.saturating_sub(start) >= timeout_ms {
            warn!("bus: discovery timed out after {} ms", timeout_ms);
            break;
        }
        clock.sleep(POLL_INTERVAL);
    }

    let mut found: Vec<RemoteEndpoint> = owner
        .endpoints()
        .iter()
        .filter_map(|ep| {
            let (_, device) = devices.iter().find(|(id, _)| *id == ep.link)?;
            Some(RemoteEndpoint {
                eid: ep.eid,
                network_id: ep.network_id,
                device: device.clone(),
                message_types: ep.message_types.clone(),
                downstream: ep.downstream,
            })
        })
        .collect();
    found.sort_by_key(|ep| ep.eid);
    info!("bus: discovered {} endpoint(s)", found.len());
    Ok(found)
}
