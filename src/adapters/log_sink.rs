//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each [`BusEvent`] through the
//! `log` facade. With `json` set, events are written as one JSON object
//! per line instead, for consumption by other tools.

use log::{info, warn};

use crate::app::events::BusEvent;
use crate::app::ports::EventSink;

#[derive(Default)]
pub struct LogEventSink {
    json: bool,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json() -> Self {
        Self { json: true }
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &BusEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => info!("{line}"),
                Err(e) => warn!("EVENT | unserialisable: {e}"),
            }
            return;
        }
        match event {
            BusEvent::LinkBound {
                device,
                interface,
                eid,
            } => info!("LINK  | {device} bound as {interface}, EID {eid}"),
            BusEvent::LinkReleased { interface, eid } => {
                info!("LINK  | {interface} released, EID {eid}");
            }
            BusEvent::EndpointAssigned { link, eid } => {
                info!("EID   | link {link} assigned EID {eid}");
            }
            BusEvent::MessageTypesDiscovered { eid, types } => {
                info!("EID   | EID {eid} supports types {types:02x?}");
            }
            BusEvent::PoolAllocated {
                link,
                bridge,
                first,
                count,
            } => info!("EID   | bridge {bridge} on link {link} holds {count} EIDs from {first}"),
            BusEvent::EndpointRemoved { link, eid } => {
                info!("EID   | EID {eid} on link {link} removed");
            }
            BusEvent::EnumerationFailed { link, eid, reason } => {
                warn!("EID   | link {link} EID {eid} failed: {reason}");
            }
            BusEvent::ServiceRestarted { unit } => info!("SVC   | {unit} restarted"),
        }
    }
}
