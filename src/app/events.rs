//! Outbound bus events.
//!
//! The bus owner and the host controller emit these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them: log them, print them as JSON, or
//! collect them in tests.

use serde::Serialize;

use crate::mctp::eid::Eid;
use crate::mctp::routing::LinkId;

/// Structured events emitted while managing the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BusEvent {
    /// A serial device was bound to a new network interface.
    LinkBound {
        device: String,
        interface: String,
        eid: Eid,
    },

    /// A host link was torn down and its EID returned to the pool.
    LinkReleased { interface: String, eid: Eid },

    /// An endpoint accepted an EID.
    EndpointAssigned { link: LinkId, eid: Eid },

    /// An endpoint learned its supported message types.
    MessageTypesDiscovered { eid: Eid, types: Vec<u8> },

    /// A bridge accepted a downstream EID pool.
    PoolAllocated {
        link: LinkId,
        bridge: Eid,
        first: Eid,
        count: u8,
    },

    /// An endpoint went away with its link.
    EndpointRemoved { link: LinkId, eid: Eid },

    /// EID assignment on a link gave up.
    EnumerationFailed {
        link: LinkId,
        eid: Eid,
        reason: String,
    },

    /// The MCTP daemon was (re)started.
    ServiceRestarted { unit: String },
}
