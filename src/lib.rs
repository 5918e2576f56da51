//! MCTP serial transport, bus owner and PLDM base library.
//!
//! ```text
//!  ┌────────────────────────────────────────────────────┐
//!  │  app: HostBusController ── ports ── adapters       │
//!  ├────────────────────────────────────────────────────┤
//!  │  pldm: header · base · responder · requester       │
//!  │  bus:  BusOwner (EID assignment, discovery)        │
//!  ├────────────────────────────────────────────────────┤
//!  │  mctp: endpoint · control · assembly · routing     │
//!  │        serial framing · links · I/O thread         │
//!  └────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod bus;
pub mod config;
pub mod crc;
pub mod error;
pub mod mctp;
pub mod pldm;

pub use error::{Error, Result};
