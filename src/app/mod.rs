//! Application core: host-side bus management.
//!
//! [`controller::HostBusController`] brings up kernel MCTP links and the
//! daemon behind them. All interaction with the host happens through the
//! **port traits** in [`ports`], so the controller is testable with
//! in-memory adapters.
//!
//! [`discovery::discover`] drives the crate's own [`BusOwner`](crate::bus::BusOwner)
//! over serial lines instead, for hosts without kernel MCTP.

pub mod controller;
pub mod discovery;
pub mod events;
pub mod ports;

pub use controller::{HostBusController, HostLink};
pub use discovery::{RemoteEndpoint, discover};
pub use events::BusEvent;
