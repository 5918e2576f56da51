//! MCTP transport layer.
//!
//! Layering, bottom to top:
//! - [`transport`] moves raw bytes
//! - [`serial`] frames packets on a byte stream
//! - [`packet`] and [`assembly`] turn packets into messages
//! - [`endpoint`] routes, reassembles and answers control requests
//! - [`link`] and [`io_task`] drive endpoints from transports

pub mod assembly;
pub mod channels;
pub mod control;
pub mod eid;
pub mod endpoint;
pub mod io_task;
pub mod link;
pub mod packet;
pub mod routing;
pub mod serial;
pub mod tags;
pub mod transport;

pub use eid::Eid;
pub use endpoint::{Endpoint, EndpointConfig};
pub use packet::{Message, MessageType, Packet};
pub use routing::LinkId;
