//! Bus ownership: EID assignment and endpoint discovery.

pub mod owner;

pub use owner::{BusOwner, BusOwnerConfig, DiscoveredEndpoint, DownstreamPool, LinkState};
