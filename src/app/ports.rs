//! Port traits: the hexagonal boundary between bus management logic and
//! the host it runs on.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ HostBusController / BusOwner
//! ```
//!
//! Driven adapters (the `mctp` and `ip` tools, systemd, the clock, event
//! sinks) implement these traits. The controller consumes them via
//! generics, so the domain core never spawns a process directly.

use core::time::Duration;

use crate::error::Result;
use crate::mctp::eid::Eid;

use super::events::BusEvent;

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: domain → kernel MCTP links)
// ───────────────────────────────────────────────────────────────

/// Creates and configures kernel MCTP links for serial devices.
pub trait LinkPort {
    /// Opaque handle to a bound serial line.
    type Handle;

    /// Names of the network interfaces currently present.
    fn interfaces(&mut self) -> Result<Vec<String>>;

    /// Attach the MCTP serial line discipline to `device`. The binding
    /// lives until [`unbind`](Self::unbind).
    fn bind_serial(&mut self, device: &str) -> Result<Self::Handle>;

    /// Bring interface `name` up.
    fn set_up(&mut self, name: &str) -> Result<()>;

    /// Assign local address `eid` on interface `name`.
    fn add_address(&mut self, eid: Eid, name: &str) -> Result<()>;

    /// Release a binding created by `bind_serial`.
    fn unbind(&mut self, handle: Self::Handle) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Service port (driven adapter: domain → service manager)
// ───────────────────────────────────────────────────────────────

/// Controls the MCTP daemon.
pub trait ServicePort {
    fn is_active(&mut self) -> Result<bool>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Unit name, for events and logs.
    fn name(&self) -> &str;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`BusEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &BusEvent);
}

/// Collects events in memory.
impl EventSink for Vec<BusEvent> {
    fn emit(&mut self, event: &BusEvent) {
        self.push(event.clone());
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time source, injectable for tests.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point.
    fn now_ms(&self) -> u64;
    fn sleep(&mut self, duration: Duration);
}
