//! Host bus controller: brings up one kernel MCTP link per serial device.
//!
//! ```text
//!  devices ──▶ ┌──────────────────────────┐ ──▶ LinkPort    (bind, up, addr)
//!              │    HostBusController      │ ──▶ ServicePort (restart daemon)
//!  config  ──▶ │  EidPool · bound links    │ ──▶ EventSink
//!              └──────────────────────────┘
//! ```
//!
//! Start-up is all-or-nothing: if any device fails, every link bound so
//! far is torn down and its EID returned before the error is reported.
//! [`HostBusController::close`] releases everything and also runs on drop.

use core::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::MctpConfig;
use crate::error::{Error, LinkError, Result};
use crate::mctp::eid::{Eid, EidPool};

use super::events::BusEvent;
use super::ports::{Clock, EventSink, LinkPort, ServicePort};

/// Total time to wait for the kernel to create an interface.
pub const INTERFACE_WAIT_MS: u64 = 2000;
/// Poll period while waiting.
pub const INTERFACE_POLL: Duration = Duration::from_millis(100);

/// One serial device bound to a network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostLink {
    pub eid: Eid,
    pub interface: String,
    pub device: String,
}

struct Bound<H> {
    link: HostLink,
    handle: H,
}

pub struct HostBusController<L: LinkPort, S: ServicePort, C: Clock, E: EventSink> {
    links: L,
    service: S,
    clock: C,
    sink: E,
    pool: EidPool,
    bound: Vec<Bound<L::Handle>>,
    closed: bool,
}

impl<L: LinkPort, S: ServicePort, C: Clock, E: EventSink> HostBusController<L, S, C, E> {
    /// Bind every device, assign EIDs, and restart the daemon.
    pub fn start(
        config: &MctpConfig,
        mut devices: Vec<String>,
        links: L,
        service: S,
        clock: C,
        sink: E,
    ) -> Result<Self> {
        devices.sort();
        devices.dedup();
        if devices.is_empty() {
            return Err(LinkError::NoDevices.into());
        }

        let pool = EidPool::new(config.eid_range(), config.bus_owner.max_pool_size)?;
        if devices.len() > pool.available() {
            return Err(LinkError::NotEnoughEids {
                devices: devices.len(),
                available: pool.available(),
            }
            .into());
        }

        let mut ctl = Self {
            links,
            service,
            clock,
            sink,
            pool,
            bound: Vec::with_capacity(devices.len()),
            closed: false,
        };

        for device in &devices {
            if let Err(e) = ctl.bring_up(device) {
                warn!("bus: failed to bring up {}: {}", device, e);
                ctl.rollback();
                return Err(e);
            }
        }

        if let Err(e) = ctl.restart_service() {
            warn!("bus: failed to restart {}: {}", ctl.service.name(), e);
            ctl.rollback();
            return Err(e);
        }

        info!("bus: {} link(s) up", ctl.bound.len());
        Ok(ctl)
    }

    pub fn links(&self) -> impl Iterator<Item = &HostLink> {
        self.bound.iter().map(|b| &b.link)
    }

    pub fn link_for_eid(&self, eid: Eid) -> Option<&HostLink> {
        self.links().find(|l| l.eid == eid)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Tear down every link and stop the daemon. Safe to call twice.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_err = self.release_all().err();
        if let Err(e) = self.service.stop() {
            warn!("bus: failed to stop {}: {}", self.service.name(), e);
            first_err.get_or_insert(e);
        }
        first_err.map_or(Ok(()), Err)
    }

    // ── Internals ─────────────────────────────────────────────

    fn bring_up(&mut self, device: &str) -> Result<()> {
        let eid = self.pool.allocate()?;
        let before = match self.links.interfaces() {
            Ok(names) => names,
            Err(e) => {
                self.release_eid(eid);
                return Err(e);
            }
        };

        let handle = match self.links.bind_serial(device) {
            Ok(h) => h,
            Err(e) => {
                self.release_eid(eid);
                return Err(e);
            }
        };

        let configured = self
            .wait_for_interface(&before)
            .and_then(|name| {
                self.links.set_up(&name)?;
                self.links.add_address(eid, &name)?;
                Ok(name)
            });

        match configured {
            Ok(interface) => {
                info!("bus: {} -> {} (EID {})", device, interface, eid);
                let link = HostLink {
                    eid,
                    interface,
                    device: device.to_string(),
                };
                self.sink.emit(&BusEvent::LinkBound {
                    device: link.device.clone(),
                    interface: link.interface.clone(),
                    eid,
                });
                self.bound.push(Bound { link, handle });
                Ok(())
            }
            Err(e) => {
                if let Err(ue) = self.links.unbind(handle) {
                    warn!("bus: unbind of {} failed: {}", device, ue);
                }
                self.release_eid(eid);
                Err(e)
            }
        }
    }

    /// Poll until an interface absent from `before` shows up.
    fn wait_for_interface(&mut self, before: &[String]) -> Result<String> {
        let deadline = self.clock.now_ms() + INTERFACE_WAIT_MS;
        loop {
            let now = self.links.interfaces()?;
            if let Some(name) = now.into_iter().find(|n| !before.contains(n)) {
                return Ok(name);
            }
            if self.clock.now_ms() >= deadline {
                return Err(LinkError::InterfaceTimeout.into());
            }
            self.clock.sleep(INTERFACE_POLL);
        }
    }

    fn restart_service(&mut self) -> Result<()> {
        if self.service.is_active()? {
            debug!("bus: stopping {}", self.service.name());
            self.service.stop()?;
        }
        self.service.start()?;
        self.sink.emit(&BusEvent::ServiceRestarted {
            unit: self.service.name().to_string(),
        });
        Ok(())
    }

    fn rollback(&mut self) {
        if let Err(e) = self.release_all() {
            warn!("bus: rollback incomplete: {}", e);
        }
        self.closed = true;
    }

    /// Unbind links newest first; keeps going past failures.
    fn release_all(&mut self) -> Result<()> {
        let mut first_err: Option<Error> = None;
        while let Some(Bound { link, handle }) = self.bound.pop() {
            if let Err(e) = self.links.unbind(handle) {
                warn!("bus: unbind of {} failed: {}", link.device, e);
                first_err.get_or_insert(e);
            }
            self.release_eid(link.eid);
            self.sink.emit(&BusEvent::LinkReleased {
                interface: link.interface,
                eid: link.eid,
            });
        }
        first_err.map_or(Ok(()), Err)
    }

    fn release_eid(&mut self, eid: Eid) {
        if let Err(e) = self.pool.release(eid) {
            warn!("bus: EID {} release failed: {}", eid, e);
        }
    }
}

impl<L: LinkPort, S: ServicePort, C: Clock, E: EventSink> Drop for HostBusController<L, S, C, E> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("bus: close on drop failed: {}", e);
        }
    }
}
