//! Mock host adapters for integration tests.
//!
//! Each mock is a cheap handle onto shared state, so a test can hand one
//! clone to the controller and keep another to inspect the call history.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use mctp_pldm::app::events::BusEvent;
use mctp_pldm::app::ports::{Clock, EventSink, LinkPort, ServicePort};
use mctp_pldm::error::{LinkError, Result};
use mctp_pldm::mctp::Eid;

// ── Link port ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    Bind(String),
    Up(String),
    Address(Eid, String),
    Unbind(usize),
}

#[derive(Default)]
pub struct LinkState {
    pub interfaces: Vec<String>,
    pub calls: Vec<LinkCall>,
    /// Devices whose binding never produces an interface.
    pub silent: Vec<String>,
    /// Interfaces that refuse to come up.
    pub fail_up: Vec<String>,
    next: usize,
}

#[derive(Clone, Default)]
pub struct MockLinks(pub Rc<RefCell<LinkState>>);

#[allow(dead_code)]
impl MockLinks {
    pub fn new() -> Self {
        let links = Self::default();
        links.0.borrow_mut().interfaces = vec!["lo".into(), "eth0".into()];
        links
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.0.borrow().calls.clone()
    }

    pub fn silence(&self, device: &str) {
        self.0.borrow_mut().silent.push(device.into());
    }

    pub fn fail_up(&self, interface: &str) {
        self.0.borrow_mut().fail_up.push(interface.into());
    }

    pub fn unbinds(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LinkCall::Unbind(_)))
            .count()
    }
}

impl LinkPort for MockLinks {
    type Handle = usize;

    fn interfaces(&mut self) -> Result<Vec<String>> {
        Ok(self.0.borrow().interfaces.clone())
    }

    fn bind_serial(&mut self, device: &str) -> Result<usize> {
        let mut s = self.0.borrow_mut();
        s.calls.push(LinkCall::Bind(device.into()));
        let n = s.next;
        s.next += 1;
        if !s.silent.iter().any(|d| d == device) {
            s.interfaces.push(format!("mctpserial{n}"));
        }
        Ok(n)
    }

    fn set_up(&mut self, name: &str) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(LinkCall::Up(name.into()));
        if s.fail_up.iter().any(|i| i == name) {
            return Err(LinkError::CommandFailed("mctp link set up").into());
        }
        Ok(())
    }

    fn add_address(&mut self, eid: Eid, name: &str) -> Result<()> {
        self.0
            .borrow_mut()
            .calls
            .push(LinkCall::Address(eid, name.into()));
        Ok(())
    }

    fn unbind(&mut self, handle: usize) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(LinkCall::Unbind(handle));
        let name = format!("mctpserial{handle}");
        s.interfaces.retain(|i| *i != name);
        Ok(())
    }
}

// ── Service port ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceCall {
    Start,
    Stop,
}

#[derive(Default)]
pub struct ServiceState {
    pub active: bool,
    pub fail_start: bool,
    pub calls: Vec<ServiceCall>,
}

#[derive(Clone, Default)]
pub struct MockService(pub Rc<RefCell<ServiceState>>);

#[allow(dead_code)]
impl MockService {
    pub fn active() -> Self {
        let s = Self::default();
        s.0.borrow_mut().active = true;
        s
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.0.borrow().calls.clone()
    }
}

impl ServicePort for MockService {
    fn is_active(&mut self) -> Result<bool> {
        Ok(self.0.borrow().active)
    }

    fn start(&mut self) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(ServiceCall::Start);
        if s.fail_start {
            return Err(LinkError::CommandFailed("systemctl start").into());
        }
        s.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(ServiceCall::Stop);
        s.active = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "mctpd.service"
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Clock that only moves when slept on.
#[derive(Clone, Default)]
pub struct FakeClock(pub Rc<Cell<u64>>);

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }

    fn sleep(&mut self, duration: Duration) {
        self.0.set(self.0.get() + duration.as_millis() as u64);
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct SharedSink(pub Rc<RefCell<Vec<BusEvent>>>);

#[allow(dead_code)]
impl SharedSink {
    pub fn events(&self) -> Vec<BusEvent> {
        self.0.borrow().clone()
    }
}

impl EventSink for SharedSink {
    fn emit(&mut self, event: &BusEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}
