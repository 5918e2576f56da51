//! Integration tests for HostBusController against mock host adapters.

use mctp_pldm::app::HostBusController;
use mctp_pldm::app::events::BusEvent;
use mctp_pldm::config::MctpConfig;
use mctp_pldm::error::{Error, LinkError};
use mctp_pldm::mctp::Eid;

use crate::mock_link::{FakeClock, LinkCall, MockLinks, MockService, ServiceCall, SharedSink};

type Controller = HostBusController<MockLinks, MockService, FakeClock, SharedSink>;

struct Harness {
    links: MockLinks,
    service: MockService,
    clock: FakeClock,
    sink: SharedSink,
}

impl Harness {
    fn new() -> Self {
        Self {
            links: MockLinks::new(),
            service: MockService::active(),
            clock: FakeClock::default(),
            sink: SharedSink::default(),
        }
    }

    fn start(&self, config: &MctpConfig, devices: &[&str]) -> Result<Controller, Error> {
        HostBusController::start(
            config,
            devices.iter().map(|d| d.to_string()).collect(),
            self.links.clone(),
            self.service.clone(),
            self.clock.clone(),
            self.sink.clone(),
        )
    }
}

fn link_error(r: Result<Controller, Error>) -> LinkError {
    match r {
        Err(Error::Link(e)) => e,
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("start should have failed"),
    }
}

// ── Bring-up ──────────────────────────────────────────────────

#[test]
fn binds_devices_in_order_and_restarts_daemon() {
    let h = Harness::new();
    let ctl = h
        .start(&MctpConfig::default(), &["/dev/ttyUSB1", "/dev/ttyUSB0"])
        .unwrap();

    let links: Vec<_> = ctl.links().cloned().collect();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].device, "/dev/ttyUSB0");
    assert_eq!(links[0].eid, Eid(8));
    assert_eq!(links[0].interface, "mctpserial0");
    assert_eq!(links[1].device, "/dev/ttyUSB1");
    assert_eq!(links[1].eid, Eid(9));

    assert_eq!(
        h.links.calls()[..3],
        [
            LinkCall::Bind("/dev/ttyUSB0".into()),
            LinkCall::Up("mctpserial0".into()),
            LinkCall::Address(Eid(8), "mctpserial0".into()),
        ]
    );
    assert_eq!(h.service.calls(), [ServiceCall::Stop, ServiceCall::Start]);

    let events = h.sink.events();
    assert!(matches!(events[0], BusEvent::LinkBound { eid: Eid(8), .. }));
    assert_eq!(
        events.last(),
        Some(&BusEvent::ServiceRestarted {
            unit: "mctpd.service".into()
        })
    );
}

#[test]
fn inactive_daemon_is_only_started() {
    let mut h = Harness::new();
    h.service = MockService::default();
    let _ctl = h.start(&MctpConfig::default(), &["/dev/ttyUSB0"]).unwrap();
    assert_eq!(h.service.calls(), [ServiceCall::Start]);
}

#[test]
fn duplicate_devices_are_bound_once() {
    let h = Harness::new();
    let ctl = h
        .start(&MctpConfig::default(), &["/dev/ttyUSB0", "/dev/ttyUSB0"])
        .unwrap();
    assert_eq!(ctl.links().count(), 1);
}

#[test]
fn lookup_by_eid() {
    let h = Harness::new();
    let ctl = h
        .start(&MctpConfig::default(), &["/dev/ttyUSB0", "/dev/ttyUSB1"])
        .unwrap();
    assert_eq!(ctl.link_for_eid(Eid(9)).unwrap().device, "/dev/ttyUSB1");
    assert!(ctl.link_for_eid(Eid(10)).is_none());
}

// ── Failures ──────────────────────────────────────────────────

#[test]
fn no_devices() {
    let h = Harness::new();
    assert_eq!(link_error(h.start(&MctpConfig::default(), &[])), LinkError::NoDevices);
    assert!(h.links.calls().is_empty());
}

#[test]
fn not_enough_eids() {
    let h = Harness::new();
    let mut config = MctpConfig::default();
    config.bus_owner.dynamic_eid_range = [8, 9];
    assert_eq!(
        link_error(h.start(&config, &["/dev/a", "/dev/b", "/dev/c"])),
        LinkError::NotEnoughEids {
            devices: 3,
            available: 2
        }
    );
    assert!(h.links.calls().is_empty());
}

#[test]
fn interface_timeout_rolls_back_earlier_links() {
    let h = Harness::new();
    h.links.silence("/dev/ttyUSB1");
    let err = link_error(h.start(&MctpConfig::default(), &["/dev/ttyUSB0", "/dev/ttyUSB1"]));
    assert_eq!(err, LinkError::InterfaceTimeout);

    // Waited the full window in 100 ms steps.
    assert!(h.clock.0.get() >= 2000);
    // Both bindings released, the silent one first.
    assert_eq!(h.links.unbinds(), 2);
    assert_eq!(h.links.0.borrow().interfaces, ["lo", "eth0"]);
    assert!(h.service.calls().is_empty());
    assert!(
        h.sink
            .events()
            .contains(&BusEvent::LinkReleased {
                interface: "mctpserial0".into(),
                eid: Eid(8)
            })
    );
}

#[test]
fn set_up_failure_releases_binding() {
    let h = Harness::new();
    h.links.fail_up("mctpserial0");
    let err = link_error(h.start(&MctpConfig::default(), &["/dev/ttyUSB0"]));
    assert_eq!(err, LinkError::CommandFailed("mctp link set up"));
    assert_eq!(h.links.calls().last(), Some(&LinkCall::Unbind(0)));
}

#[test]
fn service_failure_rolls_back() {
    let h = Harness::new();
    h.service.0.borrow_mut().fail_start = true;
    let err = link_error(h.start(&MctpConfig::default(), &["/dev/ttyUSB0"]));
    assert_eq!(err, LinkError::CommandFailed("systemctl start"));
    assert_eq!(h.links.unbinds(), 1);
}

// ── Teardown ──────────────────────────────────────────────────

#[test]
fn close_is_idempotent() {
    let h = Harness::new();
    let mut ctl = h.start(&MctpConfig::default(), &["/dev/ttyUSB0"]).unwrap();
    ctl.close().unwrap();
    ctl.close().unwrap();
    assert!(ctl.is_closed());
    assert_eq!(ctl.links().count(), 0);
    assert_eq!(h.links.unbinds(), 1);
    assert_eq!(
        h.service.calls(),
        [ServiceCall::Stop, ServiceCall::Start, ServiceCall::Stop]
    );
    drop(ctl);
    assert_eq!(h.links.unbinds(), 1);
}

#[test]
fn drop_closes() {
    let h = Harness::new();
    {
        let _ctl = h.start(&MctpConfig::default(), &["/dev/ttyUSB0", "/dev/ttyUSB1"]).unwrap();
    }
    assert_eq!(h.links.unbinds(), 2);
    assert!(!h.service.0.borrow().active);
}

#[test]
fn eids_are_reusable_after_close() {
    let h = Harness::new();
    let mut config = MctpConfig::default();
    config.bus_owner.dynamic_eid_range = [8, 8];
    let mut ctl = h.start(&config, &["/dev/ttyUSB0"]).unwrap();
    ctl.close().unwrap();
    let ctl = h.start(&config, &["/dev/ttyUSB0"]).unwrap();
    assert_eq!(ctl.links().next().unwrap().eid, Eid(8));
}
