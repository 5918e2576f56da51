//! User-space discovery over in-memory serial lines.
//!
//! The bench clock stands in for wall time: every sleep advances it and
//! lets the simulated devices answer whatever the owner wrote.

use core::time::Duration;

use mctp_pldm::app::discovery::DISCOVERY_TIMEOUT_MS;
use mctp_pldm::app::events::BusEvent;
use mctp_pldm::app::ports::Clock;
use mctp_pldm::app::discover;
use mctp_pldm::config::MctpConfig;
use mctp_pldm::error::{Error, LinkError};
use mctp_pldm::mctp::link::LinkSet;
use mctp_pldm::mctp::transport::{LoopbackTransport, loopback_pair};
use mctp_pldm::mctp::{Eid, Endpoint, EndpointConfig};

struct Device {
    endpoint: Endpoint,
    links: LinkSet<LoopbackTransport>,
}

#[derive(Default)]
struct BenchClock {
    now: u64,
    devices: Vec<Device>,
}

impl Clock for BenchClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration.as_millis() as u64;
        for d in &mut self.devices {
            d.links.pump(&mut d.endpoint, self.now);
        }
    }
}

/// One responsive device per name, plus `silent` lines nobody answers on.
fn bench(
    names: &[&str],
    silent: &[&str],
) -> (BenchClock, Vec<(String, LoopbackTransport)>, Vec<LoopbackTransport>) {
    let mut clock = BenchClock::default();
    let mut lines = Vec::new();
    for name in names {
        let (host, dev) = loopback_pair();
        let mut endpoint = Endpoint::new(EndpointConfig::default());
        let mut links = LinkSet::new();
        links.add(&mut endpoint, dev);
        clock.devices.push(Device { endpoint, links });
        lines.push((name.to_string(), host));
    }
    // Keep the far ends alive so writes to them still succeed.
    let mut dead = Vec::new();
    for name in silent {
        let (host, dev) = loopback_pair();
        dead.push(dev);
        lines.push((name.to_string(), host));
    }
    (clock, lines, dead)
}

#[test]
fn every_device_is_listed_with_its_line() {
    let (mut clock, lines, _dead) = bench(&["/dev/ttyUSB0", "/dev/ttyUSB1"], &[]);
    let mut events: Vec<BusEvent> = Vec::new();

    let found = discover(
        &MctpConfig::default(),
        lines,
        &mut clock,
        &mut events,
        DISCOVERY_TIMEOUT_MS,
    )
    .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!((found[0].eid, found[0].device.as_str()), (Eid(9), "/dev/ttyUSB0"));
    assert_eq!((found[1].eid, found[1].device.as_str()), (Eid(10), "/dev/ttyUSB1"));
    for ep in &found {
        assert_eq!(ep.network_id, 1);
        assert_eq!(ep.message_types, vec![0x00, 0x01]);
        assert!(ep.downstream.is_none());
    }
    // The devices really hold the EIDs they were reported with.
    assert_eq!(clock.devices[0].endpoint.eid(), Eid(9));
    assert_eq!(clock.devices[1].endpoint.eid(), Eid(10));
    assert!(clock.now < 1_000);
}

#[test]
fn silent_device_is_left_out() {
    let (mut clock, lines, _dead) = bench(&["/dev/ttyUSB0"], &["/dev/ttyUSB1"]);
    let mut events: Vec<BusEvent> = Vec::new();

    let found = discover(
        &MctpConfig::default(),
        lines,
        &mut clock,
        &mut events,
        DISCOVERY_TIMEOUT_MS,
    )
    .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].device, "/dev/ttyUSB0");
    // Retries run out long before the discovery window closes.
    assert!(clock.now < DISCOVERY_TIMEOUT_MS);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, BusEvent::EnumerationFailed { link: 1, .. }))
    );
}

#[test]
fn window_closes_on_timeout() {
    let (mut clock, lines, _dead) = bench(&[], &["/dev/ttyUSB0"]);
    let mut events: Vec<BusEvent> = Vec::new();

    let found = discover(&MctpConfig::default(), lines, &mut clock, &mut events, 20).unwrap();

    assert!(found.is_empty());
    assert!((20..=21).contains(&clock.now));
}

#[test]
fn no_lines_is_an_error() {
    let mut clock = BenchClock::default();
    let mut events: Vec<BusEvent> = Vec::new();
    let lines: Vec<(String, LoopbackTransport)> = Vec::new();

    let result = discover(&MctpConfig::default(), lines, &mut clock, &mut events, 100);

    assert!(matches!(result, Err(Error::Link(LinkError::NoDevices))));
    assert!(events.is_empty());
}
