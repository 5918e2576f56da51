//! End-to-end bus owner tests over in-memory serial lines.
//!
//! Every byte goes through DSP0253 framing: the owner and each device
//! own a `LinkSet` on one end of a loopback pipe.

use mctp_pldm::app::events::BusEvent;
use mctp_pldm::bus::{BusOwner, BusOwnerConfig, LinkState};
use mctp_pldm::mctp::eid::EidPool;
use mctp_pldm::mctp::link::LinkSet;
use mctp_pldm::mctp::transport::{LoopbackTransport, loopback_pair};
use mctp_pldm::mctp::{Eid, Endpoint, EndpointConfig};
use mctp_pldm::pldm::base::{CMD_GET_TID, CMD_SET_TID, set_tid_request, types};
use mctp_pldm::pldm::{PldmEvent, PldmRequester, PldmResponder, PldmService};

struct Device {
    endpoint: Endpoint,
    links: LinkSet<LoopbackTransport>,
    /// Second handle on the device end, for injecting line noise.
    wire: LoopbackTransport,
}

struct Bench {
    owner: BusOwner,
    links: LinkSet<LoopbackTransport>,
    devices: Vec<Device>,
    events: Vec<BusEvent>,
}

impl Bench {
    fn new(devices: usize) -> Self {
        let mut ep = Endpoint::new(EndpointConfig {
            eid: Eid(8),
            ..EndpointConfig::default()
        });
        let mut links = LinkSet::new();
        let mut devs = Vec::new();
        for _ in 0..devices {
            let (host, dev) = loopback_pair();
            let wire = dev.clone();
            links.add(&mut ep, host);
            let mut endpoint = Endpoint::new(EndpointConfig::default());
            let mut dl = LinkSet::new();
            dl.add(&mut endpoint, dev);
            devs.push(Device {
                endpoint,
                links: dl,
                wire,
            });
        }
        let owner = BusOwner::new(
            ep,
            EidPool::new(8..=20, 4).unwrap(),
            BusOwnerConfig {
                network_id: 1,
                response_timeout_ms: 30,
                retries: 2,
            },
        );
        Self {
            owner,
            links,
            devices: devs,
            events: Vec::new(),
        }
    }

    /// One round trip: owner out, devices in and out, owner in.
    fn step(&mut self, now: u64) {
        self.links.pump(self.owner.endpoint_mut(), now);
        for d in &mut self.devices {
            d.links.pump(&mut d.endpoint, now);
        }
        self.links.pump(self.owner.endpoint_mut(), now);
        self.owner.tick(now, &mut self.events);
    }

    fn settle(&mut self, now: u64) {
        for i in 0..8 {
            self.step(now + i);
        }
    }
}

#[test]
fn enumerates_devices_over_serial() {
    let mut bench = Bench::new(2);
    assert_eq!(bench.owner.enumerate_link(0, 0).unwrap(), Eid(9));
    assert_eq!(bench.owner.enumerate_link(1, 0).unwrap(), Eid(10));
    bench.settle(1);

    assert!(bench.owner.is_settled());
    assert_eq!(bench.devices[0].endpoint.eid(), Eid(9));
    assert_eq!(bench.devices[1].endpoint.eid(), Eid(10));
    assert_eq!(bench.owner.link_state(1), LinkState::Assigned(Eid(10)));

    let d = bench.owner.discovered(Eid(9)).unwrap();
    assert_eq!(d.link, 0);
    assert_eq!(d.network_id, 1);
    assert_eq!(d.message_types, vec![0x00, 0x01]);
    assert_eq!(bench.owner.endpoints().len(), 2);

    let assigned = bench
        .events
        .iter()
        .filter(|e| matches!(e, BusEvent::EndpointAssigned { .. }))
        .count();
    assert_eq!(assigned, 2);
}

#[test]
fn line_noise_does_not_stop_enumeration() {
    let mut bench = Bench::new(1);
    bench.devices[0].wire.inject(&[0x00, 0x7E, 0x01, 0xFF, 0x7E, 0x55]);
    bench.owner.enumerate_link(0, 0).unwrap();
    bench.settle(1);
    assert_eq!(bench.owner.link_state(0), LinkState::Assigned(Eid(9)));
    assert!(bench.devices[0].links.get(0).unwrap().stats().framing_errors > 0);
}

#[test]
fn silent_device_fails_after_retries() {
    let mut bench = Bench::new(1);
    bench.owner.enumerate_link(0, 0).unwrap();
    // Never pump the device.
    for now in [0, 30, 60, 90] {
        bench.links.pump(bench.owner.endpoint_mut(), now);
        bench.owner.tick(now, &mut bench.events);
    }
    assert_eq!(bench.owner.link_state(0), LinkState::Failed);
    assert!(!bench.owner.pool().is_allocated(Eid(9)));
    assert!(matches!(
        bench.events.last(),
        Some(BusEvent::EnumerationFailed { link: 0, eid: Eid(9), .. })
    ));
    // Initial request plus two retries reached the wire.
    assert_eq!(bench.devices[0].links.get(0).unwrap().stats().frames, 0);
    let d = &mut bench.devices[0];
    d.links.pump(&mut d.endpoint, 100);
    assert_eq!(d.links.get(0).unwrap().stats().frames, 3);
}

#[test]
fn removing_a_link_drops_its_endpoint() {
    let mut bench = Bench::new(1);
    bench.owner.enumerate_link(0, 0).unwrap();
    bench.settle(1);

    bench.owner.remove_link(0, &mut bench.events);
    assert!(bench.owner.discovered(Eid(9)).is_none());
    assert!(bench.owner.stack().routes().lookup(Eid(9)).is_none());
    assert!(!bench.owner.pool().is_allocated(Eid(9)));
    assert_eq!(
        bench.events.last(),
        Some(&BusEvent::EndpointRemoved { link: 0, eid: Eid(9) })
    );
}

#[test]
fn pldm_tid_exchange_after_assignment() {
    let mut bench = Bench::new(1);
    bench.owner.enumerate_link(0, 0).unwrap();
    bench.settle(1);

    let mut host = PldmService::new(PldmResponder::new(1), PldmRequester::new(500, 2));
    let mut device = PldmService::new(PldmResponder::new(1), PldmRequester::new(500, 2));
    let mut responses = Vec::new();

    let mut exchange = |bench: &mut Bench, command: u8, payload: &[u8], now: u64| {
        host.request(bench.owner.endpoint_mut(), Eid(9), types::BASE, command, payload, now)
            .unwrap();
        bench.links.pump(bench.owner.endpoint_mut(), now);
        let dev = &mut bench.devices[0];
        dev.links.pump(&mut dev.endpoint, now);
        while let Some((link, msg)) = dev.endpoint.recv() {
            assert!(device.handle_message(&mut dev.endpoint, link, &msg).is_none());
        }
        dev.links.pump(&mut dev.endpoint, now);
        bench.links.pump(bench.owner.endpoint_mut(), now);
        bench.owner.tick(now, &mut bench.events);
        for (link, msg) in bench.owner.take_messages() {
            if let Some(PldmEvent::Response(eid, resp)) =
                host.handle_message(bench.owner.endpoint_mut(), link, &msg)
            {
                responses.push((eid, resp));
            }
        }
    };

    exchange(&mut bench, CMD_SET_TID, &set_tid_request(5), 20);
    exchange(&mut bench, CMD_GET_TID, &[], 21);

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].0, Eid(9));
    assert!(responses[0].1.completion.is_success());
    assert_eq!(responses[1].1.data().unwrap(), &[5]);
    assert_eq!(host.pending(), 0);
}
