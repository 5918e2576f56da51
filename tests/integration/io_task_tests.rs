//! I/O thread round trip through the static channels.
//!
//! The channels are process-wide, so this file holds a single test.

use std::time::{Duration, Instant};

use mctp_pldm::mctp::io_task;
use mctp_pldm::mctp::link::LinkSet;
use mctp_pldm::mctp::routing::Route;
use mctp_pldm::mctp::transport::loopback_pair;
use mctp_pldm::mctp::{Eid, Endpoint, EndpointConfig, Message, MessageType};

fn endpoint(eid: u8) -> Endpoint {
    Endpoint::new(EndpointConfig {
        eid: Eid(eid),
        ..EndpointConfig::default()
    })
}

/// Run `f` until it yields a value or two seconds pass.
fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(v) = f() {
            return v;
        }
        assert!(Instant::now() < deadline, "timed out");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn io_thread_round_trip() {
    let (host_wire, dev_wire) = loopback_pair();

    let mut host = endpoint(8);
    let link = host.add_link();
    host.routes_mut().insert(Route::neighbor(Eid(9), link)).unwrap();
    let io = io_task::spawn(vec![(link, host_wire)]).unwrap();

    let mut dev = endpoint(9);
    let mut dev_links = LinkSet::new();
    dev_links.add(&mut dev, dev_wire);

    let body = vec![0xA5; 200];
    host.send(Eid(9), MessageType::Pldm, &body, 0).unwrap();
    assert_eq!(io_task::pump_channels(&mut host, 0), 4);

    let (dev_link, request): (_, Message) = wait_for(|| {
        dev_links.pump(&mut dev, 0);
        dev.recv()
    });
    assert_eq!(request.body, body);

    dev.respond(dev_link, &request, b"pong").unwrap();
    dev_links.pump(&mut dev, 0);

    let (_, reply) = wait_for(|| {
        io_task::pump_channels(&mut host, 0);
        host.recv()
    });
    assert_eq!(reply.source, Eid(9));
    assert_eq!(reply.body, b"pong");
    assert!(!reply.tag_owner);

    io_task::stop();
    io.join().unwrap();
}
