//! PLDM discovery flow between a host and a terminus over serial.
//!
//! The host walks the usual inventory sequence: GetPLDMTypes, then
//! GetPLDMVersion and GetPLDMCommands per type, then a type-specific
//! command.

use mctp_pldm::mctp::link::LinkSet;
use mctp_pldm::mctp::routing::Route;
use mctp_pldm::mctp::transport::{LoopbackTransport, loopback_pair};
use mctp_pldm::mctp::{Eid, Endpoint, EndpointConfig, LinkId};
use mctp_pldm::pldm::base::{
    self, BASE_VERSION, CMD_GET_PLDM_COMMANDS, CMD_GET_PLDM_TYPES, CMD_GET_PLDM_VERSION, Ver32,
    types,
};
use mctp_pldm::pldm::{
    CompletionCode, PldmEvent, PldmHandler, PldmRequester, PldmResponder, PldmResponse,
    PldmService,
};

const CMD_GET_SENSOR_READING: u8 = 0x11;
const PLATFORM_VERSION: Ver32 = Ver32::new(0xF1, 0xF2, 0xF0, 0x00);

/// Minimal platform (type 2) handler with one sensor.
struct Sensor {
    reading: u8,
}

impl PldmHandler for Sensor {
    fn pldm_type(&self) -> u8 {
        types::PLATFORM
    }

    fn versions(&self) -> &[Ver32] {
        &[PLATFORM_VERSION]
    }

    fn commands(&self) -> &[u8] {
        &[CMD_GET_SENSOR_READING]
    }

    fn handle(&mut self, _command: u8, request: &[u8], response: &mut Vec<u8>) -> CompletionCode {
        if request.first() != Some(&1) {
            return CompletionCode::ErrorInvalidData;
        }
        response.push(self.reading);
        CompletionCode::Success
    }
}

struct Side {
    endpoint: Endpoint,
    links: LinkSet<LoopbackTransport>,
    link: LinkId,
    pldm: PldmService,
}

impl Side {
    fn new(eid: u8, peer: u8, transport: LoopbackTransport, responder: PldmResponder) -> Self {
        let mut endpoint = Endpoint::new(EndpointConfig {
            eid: Eid(eid),
            ..EndpointConfig::default()
        });
        let mut links = LinkSet::new();
        let link = links.add(&mut endpoint, transport);
        endpoint
            .routes_mut()
            .insert(Route::neighbor(Eid(peer), link))
            .unwrap();
        Self {
            endpoint,
            links,
            link,
            pldm: PldmService::new(responder, PldmRequester::new(500, 1)),
        }
    }

    /// Pump the wire and dispatch every received message.
    fn service(&mut self, now: u64) -> Vec<PldmEvent> {
        self.links.pump(&mut self.endpoint, now);
        let mut events = Vec::new();
        while let Some((link, msg)) = self.endpoint.recv() {
            assert_eq!(link, self.link);
            events.extend(self.pldm.handle_message(&mut self.endpoint, link, &msg));
        }
        self.links.pump(&mut self.endpoint, now);
        events
    }
}

fn pair() -> (Side, Side) {
    let (a, b) = loopback_pair();
    let host = Side::new(8, 9, a, PldmResponder::new(1));
    let mut responder = PldmResponder::new(2);
    responder.register(Box::new(Sensor { reading: 42 })).unwrap();
    let terminus = Side::new(9, 8, b, responder);
    (host, terminus)
}

fn ask(host: &mut Side, terminus: &mut Side, pldm_type: u8, command: u8, payload: &[u8]) -> PldmResponse {
    host.pldm
        .request(&mut host.endpoint, Eid(9), pldm_type, command, payload, 0)
        .unwrap();
    host.service(0);
    assert!(terminus.service(0).is_empty());
    match host.service(0).as_slice() {
        [PldmEvent::Response(Eid(9), resp)] => resp.clone(),
        other => panic!("expected one response, got {other:?}"),
    }
}

#[test]
fn inventory_walk() {
    let (mut host, mut terminus) = pair();

    let resp = ask(&mut host, &mut terminus, types::BASE, CMD_GET_PLDM_TYPES, &[]);
    let supported = base::decode_types_response(resp.data().unwrap()).unwrap();
    assert_eq!(supported.iter().collect::<Vec<_>>(), vec![types::BASE, types::PLATFORM]);

    let resp = ask(
        &mut host,
        &mut terminus,
        types::BASE,
        CMD_GET_PLDM_VERSION,
        &base::get_version_request(types::PLATFORM),
    );
    let versions = base::decode_version_response(resp.data().unwrap()).unwrap();
    assert_eq!(versions, vec![PLATFORM_VERSION]);

    let resp = ask(
        &mut host,
        &mut terminus,
        types::BASE,
        CMD_GET_PLDM_COMMANDS,
        &base::get_commands_request(types::PLATFORM, PLATFORM_VERSION),
    );
    let commands = base::decode_commands_response(resp.data().unwrap()).unwrap();
    assert!(commands.contains(CMD_GET_SENSOR_READING));
    assert!(!commands.contains(0x01));

    let resp = ask(&mut host, &mut terminus, types::PLATFORM, CMD_GET_SENSOR_READING, &[1]);
    assert_eq!(resp.data().unwrap(), &[42]);
}

#[test]
fn base_commands_list_for_base_version() {
    let (mut host, mut terminus) = pair();
    let resp = ask(
        &mut host,
        &mut terminus,
        types::BASE,
        CMD_GET_PLDM_COMMANDS,
        &base::get_commands_request(types::BASE, BASE_VERSION),
    );
    let commands = base::decode_commands_response(resp.data().unwrap()).unwrap();
    for c in 1..=5 {
        assert!(commands.contains(c));
    }
}

#[test]
fn error_completions_reach_the_requester() {
    let (mut host, mut terminus) = pair();

    let resp = ask(&mut host, &mut terminus, types::FRU, 0x01, &[]);
    assert_eq!(resp.completion, CompletionCode::ErrorInvalidPldmType);

    let resp = ask(&mut host, &mut terminus, types::PLATFORM, 0x7F, &[]);
    assert_eq!(resp.completion, CompletionCode::ErrorUnsupportedPldmCmd);

    let resp = ask(&mut host, &mut terminus, types::PLATFORM, CMD_GET_SENSOR_READING, &[0]);
    assert_eq!(resp.completion, CompletionCode::ErrorInvalidData);
    assert!(resp.payload.is_empty());

    let resp = ask(
        &mut host,
        &mut terminus,
        types::BASE,
        CMD_GET_PLDM_COMMANDS,
        &base::get_commands_request(types::PLATFORM, BASE_VERSION),
    );
    assert_eq!(
        resp.completion,
        CompletionCode::Other(base::CC_INVALID_PLDM_VERSION_IN_REQUEST_DATA)
    );
}

#[test]
fn unanswered_request_times_out() {
    let (mut host, _terminus) = pair();
    host.pldm
        .request(&mut host.endpoint, Eid(9), types::BASE, CMD_GET_PLDM_TYPES, &[], 0)
        .unwrap();
    assert!(host.pldm.poll(&mut host.endpoint, 500).is_empty());
    let events = host.pldm.poll(&mut host.endpoint, 1000);
    assert!(matches!(
        events.as_slice(),
        [PldmEvent::Timeout { eid: Eid(9), command: CMD_GET_PLDM_TYPES, .. }]
    ));
    assert_eq!(host.pldm.pending(), 0);
}
