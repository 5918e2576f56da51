//! Fuzz target: `PldmResponder::handle_request`
//!
//! Every answer must be a response to the request it came from.
//!
//! cargo fuzz run fuzz_pldm_responder

#![no_main]

use libfuzzer_sys::fuzz_target;
use mctp_pldm::pldm::{MessageKind, PldmHeader, PldmResponder};

fuzz_target!(|data: &[u8]| {
    let mut responder = PldmResponder::new(1);
    let Some(reply) = responder.handle_request(data) else {
        return;
    };
    let request = PldmHeader::parse(data).expect("answered request must parse");
    let response = PldmHeader::parse(&reply).expect("response must parse");
    assert_eq!(request.kind, MessageKind::Request);
    assert_eq!(response, request.to_response());
    assert!(reply.len() > 3, "response carries a completion code");
});
