//! Fuzz target: `Reassembler::feed`
//!
//! Interprets the input as a stream of length-prefixed packets with a
//! time delta each, and checks the reassembler's bookkeeping stays
//! within its limits.
//!
//! cargo fuzz run fuzz_reassembler

#![no_main]

use libfuzzer_sys::fuzz_target;
use mctp_pldm::mctp::Packet;
use mctp_pldm::mctp::assembly::Reassembler;

const CONTEXTS: usize = 4;
const MAX_MESSAGE: usize = 512;

fuzz_target!(|data: &[u8]| {
    let mut r = Reassembler::new(CONTEXTS, MAX_MESSAGE, 100);
    let mut now = 0u64;
    let mut rest = data;

    while let [len, dt, tail @ ..] = rest {
        let len = usize::from(*len).min(tail.len());
        let (bytes, next) = tail.split_at(len);
        rest = next;
        now += u64::from(*dt);

        let Ok(packet) = Packet::from_bytes(bytes) else {
            continue;
        };
        if let Ok(Some(msg)) = r.feed(&packet, now) {
            assert!(msg.body.len() <= MAX_MESSAGE);
        }
        assert!(r.in_flight() <= CONTEXTS);
        r.expire(now);
    }
});
