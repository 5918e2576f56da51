//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary bytes into the serial frame decoder and checks that
//! every emitted packet re-encodes to a frame the decoder accepts again.
//!
//! cargo fuzz run fuzz_serial_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use mctp_pldm::mctp::serial::{FrameDecoder, encode_packet};

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();
    let mut packets = Vec::new();
    decoder.feed(data, |p| packets.push(p));

    for p in packets {
        let frame = encode_packet(&p).expect("decoded packet must re-encode");
        let mut again = Vec::new();
        FrameDecoder::new().feed(&frame, |q| again.push(q));
        assert_eq!(again, vec![p]);
    }

    decoder.reset();
    assert!(!decoder.in_frame());
});
