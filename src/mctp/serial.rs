//! MCTP serial binding frame codec (DSP0253).
//!
//! Wire format:
//! ```text
//! ┌──────┬──────┬────────────┬────────────────────────┬────────┬────────┬──────┐
//! │ 0x7E │ 0x01 │ byte count │ MCTP packet (escaped)  │ FCS hi │ FCS lo │ 0x7E │
//! └──────┴──────┴────────────┴────────────────────────┴────────┴────────┴──────┘
//! ```
//!
//! Packet and FCS bytes equal to 0x7E or 0x7D go out as `0x7D, b ^ 0x20`.
//! The byte count is capped below the escape value, so the revision and
//! count are always sent raw.  The FCS covers revision, byte count and
//! the unescaped packet.
//!
//! The decoder accumulates incoming bytes and yields complete packets.
//! Partial reads are fine: a single `Transport::read`
//! may return part of a frame or several frames back to back.

use heapless::Vec as HVec;
use log::warn;

use super::packet::{HEADER_SIZE, Packet};
use crate::crc::{FCS16_INIT, fcs16_update};
use crate::error::FrameError;

pub const FRAME_FLAG: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
const ESCAPE_XOR: u8 = 0x20;

/// Serial binding revision carried in every frame.
pub const SERIAL_REVISION: u8 = 0x01;

/// Largest packet (header + payload) carried in one frame.
pub const SERIAL_MAX_PACKET: usize = 0x7C;

/// Worst-case encoded size of the largest frame.
pub const MAX_FRAME_SIZE: usize = max_frame_len(SERIAL_MAX_PACKET);

/// Worst-case encoded size of a frame carrying `packet_len` bytes.
pub const fn max_frame_len(packet_len: usize) -> usize {
    // flag + revision + count + escaped body + escaped FCS + flag
    3 + 2 * packet_len + 4 + 1
}

/// Decoder state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Hunting for a start flag.
    Idle,
    /// Start flag seen, expecting the revision byte.
    Revision,
    ByteCount,
    Body { collected: usize, escaped: bool },
    Fcs { collected: usize, escaped: bool },
    /// Waiting for the trailing flag.
    End,
}

/// Running decoder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames: u32,
    pub fcs_errors: u32,
    pub framing_errors: u32,
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    expected: usize,
    buf: [u8; SERIAL_MAX_PACKET],
    fcs: [u8; 2],
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            expected: 0,
            buf: [0; SERIAL_MAX_PACKET],
            fcs: [0; 2],
            stats: DecoderStats::default(),
        }
    }

    /// Feed bytes into the decoder, handing every complete packet to
    /// `on_packet`.  Malformed frames are counted and skipped.
    pub fn feed(&mut self, data: &[u8], mut on_packet: impl FnMut(Packet)) {
        for &b in data {
            match self.decode_byte(b) {
                Ok(Some(packet)) => on_packet(packet),
                Ok(None) => {}
                Err(e) => warn!("serial: dropped frame: {}", e),
            }
        }
    }

    /// Advance the state machine by one byte.
    pub fn decode_byte(&mut self, b: u8) -> Result<Option<Packet>, FrameError> {
        let result = self.step(b);
        match &result {
            Ok(Some(_)) => self.stats.frames += 1,
            Err(FrameError::FcsMismatch { .. }) => self.stats.fcs_errors += 1,
            Err(_) => self.stats.framing_errors += 1,
            Ok(None) => {}
        }
        result
    }

    fn step(&mut self, b: u8) -> Result<Option<Packet>, FrameError> {
        match self.state {
            DecoderState::Idle => {
                if b == FRAME_FLAG {
                    self.state = DecoderState::Revision;
                }
                Ok(None)
            }

            DecoderState::Revision => {
                if b == FRAME_FLAG {
                    // Back-to-back flags.
                    return Ok(None);
                }
                if b != SERIAL_REVISION {
                    self.state = DecoderState::Idle;
                    return Err(FrameError::BadRevision(b));
                }
                self.state = DecoderState::ByteCount;
                Ok(None)
            }

            DecoderState::ByteCount => {
                let n = usize::from(b);
                if !(HEADER_SIZE..=SERIAL_MAX_PACKET).contains(&n) {
                    self.state = if b == FRAME_FLAG {
                        DecoderState::Revision
                    } else {
                        DecoderState::Idle
                    };
                    return Err(FrameError::BadLength(b));
                }
                self.expected = n;
                self.state = DecoderState::Body {
                    collected: 0,
                    escaped: false,
                };
                Ok(None)
            }

            DecoderState::Body { collected, escaped } => {
                let Some(v) = self.unescape(b, escaped)? else {
                    self.state = DecoderState::Body {
                        collected,
                        escaped: true,
                    };
                    return Ok(None);
                };
                self.buf[collected] = v;
                let collected = collected + 1;
                self.state = if collected == self.expected {
                    DecoderState::Fcs {
                        collected: 0,
                        escaped: false,
                    }
                } else {
                    DecoderState::Body {
                        collected,
                        escaped: false,
                    }
                };
                Ok(None)
            }

            DecoderState::Fcs { collected, escaped } => {
                let Some(v) = self.unescape(b, escaped)? else {
                    self.state = DecoderState::Fcs {
                        collected,
                        escaped: true,
                    };
                    return Ok(None);
                };
                self.fcs[collected] = v;
                self.state = if collected == 1 {
                    DecoderState::End
                } else {
                    DecoderState::Fcs {
                        collected: 1,
                        escaped: false,
                    }
                };
                Ok(None)
            }

            DecoderState::End => {
                self.state = DecoderState::Idle;
                if b != FRAME_FLAG {
                    return Err(FrameError::MissingEndFlag);
                }
                let packet = &self.buf[..self.expected];
                let expected = frame_fcs(packet);
                let found = u16::from_be_bytes(self.fcs);
                if expected != found {
                    return Err(FrameError::FcsMismatch { expected, found });
                }
                Packet::from_bytes(packet)
                    .map(Some)
                    .map_err(|_| FrameError::InvalidHeader)
            }
        }
    }

    /// Resolve escaping for one body/FCS byte.  `Ok(None)` means an escape
    /// byte was consumed and the next byte completes the value.
    fn unescape(&mut self, b: u8, escaped: bool) -> Result<Option<u8>, FrameError> {
        if b == FRAME_FLAG {
            // Treat the flag as the start of a new frame.
            self.state = DecoderState::Revision;
            return Err(FrameError::UnexpectedFlag);
        }
        if escaped {
            return Ok(Some(b ^ ESCAPE_XOR));
        }
        if b == ESCAPE {
            return Ok(None);
        }
        Ok(Some(b))
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.expected = 0;
    }

    /// Whether the decoder is in the middle of a frame.
    pub fn in_frame(&self) -> bool {
        !matches!(self.state, DecoderState::Idle)
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn frame_fcs(packet: &[u8]) -> u16 {
    let fcs = fcs16_update(FCS16_INIT, &[SERIAL_REVISION, packet.len() as u8]);
    fcs16_update(fcs, packet)
}

fn push_escaped(out: &mut [u8], pos: &mut usize, b: u8) {
    if b == FRAME_FLAG || b == ESCAPE {
        out[*pos] = ESCAPE;
        out[*pos + 1] = b ^ ESCAPE_XOR;
        *pos += 2;
    } else {
        out[*pos] = b;
        *pos += 1;
    }
}

/// Encode a packet (header + payload) into a serial frame.
///
/// Returns the number of bytes written to `out`.  `out` must be able to
/// hold the worst case, [`max_frame_len`] of the packet length.
pub fn encode_frame(packet: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    if packet.len() < HEADER_SIZE {
        return Err(FrameError::PacketTooShort);
    }
    if packet.len() > SERIAL_MAX_PACKET {
        return Err(FrameError::PacketTooLarge);
    }
    if out.len() < max_frame_len(packet.len()) {
        return Err(FrameError::BufferTooSmall);
    }

    let mut pos = 0;
    out[0] = FRAME_FLAG;
    out[1] = SERIAL_REVISION;
    out[2] = packet.len() as u8;
    pos += 3;

    for &b in packet {
        push_escaped(out, &mut pos, b);
    }

    let [hi, lo] = frame_fcs(packet).to_be_bytes();
    push_escaped(out, &mut pos, hi);
    push_escaped(out, &mut pos, lo);

    out[pos] = FRAME_FLAG;
    Ok(pos + 1)
}

/// Encode a packet into an owned fixed-capacity buffer.
pub fn encode_packet(packet: &Packet) -> Result<HVec<u8, MAX_FRAME_SIZE>, FrameError> {
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let len = encode_frame(packet.as_bytes(), &mut buf)?;
    let mut out = HVec::new();
    out.extend_from_slice(&buf[..len])
        .map_err(|_| FrameError::BufferTooSmall)?;
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────
