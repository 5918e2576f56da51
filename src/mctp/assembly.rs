//! Message fragmentation and reassembly.
//!
//! A message larger than the link MTU is split into packets carrying
//! SOM/EOM flags and a rolling 2-bit sequence number.
//!
//! ```text
//! Packet 1: [SOM      seq=0]  type byte + body part 1
//! Packet 2: [         seq=1]  body part 2
//! Packet N: [EOM  seq=(N-1)%4] body part N (final)
//! ```
//!
//! The receiver keys in-flight messages by `(source EID, tag, TO)` and
//! reassembles packets before handing the complete message up the stack.

use log::{debug, warn};

use super::eid::Eid;
use super::packet::{HEADER_SIZE, MAX_PACKET_SIZE, Message, MessageType, Packet, PacketHeader};
use crate::error::{AssemblyError, Error, Result};

/// Split a message into packets of at most `mtu` payload bytes.
pub fn fragment(msg: &Message, mtu: usize) -> Result<Vec<Packet>> {
    if mtu == 0 || mtu > MAX_PACKET_SIZE - HEADER_SIZE {
        return Err(AssemblyError::InvalidMtu.into());
    }

    let mut data = Vec::with_capacity(msg.body.len() + 1);
    data.push(msg.msg_type.to_byte(msg.ic));
    data.extend_from_slice(&msg.body);

    let chunks: Vec<&[u8]> = data.chunks(mtu).collect();
    let total = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let header = PacketHeader {
                dest: msg.dest,
                source: msg.source,
                som: i == 0,
                eom: i == total - 1,
                seq: (i % 4) as u8,
                tag_owner: msg.tag_owner,
                tag: msg.tag,
            };
            Packet::new(&header, chunk).map_err(Error::from)
        })
        .collect()
}

type ContextKey = (Eid, u8, bool);

struct Context {
    key: ContextKey,
    dest: Eid,
    msg_type: MessageType,
    ic: bool,
    next_seq: u8,
    body: Vec<u8>,
    last_ms: u64,
}

/// Reassembly buffer for incoming packets.
pub struct Reassembler {
    contexts: Vec<Context>,
    max_contexts: usize,
    max_message_size: usize,
    timeout_ms: u64,
}

impl Reassembler {
    pub fn new(max_contexts: usize, max_message_size: usize, timeout_ms: u64) -> Self {
        Self {
            contexts: Vec::with_capacity(max_contexts),
            max_contexts,
            max_message_size,
            timeout_ms,
        }
    }

    /// Feed a packet into the reassembler.
    ///
    /// Returns `Some(message)` when the final packet arrives and `None`
    /// when more packets are expected.
    pub fn feed(
        &mut self,
        packet: &Packet,
        now_ms: u64,
    ) -> core::result::Result<Option<Message>, AssemblyError> {
        let h = packet.header();
        let key = (h.source, h.tag, h.tag_owner);
        let payload = packet.payload();

        if h.som {
            if let Some(i) = self.find(key) {
                warn!(
                    "assembly: new message from EID {} tag {} replaces unfinished one",
                    h.source, h.tag
                );
                self.contexts.swap_remove(i);
            }

            let (&type_byte, rest) = payload.split_first().ok_or(AssemblyError::MissingType)?;
            let (msg_type, ic) = MessageType::from_byte(type_byte);
            if rest.len() > self.max_message_size {
                return Err(AssemblyError::MessageTooLarge);
            }

            if h.eom {
                return Ok(Some(Message {
                    dest: h.dest,
                    source: h.source,
                    tag_owner: h.tag_owner,
                    tag: h.tag,
                    msg_type,
                    ic,
                    body: rest.to_vec(),
                }));
            }

            if self.contexts.len() >= self.max_contexts {
                return Err(AssemblyError::ContextsFull);
            }
            self.contexts.push(Context {
                key,
                dest: h.dest,
                msg_type,
                ic,
                next_seq: (h.seq + 1) & 0x03,
                body: rest.to_vec(),
                last_ms: now_ms,
            });
            return Ok(None);
        }

        let i = self.find(key).ok_or(AssemblyError::UnexpectedPacket)?;
        let ctx = &mut self.contexts[i];

        if h.seq != ctx.next_seq || h.dest != ctx.dest {
            debug!(
                "assembly: EID {} tag {} expected seq {}, got {}",
                h.source, h.tag, ctx.next_seq, h.seq
            );
            self.contexts.swap_remove(i);
            return Err(AssemblyError::OutOfSequence);
        }
        if ctx.body.len() + payload.len() > self.max_message_size {
            self.contexts.swap_remove(i);
            return Err(AssemblyError::MessageTooLarge);
        }

        ctx.body.extend_from_slice(payload);
        ctx.next_seq = (ctx.next_seq + 1) & 0x03;
        ctx.last_ms = now_ms;

        if !h.eom {
            return Ok(None);
        }

        let ctx = self.contexts.swap_remove(i);
        Ok(Some(Message {
            dest: ctx.dest,
            source: ctx.key.0,
            tag_owner: ctx.key.2,
            tag: ctx.key.1,
            msg_type: ctx.msg_type,
            ic: ctx.ic,
            body: ctx.body,
        }))
    }

    /// Drop contexts that have seen no packet for `timeout_ms`.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let before = self.contexts.len();
        let timeout = self.timeout_ms;
        self.contexts
            .retain(|c| now_ms.saturating_sub(c.last_ms) < timeout);
        let dropped = before - self.contexts.len();
        if dropped > 0 {
            warn!("assembly: {} incomplete message(s) timed out", dropped);
        }
        dropped
    }

    /// Number of messages being reassembled.
    pub fn in_flight(&self) -> usize {
        self.contexts.len()
    }

    /// Discard any partial data.
    pub fn reset(&mut self) {
        self.contexts.clear();
    }

    fn find(&self, key: ContextKey) -> Option<usize> {
        self.contexts.iter().position(|c| c.key == key)
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(body: &[u8]) -> Message {
        let mut m = Message::request(Eid(9), Eid(8), MessageType::Pldm, body);
        m.tag = 3;
        m
    }

    fn reassembler() -> Reassembler {
        Reassembler::new(4, 1024, 100)
    }

    #[test]
    fn small_message_single_packet() {
        let packets = fragment(&msg(b"hello"), 64).unwrap();
        assert_eq!(packets.len(), 1);
        let h = packets[0].header();
        assert!(h.som && h.eom);
        assert_eq!(packets[0].payload()[0], 0x01);

        let mut r = reassembler();
        assert_eq!(r.feed(&packets[0], 0).unwrap(), Some(msg(b"hello")));
    }

    #[test]
    fn empty_body_still_carries_type() {
        let packets = fragment(&msg(&[]), 64).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload(), &[0x01]);
    }

    #[test]
    fn large_message_fragmented() {
        let body = vec![0xAA; 200]; // 201 bytes with type -> 4 packets at 64
        let packets = fragment(&msg(&body), 64).unwrap();
        assert_eq!(packets.len(), 4);

        for (i, p) in packets.iter().enumerate() {
            let h = p.header();
            assert_eq!(h.som, i == 0);
            assert_eq!(h.eom, i == packets.len() - 1);
            assert_eq!(usize::from(h.seq), i % 4);
            assert_eq!(h.tag, 3);
            assert!(h.tag_owner);
        }

        let total: usize = packets.iter().map(|p| p.payload().len()).sum();
        assert_eq!(total, body.len() + 1);

        let mut r = reassembler();
        for p in &packets[..3] {
            assert!(r.feed(p, 0).unwrap().is_none());
        }
        assert_eq!(r.in_flight(), 1);
        let out = r.feed(&packets[3], 0).unwrap().unwrap();
        assert_eq!(out.body, body);
        assert_eq!(r.in_flight(), 0);
    }

    #[test]
    fn sequence_wraps() {
        let body = vec![0x55; 64 * 6];
        let packets = fragment(&msg(&body), 64).unwrap();
        assert_eq!(packets[4].header().seq, 0);
        let mut r = reassembler();
        let mut out = None;
        for p in &packets {
            out = r.feed(p, 0).unwrap();
        }
        assert_eq!(out.unwrap().body, body);
    }

    #[test]
    fn destination_change_discards_context() {
        let packets = fragment(&msg(&[2u8; 150]), 64).unwrap();
        let mut redirected = packets[1].header();
        assert_eq!((redirected.dest, redirected.seq), (Eid(9), 1));
        redirected.dest = Eid(10);
        let stray = Packet::new(&redirected, packets[1].payload()).unwrap();

        let mut r = reassembler();
        assert!(r.feed(&packets[0], 0).unwrap().is_none());
        assert_eq!(r.feed(&stray, 0), Err(AssemblyError::OutOfSequence));
        assert_eq!(r.in_flight(), 0);
        // The rest of the original message has nothing to attach to.
        assert_eq!(r.feed(&packets[2], 0), Err(AssemblyError::UnexpectedPacket));
    }

    #[test]
    fn out_of_sequence_discards_context() {
        let packets = fragment(&msg(&[1u8; 150]), 64).unwrap();
        let mut r = reassembler();
        r.feed(&packets[0], 0).unwrap();
        assert_eq!(r.feed(&packets[2], 0), Err(AssemblyError::OutOfSequence));
        assert_eq!(r.in_flight(), 0);
        assert_eq!(r.feed(&packets[1], 0), Err(AssemblyError::UnexpectedPacket));
    }

    #[test]
    fn middle_without_start_dropped() {
        let packets = fragment(&msg(&[1u8; 150]), 64).unwrap();
        let mut r = reassembler();
        assert_eq!(r.feed(&packets[1], 0), Err(AssemblyError::UnexpectedPacket));
    }

    #[test]
    fn new_som_replaces_stale_context() {
        let first = fragment(&msg(&[1u8; 150]), 64).unwrap();
        let second = fragment(&msg(b"short"), 64).unwrap();
        let mut r = reassembler();
        r.feed(&first[0], 0).unwrap();
        let out = r.feed(&second[0], 0).unwrap().unwrap();
        assert_eq!(out.body, b"short");
        assert_eq!(r.in_flight(), 0);
    }

    #[test]
    fn interleaved_tags_kept_apart() {
        let mut a = msg(&[0xA; 100]);
        a.tag = 1;
        let mut b = msg(&[0xB; 100]);
        b.tag = 2;
        let pa = fragment(&a, 64).unwrap();
        let pb = fragment(&b, 64).unwrap();
        let mut r = reassembler();
        r.feed(&pa[0], 0).unwrap();
        r.feed(&pb[0], 0).unwrap();
        assert_eq!(r.feed(&pb[1], 0).unwrap().unwrap(), b);
        assert_eq!(r.feed(&pa[1], 0).unwrap().unwrap(), a);
    }

    #[test]
    fn too_large_rejected() {
        let mut r = Reassembler::new(4, 100, 100);
        let packets = fragment(&msg(&[0u8; 150]), 64).unwrap();
        r.feed(&packets[0], 0).unwrap();
        r.feed(&packets[1], 0).unwrap_err();
        assert_eq!(r.in_flight(), 0);
    }

    #[test]
    fn contexts_full() {
        let mut r = Reassembler::new(1, 1024, 100);
        let mut a = msg(&[0u8; 100]);
        a.tag = 1;
        let mut b = a.clone();
        b.tag = 2;
        r.feed(&fragment(&a, 64).unwrap()[0], 0).unwrap();
        assert_eq!(
            r.feed(&fragment(&b, 64).unwrap()[0], 0),
            Err(AssemblyError::ContextsFull)
        );
    }

    #[test]
    fn missing_type_byte() {
        let h = PacketHeader {
            dest: Eid(9),
            source: Eid(8),
            som: true,
            eom: true,
            seq: 0,
            tag_owner: true,
            tag: 0,
        };
        let p = Packet::new(&h, &[]).unwrap();
        assert_eq!(reassembler().feed(&p, 0), Err(AssemblyError::MissingType));
    }

    #[test]
    fn expire_drops_idle_contexts() {
        let packets = fragment(&msg(&[1u8; 150]), 64).unwrap();
        let mut r = reassembler();
        r.feed(&packets[0], 1000).unwrap();
        assert_eq!(r.expire(1050), 0);
        r.feed(&packets[1], 1080).unwrap();
        assert_eq!(r.expire(1150), 0);
        assert_eq!(r.expire(1180), 1);
        assert_eq!(r.feed(&packets[2], 1190), Err(AssemblyError::UnexpectedPacket));
    }

    #[test]
    fn invalid_mtu() {
        assert!(fragment(&msg(b"x"), 0).is_err());
        assert!(fragment(&msg(b"x"), MAX_PACKET_SIZE).is_err());
    }
}
