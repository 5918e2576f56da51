//! MCTP endpoint stack.
//!
//! **Transport-decoupled**: the endpoint does not own any link. Callers
//! feed `(link, packet)` pairs via [`Endpoint::handle_packet`] and drain
//! outgoing packets from the outbox. [`LinkSet`](super::link::LinkSet)
//! and the I/O task bridge byte transports to this stack.
//!
//! Every inbound packet passes through a routing gate:
//!
//! 1. **Local**: destination is our EID, NULL or broadcast. The packet
//!    is reassembled; control requests are answered in place, anything
//!    else lands in the inbox.
//! 2. **Forward**: a route points at a different link. The packet is
//!    requeued unchanged.
//! 3. **Drop**: counted in [`EndpointStats::dropped`].

use std::collections::VecDeque;

use log::{debug, info};
use serde::Serialize;

use super::assembly::{Reassembler, fragment};
use super::control::{ControlResponder, EndpointType};
use super::eid::Eid;
use super::packet::{BASELINE_MTU, Message, MessageType, Packet};
use super::routing::{LinkId, RoutingTable};
use super::tags::TagAllocator;
use crate::config::{MctpConfig, Mode};
use crate::error::{Result, RouteError};

/// Reassembly contexts kept per link.
const CONTEXTS_PER_LINK: usize = 8;

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Local EID; NULL until a bus owner assigns one.
    pub eid: Eid,
    pub mtu: usize,
    pub reassembly_timeout_ms: u64,
    pub max_message_size: usize,
    pub tag_timeout_ms: u64,
    pub endpoint_type: EndpointType,
    pub uuid: [u8; 16],
    /// Message types reported by Get Message Type Support.
    pub message_types: Vec<u8>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            eid: Eid::NULL,
            mtu: BASELINE_MTU,
            reassembly_timeout_ms: 100,
            max_message_size: 4096,
            tag_timeout_ms: 30,
            endpoint_type: EndpointType::Simple,
            uuid: [0; 16],
            message_types: vec![MessageType::Control.code(), MessageType::Pldm.code()],
        }
    }
}

impl EndpointConfig {
    pub fn from_config(cfg: &MctpConfig, eid: Eid) -> Self {
        Self {
            eid,
            mtu: cfg.mctp.mtu,
            reassembly_timeout_ms: u64::from(cfg.mctp.reassembly_timeout_ms),
            max_message_size: cfg.mctp.max_message_size,
            tag_timeout_ms: u64::from(cfg.mctp.message_timeout_ms),
            endpoint_type: match cfg.mode {
                Mode::BusOwner => EndpointType::BusOwnerBridge,
                Mode::Endpoint => EndpointType::Simple,
            },
            ..Self::default()
        }
    }
}

/// Packet and message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    pub rx_packets: u32,
    pub tx_packets: u32,
    pub rx_messages: u32,
    pub tx_messages: u32,
    pub forwarded: u32,
    pub dropped: u32,
    pub assembly_errors: u32,
}

pub struct Endpoint {
    config: EndpointConfig,
    control: ControlResponder,
    reassemblers: Vec<Reassembler>,
    tags: TagAllocator,
    routes: RoutingTable,
    inbox: VecDeque<(LinkId, Message)>,
    outbox: VecDeque<(LinkId, Packet)>,
    stats: EndpointStats,
}

impl Endpoint {
    pub fn new(config: EndpointConfig) -> Self {
        let control = ControlResponder::new(
            config.eid,
            config.endpoint_type,
            config.uuid,
            &config.message_types,
        );
        Self {
            tags: TagAllocator::new(config.tag_timeout_ms),
            control,
            config,
            reassemblers: Vec::new(),
            routes: RoutingTable::new(),
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
            stats: EndpointStats::default(),
        }
    }

    /// Register a physical link and return its id.
    pub fn add_link(&mut self) -> LinkId {
        let id = self.reassemblers.len() as LinkId;
        self.reassemblers.push(Reassembler::new(
            CONTEXTS_PER_LINK,
            self.config.max_message_size,
            self.config.reassembly_timeout_ms,
        ));
        id
    }

    pub fn link_count(&self) -> usize {
        self.reassemblers.len()
    }

    pub fn eid(&self) -> Eid {
        self.config.eid
    }

    pub fn set_eid(&mut self, eid: Eid) {
        self.config.eid = eid;
        self.control.set_eid(eid);
    }

    pub fn mtu(&self) -> usize {
        self.config.mtu
    }

    /// Process one packet received on `link`.
    pub fn handle_packet(&mut self, link: LinkId, packet: Packet, now_ms: u64) -> Result<()> {
        self.check_link(link)?;
        self.stats.rx_packets += 1;
        let dest = packet.header().dest;

        if self.is_local(dest) {
            self.deliver_local(link, &packet, now_ms);
            return Ok(());
        }

        match self.routes.lookup(dest) {
            Some(route) if route.link != link => {
                self.outbox.push_back((route.link, packet));
                self.stats.forwarded += 1;
            }
            _ => {
                debug!("MCTP[{}]: no route to EID {}, dropping packet", link, dest);
                self.stats.dropped += 1;
            }
        }
        Ok(())
    }

    /// Send a request to `dest` over the routed link. Returns the tag.
    pub fn send(&mut self, dest: Eid, msg_type: MessageType, body: &[u8], now_ms: u64) -> Result<u8> {
        let link = self
            .routes
            .lookup(dest)
            .map(|r| r.link)
            .ok_or(RouteError::NoRoute(dest.0))?;
        self.send_on_link(link, dest, msg_type, body, now_ms)
    }

    /// Send a request on an explicit link, bypassing the routing table.
    pub fn send_on_link(
        &mut self,
        link: LinkId,
        dest: Eid,
        msg_type: MessageType,
        body: &[u8],
        now_ms: u64,
    ) -> Result<u8> {
        self.check_link(link)?;
        let tag = self.tags.allocate(dest, now_ms)?;
        let mut msg = Message::request(dest, self.config.eid, msg_type, body);
        msg.tag = tag;
        if let Err(e) = self.queue(link, &msg) {
            self.tags.release(dest, tag);
            return Err(e);
        }
        Ok(tag)
    }

    /// Answer `request`, which arrived on `link`.
    pub fn respond(&mut self, link: LinkId, request: &Message, body: &[u8]) -> Result<()> {
        self.check_link(link)?;
        let msg = Message {
            dest: request.source,
            source: self.config.eid,
            tag_owner: false,
            tag: request.tag,
            msg_type: request.msg_type,
            ic: false,
            body: body.to_vec(),
        };
        self.queue(link, &msg)
    }

    /// Next complete message for the application.
    pub fn recv(&mut self) -> Option<(LinkId, Message)> {
        self.inbox.pop_front()
    }

    pub fn drain_outbox(&mut self) -> impl Iterator<Item = (LinkId, Packet)> + '_ {
        self.outbox.drain(..)
    }

    /// Take the next outgoing packet.
    pub fn next_outgoing(&mut self) -> Option<(LinkId, Packet)> {
        self.outbox.pop_front()
    }

    /// Return a packet that could not be handed to a link yet.
    pub fn unsend(&mut self, link: LinkId, packet: Packet) {
        self.outbox.push_front((link, packet));
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Time out reassembly contexts and held tags.
    pub fn expire(&mut self, now_ms: u64) {
        for r in &mut self.reassemblers {
            self.stats.assembly_errors += r.expire(now_ms) as u32;
        }
        self.tags.expire(now_ms);
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut RoutingTable {
        &mut self.routes
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    fn is_local(&self, dest: Eid) -> bool {
        dest == self.config.eid || dest.is_null() || dest.is_broadcast()
    }

    fn check_link(&self, link: LinkId) -> Result<()> {
        if usize::from(link) < self.reassemblers.len() {
            Ok(())
        } else {
            Err(RouteError::UnknownLink(link).into())
        }
    }

    fn deliver_local(&mut self, link: LinkId, packet: &Packet, now_ms: u64) {
        match self.reassemblers[usize::from(link)].feed(packet, now_ms) {
            Ok(Some(msg)) => self.dispatch(link, msg),
            Ok(None) => {}
            Err(e) => {
                debug!("MCTP[{}]: {}", link, e);
                self.stats.assembly_errors += 1;
            }
        }
    }

    fn dispatch(&mut self, link: LinkId, msg: Message) {
        self.stats.rx_messages += 1;

        if msg.msg_type == MessageType::Control && msg.tag_owner {
            if let Some(body) = self.control.handle(msg.source, &msg.body) {
                let assigned = self.control.eid();
                if assigned != self.config.eid {
                    info!("MCTP[{}]: local EID now {}", link, assigned);
                    self.config.eid = assigned;
                }
                if let Err(e) = self.respond(link, &msg, &body) {
                    debug!("MCTP[{}]: control response not sent: {}", link, e);
                }
            }
            return;
        }

        if !msg.tag_owner {
            // Requests sent by physical address are held under the NULL EID.
            if !self.tags.release(msg.source, msg.tag) {
                self.tags.release(Eid::NULL, msg.tag);
            }
        }
        self.inbox.push_back((link, msg));
    }

    fn queue(&mut self, link: LinkId, msg: &Message) -> Result<()> {
        let packets = fragment(msg, self.config.mtu)?;
        self.stats.tx_packets += packets.len() as u32;
        self.stats.tx_messages += 1;
        self.outbox.extend(packets.into_iter().map(|p| (link, p)));
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────
