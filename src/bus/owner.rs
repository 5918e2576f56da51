//! Bus owner: dynamic EID assignment over attached links.
//!
//! ```text
//!  enumerate_link ──▶ Set Endpoint ID (to NULL EID) ──▶ Pending
//!                                                        │
//!           ┌───────────── accepted ◀────────────────────┤
//!           ▼                                            ├── rejected / cc ──▶ Failed
//!      Assigned(eid) ──▶ Get Message Type Support        └── timeout × retries ─▶ Failed
//!           │
//!           └── pool required ──▶ Allocate Endpoint IDs ──▶ bridged route
//! ```
//!
//! The bus owner drives an [`Endpoint`] and consumes control responses
//! from its inbox; every other message is kept for the caller.

use std::collections::VecDeque;

use log::{debug, info, warn};
use serde::Serialize;

use crate::app::events::BusEvent;
use crate::app::ports::EventSink;
use crate::config::MctpConfig;
use crate::error::{Result, RouteError};
use crate::mctp::control::{
    AllocateEndpointIdsResponse, CMD_ALLOCATE_ENDPOINT_IDS, CMD_GET_MESSAGE_TYPE_SUPPORT,
    CMD_SET_ENDPOINT_ID, ControlHeader, MessageTypeSupportResponse, SetEidOperation,
    SetEndpointIdResponse, allocate_endpoint_ids_request, get_message_type_support_request,
    set_endpoint_id_request,
};
use crate::mctp::eid::{Eid, EidPool};
use crate::mctp::endpoint::Endpoint;
use crate::mctp::packet::{Message, MessageType};
use crate::mctp::routing::{LinkId, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusOwnerConfig {
    pub network_id: u32,
    pub response_timeout_ms: u64,
    pub retries: u8,
}

impl BusOwnerConfig {
    pub fn from_config(cfg: &MctpConfig) -> Self {
        Self {
            network_id: cfg.mctp.network_id,
            response_timeout_ms: u64::from(cfg.mctp.message_timeout_ms),
            retries: cfg.bus_owner.set_eid_retries,
        }
    }
}

/// Enumeration progress of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    Unassigned,
    Pending,
    Assigned(Eid),
    Failed,
}

/// EIDs granted to a bridge for the endpoints behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownstreamPool {
    pub first: Eid,
    pub count: u8,
}

/// An endpoint the bus owner has assigned an EID to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredEndpoint {
    pub eid: Eid,
    pub network_id: u32,
    pub link: LinkId,
    pub message_types: Vec<u8>,
    /// Set once a bridge accepts Allocate Endpoint IDs.
    pub downstream: Option<DownstreamPool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    SetEid,
    MessageTypes,
    /// The block is held in the pool while the request is outstanding.
    AllocatePool(DownstreamPool),
}

#[derive(Debug)]
struct PendingRequest {
    kind: RequestKind,
    link: LinkId,
    /// Address the request goes to (NULL before assignment).
    dest: Eid,
    /// EID the request concerns.
    eid: Eid,
    instance: u8,
    command: u8,
    /// Tags of every attempt, so late answers still match.
    tags: Vec<u8>,
    body: Vec<u8>,
    sent_ms: u64,
    retries_left: u8,
}

pub struct BusOwner {
    endpoint: Endpoint,
    pool: EidPool,
    config: BusOwnerConfig,
    links: Vec<LinkState>,
    endpoints: Vec<DiscoveredEndpoint>,
    pending: Vec<PendingRequest>,
    messages: VecDeque<(LinkId, Message)>,
    next_instance: u8,
}

impl BusOwner {
    pub fn new(endpoint: Endpoint, mut pool: EidPool, config: BusOwnerConfig) -> Self {
        let own = endpoint.eid();
        if pool.contains(own) && pool.reserve(own).is_ok() {
            debug!("bus: reserved own EID {}", own);
        }
        Self {
            endpoint,
            pool,
            config,
            links: Vec::new(),
            endpoints: Vec::new(),
            pending: Vec::new(),
            messages: VecDeque::new(),
            next_instance: 0,
        }
    }

    /// Start EID assignment on `link`. Returns the EID offered.
    pub fn enumerate_link(&mut self, link: LinkId, now_ms: u64) -> Result<Eid> {
        if usize::from(link) >= self.endpoint.link_count() {
            return Err(RouteError::UnknownLink(link).into());
        }
        match self.link_state(link) {
            LinkState::Assigned(eid) => return Ok(eid),
            LinkState::Pending => {
                if let Some(p) = self
                    .pending
                    .iter()
                    .find(|p| p.link == link && p.kind == RequestKind::SetEid)
                {
                    return Ok(p.eid);
                }
            }
            LinkState::Unassigned | LinkState::Failed => {}
        }

        let eid = self.pool.allocate()?;
        let instance = self.next_instance();
        let body = set_endpoint_id_request(instance, SetEidOperation::Set, eid);
        let request = PendingRequest {
            kind: RequestKind::SetEid,
            link,
            dest: Eid::NULL,
            eid,
            instance,
            command: CMD_SET_ENDPOINT_ID,
            tags: Vec::new(),
            body,
            sent_ms: now_ms,
            retries_left: self.config.retries,
        };
        if let Err(e) = self.submit(request, now_ms) {
            let _ = self.pool.release(eid);
            return Err(e);
        }

        info!("bus: link {} offered EID {}", link, eid);
        *self.state_mut(link) = LinkState::Pending;
        Ok(eid)
    }

    /// Consume control responses and handle timeouts.
    pub fn tick(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        self.endpoint.expire(now_ms);

        while let Some((link, msg)) = self.endpoint.recv() {
            if msg.msg_type == MessageType::Control && !msg.tag_owner {
                self.handle_control_response(link, &msg, now_ms, sink);
            } else {
                self.messages.push_back((link, msg));
            }
        }

        let timeout = self.config.response_timeout_ms;
        let mut i = 0;
        while i < self.pending.len() {
            if now_ms.saturating_sub(self.pending[i].sent_ms) < timeout {
                i += 1;
                continue;
            }
            let mut p = self.pending.swap_remove(i);
            if p.retries_left > 0 {
                p.retries_left -= 1;
                debug!("bus: link {} retrying command 0x{:02x}", p.link, p.command);
                let (kind, link, eid) = (p.kind, p.link, p.eid);
                if let Err(e) = self.submit(p, now_ms) {
                    self.give_up(kind, link, eid, &e.to_string(), sink);
                }
            } else {
                self.give_up(p.kind, p.link, p.eid, "no response", sink);
            }
        }
    }

    /// Forget a link: release its EIDs and drop its routes.
    pub fn remove_link(&mut self, link: LinkId, sink: &mut impl EventSink) {
        let (dropped, pending): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.link == link);
        self.pending = pending;
        for p in dropped {
            match p.kind {
                RequestKind::SetEid => {
                    let _ = self.pool.release(p.eid);
                }
                RequestKind::AllocatePool(block) => self.release_block(block),
                RequestKind::MessageTypes => {}
            }
        }

        let (gone, kept): (Vec<_>, Vec<_>) =
            self.endpoints.drain(..).partition(|e| e.link == link);
        self.endpoints = kept;
        for ep in gone {
            let _ = self.pool.release(ep.eid);
            if let Some(block) = ep.downstream {
                self.release_block(block);
            }
            info!("bus: EID {} removed with link {}", ep.eid, link);
            sink.emit(&BusEvent::EndpointRemoved { link, eid: ep.eid });
        }

        self.endpoint.routes_mut().remove_link(link);
        if let Some(state) = self.links.get_mut(usize::from(link)) {
            *state = LinkState::Unassigned;
        }
    }

    pub fn endpoints(&self) -> &[DiscoveredEndpoint] {
        &self.endpoints
    }

    pub fn discovered(&self, eid: Eid) -> Option<&DiscoveredEndpoint> {
        self.endpoints.iter().find(|e| e.eid == eid)
    }

    pub fn link_for_eid(&self, eid: Eid) -> Option<LinkId> {
        self.discovered(eid).map(|e| e.link)
    }

    pub fn link_state(&self, link: LinkId) -> LinkState {
        self.links
            .get(usize::from(link))
            .copied()
            .unwrap_or(LinkState::Unassigned)
    }

    /// No request is outstanding.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    /// Messages other than control responses received since the last call.
    pub fn take_messages(&mut self) -> Vec<(LinkId, Message)> {
        self.messages.drain(..).collect()
    }

    pub fn stack(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    pub fn pool(&self) -> &EidPool {
        &self.pool
    }

    fn next_instance(&mut self) -> u8 {
        let id = self.next_instance;
        self.next_instance = (id + 1) & 0x1F;
        id
    }

    fn state_mut(&mut self, link: LinkId) -> &mut LinkState {
        let idx = usize::from(link);
        if self.links.len() <= idx {
            self.links.resize(idx + 1, LinkState::Unassigned);
        }
        &mut self.links[idx]
    }

    fn submit(&mut self, mut request: PendingRequest, now_ms: u64) -> Result<()> {
        let tag = self.endpoint.send_on_link(
            request.link,
            request.dest,
            MessageType::Control,
            &request.body,
            now_ms,
        )?;
        request.tags.push(tag);
        request.sent_ms = now_ms;
        self.pending.push(request);
        Ok(())
    }

    fn handle_control_response(
        &mut self,
        link: LinkId,
        msg: &Message,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) {
        let Ok(header) = ControlHeader::parse(&msg.body) else {
            debug!("bus: truncated control response on link {}", link);
            return;
        };
        let Some(i) = self.pending.iter().position(|p| {
            p.link == link
                && p.instance == header.instance
                && p.command == header.command
                && p.tags.contains(&msg.tag)
        }) else {
            debug!(
                "bus: unmatched control response (cmd 0x{:02x}, instance {}) on link {}",
                header.command, header.instance, link
            );
            return;
        };
        let p = self.pending.swap_remove(i);

        match p.kind {
            RequestKind::SetEid => self.on_set_eid(p, msg, now_ms, sink),
            RequestKind::MessageTypes => match MessageTypeSupportResponse::decode(&msg.body) {
                Ok(r) => {
                    if let Some(ep) = self.endpoints.iter_mut().find(|e| e.eid == p.eid) {
                        ep.message_types = r.types.clone();
                    }
                    sink.emit(&BusEvent::MessageTypesDiscovered {
                        eid: p.eid,
                        types: r.types,
                    });
                }
                Err(e) => warn!("bus: EID {} message type query failed: {}", p.eid, e),
            },
            RequestKind::AllocatePool(block) => self.on_allocate_pool(&p, block, msg, sink),
        }
    }

    fn on_set_eid(
        &mut self,
        p: PendingRequest,
        msg: &Message,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) {
        let response = match SetEndpointIdResponse::decode(&msg.body) {
            Ok(r) if r.accepted => r,
            Ok(_) => return self.give_up(p.kind, p.link, p.eid, "assignment rejected", sink),
            Err(e) => return self.give_up(p.kind, p.link, p.eid, &e.to_string(), sink),
        };

        let mut eid = p.eid;
        if response.eid != eid {
            // Endpoint kept an EID of its own (e.g. a static one).
            warn!(
                "bus: link {} offered EID {} but endpoint reports {}",
                p.link, eid, response.eid
            );
            // Failing here releases only the offered EID.
            if !response.eid.is_assignable() {
                return self.give_up(p.kind, p.link, eid, "endpoint reports an unassignable EID", sink);
            }
            if self.eid_in_use(response.eid) {
                return self.give_up(p.kind, p.link, eid, "EID already in use", sink);
            }
            let _ = self.pool.release(eid);
            if self.pool.contains(response.eid) {
                let _ = self.pool.reserve(response.eid);
            }
            eid = response.eid;
        }

        if let Err(e) = self
            .endpoint
            .routes_mut()
            .insert(Route::neighbor(eid, p.link))
        {
            return self.give_up(p.kind, p.link, eid, &e.to_string(), sink);
        }

        info!("bus: link {} assigned EID {}", p.link, eid);
        *self.state_mut(p.link) = LinkState::Assigned(eid);
        self.endpoints.push(DiscoveredEndpoint {
            eid,
            network_id: self.config.network_id,
            link: p.link,
            message_types: Vec::new(),
            downstream: None,
        });
        sink.emit(&BusEvent::EndpointAssigned { link: p.link, eid });

        let instance = self.next_instance();
        let request = PendingRequest {
            kind: RequestKind::MessageTypes,
            link: p.link,
            dest: eid,
            eid,
            instance,
            command: CMD_GET_MESSAGE_TYPE_SUPPORT,
            tags: Vec::new(),
            body: get_message_type_support_request(instance),
            sent_ms: now_ms,
            retries_left: self.config.retries,
        };
        if let Err(e) = self.submit(request, now_ms) {
            warn!("bus: EID {} message type query not sent: {}", eid, e);
        }

        if response.pool_required && response.pool_size > 0 {
            self.request_pool(p.link, eid, response.pool_size, now_ms);
        }
    }

    /// Reserve a block for a bridge and offer it with Allocate Endpoint IDs.
    fn request_pool(&mut self, link: LinkId, bridge: Eid, wanted: u8, now_ms: u64) {
        let count = wanted.min(self.pool.max_pool_size());
        if count < wanted {
            warn!(
                "bus: bridge {} wants {} EIDs, granting max_pool_size {}",
                bridge, wanted, count
            );
        }
        let first = match self.pool.allocate_block(count) {
            Ok(first) => first,
            Err(e) => {
                warn!("bus: no downstream pool for bridge {}: {}", bridge, e);
                return;
            }
        };
        let block = DownstreamPool { first, count };
        let instance = self.next_instance();
        let request = PendingRequest {
            kind: RequestKind::AllocatePool(block),
            link,
            dest: bridge,
            eid: bridge,
            instance,
            command: CMD_ALLOCATE_ENDPOINT_IDS,
            tags: Vec::new(),
            body: allocate_endpoint_ids_request(instance, count, first),
            sent_ms: now_ms,
            retries_left: self.config.retries,
        };
        if let Err(e) = self.submit(request, now_ms) {
            warn!("bus: bridge {} pool offer not sent: {}", bridge, e);
            self.release_block(block);
        }
    }

    fn on_allocate_pool(
        &mut self,
        p: &PendingRequest,
        block: DownstreamPool,
        msg: &Message,
        sink: &mut impl EventSink,
    ) {
        match AllocateEndpointIdsResponse::decode(&msg.body) {
            Ok(r) if r.accepted => {}
            Ok(r) => {
                let reason = format!("rejected, bridge holds {} EIDs from {}", r.pool_size, r.first);
                return self.give_up(p.kind, p.link, p.eid, &reason, sink);
            }
            Err(e) => return self.give_up(p.kind, p.link, p.eid, &e.to_string(), sink),
        }

        if let Err(e) = self
            .endpoint
            .routes_mut()
            .insert(Route::bridged(block.first, block.count, p.link))
        {
            return self.give_up(p.kind, p.link, p.eid, &e.to_string(), sink);
        }
        let Some(ep) = self.endpoints.iter_mut().find(|e| e.eid == p.eid) else {
            // Link removed while the offer was outstanding.
            self.endpoint.routes_mut().remove_eid(block.first);
            self.release_block(block);
            return;
        };
        ep.downstream = Some(block);
        info!("bus: bridge {} holds EIDs {}..+{}", p.eid, block.first, block.count);
        sink.emit(&BusEvent::PoolAllocated {
            link: p.link,
            bridge: p.eid,
            first: block.first,
            count: block.count,
        });
    }

    /// Our own EID, one held in the pool, or one already routed.
    fn eid_in_use(&self, eid: Eid) -> bool {
        eid == self.endpoint.eid()
            || self.pool.is_allocated(eid)
            || self.endpoint.routes().lookup(eid).is_some()
    }

    fn release_block(&mut self, block: DownstreamPool) {
        for e in block.first.0..block.first.0.saturating_add(block.count) {
            let _ = self.pool.release(Eid(e));
        }
    }

    fn give_up(
        &mut self,
        kind: RequestKind,
        link: LinkId,
        eid: Eid,
        reason: &str,
        sink: &mut impl EventSink,
    ) {
        match kind {
            RequestKind::SetEid => {
                warn!("bus: link {} enumeration failed: {}", link, reason);
                let _ = self.pool.release(eid);
                *self.state_mut(link) = LinkState::Failed;
                sink.emit(&BusEvent::EnumerationFailed {
                    link,
                    eid,
                    reason: reason.to_string(),
                });
            }
            RequestKind::MessageTypes => {
                warn!("bus: EID {} did not report message types: {}", eid, reason);
            }
            RequestKind::AllocatePool(block) => {
                warn!("bus: bridge {} pool not allocated: {}", eid, reason);
                self.release_block(block);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
