//! PLDM over an MCTP endpoint.
//!
//! ```text
//!   Endpoint::recv ──► PldmService::handle_message
//!                        ├── request  ──► PldmResponder ──► Endpoint::respond
//!                        └── response ──► PldmRequester ──► PldmEvent::Response
//!   PldmService::poll ──► retries via Endpoint::send, PldmEvent::Timeout
//! ```

use log::{debug, warn};

use super::header::{InstanceId, MessageKind, PldmHeader};
use super::requester::{PldmRequester, PldmResponse, RequesterAction};
use super::responder::PldmResponder;
use crate::error::Result;
use crate::mctp::{Eid, Endpoint, LinkId, Message, MessageType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PldmEvent {
    Response(Eid, PldmResponse),
    Timeout {
        eid: Eid,
        instance: InstanceId,
        pldm_type: u8,
        command: u8,
    },
}

pub struct PldmService {
    responder: PldmResponder,
    requester: PldmRequester,
}

impl PldmService {
    pub fn new(responder: PldmResponder, requester: PldmRequester) -> Self {
        Self {
            responder,
            requester,
        }
    }

    /// Handle a PLDM message that arrived on `link`.
    ///
    /// Requests are answered in place. Returns an event only for a
    /// response matching one of our requests.
    pub fn handle_message(
        &mut self,
        endpoint: &mut Endpoint,
        link: LinkId,
        msg: &Message,
    ) -> Option<PldmEvent> {
        if msg.msg_type != MessageType::Pldm {
            return None;
        }
        let header = match PldmHeader::parse(&msg.body) {
            Ok(h) => h,
            Err(e) => {
                debug!("PLDM: dropping message from EID {}: {}", msg.source, e);
                return None;
            }
        };

        match header.kind {
            MessageKind::Request | MessageKind::Datagram => {
                let reply = self.responder.handle_request(&msg.body)?;
                if let Err(e) = endpoint.respond(link, msg, &reply) {
                    warn!("PLDM: failed to answer EID {}: {}", msg.source, e);
                }
                None
            }
            MessageKind::Response => match self.requester.complete(msg.source, &msg.body) {
                Ok(resp) => Some(PldmEvent::Response(msg.source, resp)),
                Err(e) => {
                    warn!(
                        "PLDM: unmatched response from EID {} (instance {}): {}",
                        msg.source, header.instance, e
                    );
                    None
                }
            },
        }
    }

    /// Send a request to `eid`; the response arrives via [`Self::handle_message`].
    pub fn request(
        &mut self,
        endpoint: &mut Endpoint,
        eid: Eid,
        pldm_type: u8,
        command: u8,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<InstanceId> {
        let (instance, body) = self
            .requester
            .prepare(eid, pldm_type, command, payload, now_ms)?;
        if let Err(e) = endpoint.send(eid, MessageType::Pldm, &body, now_ms) {
            self.requester.cancel(eid, instance);
            return Err(e);
        }
        debug!(
            "PLDM: type 0x{:02x} cmd 0x{:02x} -> EID {} (instance {})",
            pldm_type, command, eid, instance
        );
        Ok(instance)
    }

    /// Resend timed-out requests and report the ones that gave up.
    pub fn poll(&mut self, endpoint: &mut Endpoint, now_ms: u64) -> Vec<PldmEvent> {
        let mut events = Vec::new();
        for action in self.requester.poll(now_ms) {
            match action {
                RequesterAction::Retry { eid, body } => {
                    if let Err(e) = endpoint.send(eid, MessageType::Pldm, &body, now_ms) {
                        warn!("PLDM: retry to EID {} failed: {}", eid, e);
                    }
                }
                RequesterAction::Expired {
                    eid,
                    instance,
                    pldm_type,
                    command,
                } => events.push(PldmEvent::Timeout {
                    eid,
                    instance,
                    pldm_type,
                    command,
                }),
            }
        }
        events
    }

    pub fn responder(&self) -> &PldmResponder {
        &self.responder
    }

    pub fn responder_mut(&mut self) -> &mut PldmResponder {
        &mut self.responder
    }

    pub fn pending(&self) -> usize {
        self.requester.pending()
    }
}
