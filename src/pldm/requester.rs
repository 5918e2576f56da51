//! PLDM requester: instance ID allocation, response matching, retries.
//!
//! A request holds its instance ID until the matching response arrives
//! or retries run out. Retries reuse the same instance ID so the
//! terminus can recognise a duplicate.

use log::{debug, warn};

use super::header::{CompletionCode, HEADER_SIZE, InstanceId, MessageKind, PldmHeader, encode_request};
use crate::error::PldmError;
use crate::mctp::eid::Eid;

/// Instance IDs in use, per terminus.
#[derive(Debug, Default)]
pub struct InstanceIdPool {
    entries: Vec<IdEntry>,
}

#[derive(Debug)]
struct IdEntry {
    eid: Eid,
    used: u32,
    next: u8,
}

impl InstanceIdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next free ID for `eid`, rotating through 0..=31.
    pub fn allocate(&mut self, eid: Eid) -> Result<InstanceId, PldmError> {
        let i = match self.entries.iter().position(|e| e.eid == eid) {
            Some(i) => i,
            None => {
                self.entries.push(IdEntry {
                    eid,
                    used: 0,
                    next: 0,
                });
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[i];
        let id = (0..=InstanceId::MAX)
            .map(|k| (entry.next + k) % (InstanceId::MAX + 1))
            .find(|&id| entry.used & (1 << id) == 0)
            .ok_or(PldmError::InstanceIdsExhausted)?;
        entry.used |= 1 << id;
        entry.next = (id + 1) % (InstanceId::MAX + 1);
        InstanceId::new(id).ok_or(PldmError::InvalidField)
    }

    pub fn release(&mut self, eid: Eid, id: InstanceId) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.eid == eid) {
            e.used &= !(1 << id.value());
        }
    }

    pub fn in_use(&self, eid: Eid) -> u32 {
        self.entries
            .iter()
            .find(|e| e.eid == eid)
            .map_or(0, |e| e.used.count_ones())
    }
}

/// A decoded response to one of our requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PldmResponse {
    pub instance: InstanceId,
    pub pldm_type: u8,
    pub command: u8,
    pub completion: CompletionCode,
    /// Data after the completion code.
    pub payload: Vec<u8>,
}

impl PldmResponse {
    /// Payload of a successful response, or the failing code as an error.
    pub fn data(&self) -> Result<&[u8], PldmError> {
        if self.completion.is_success() {
            Ok(&self.payload)
        } else {
            Err(PldmError::Completion(self.completion.code()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequesterAction {
    /// Resend `body` to `eid`.
    Retry { eid: Eid, body: Vec<u8> },
    /// Retries used up; the instance ID has been freed.
    Expired {
        eid: Eid,
        instance: InstanceId,
        pldm_type: u8,
        command: u8,
    },
}

#[derive(Debug)]
struct Pending {
    eid: Eid,
    instance: InstanceId,
    pldm_type: u8,
    command: u8,
    body: Vec<u8>,
    sent_ms: u64,
    retries_left: u8,
}

pub struct PldmRequester {
    ids: InstanceIdPool,
    pending: Vec<Pending>,
    timeout_ms: u64,
    retries: u8,
}

impl PldmRequester {
    pub fn new(timeout_ms: u64, retries: u8) -> Self {
        Self {
            ids: InstanceIdPool::new(),
            pending: Vec::new(),
            timeout_ms,
            retries,
        }
    }

    /// Record a new request and return its instance ID and encoded body.
    pub fn prepare(
        &mut self,
        eid: Eid,
        pldm_type: u8,
        command: u8,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<(InstanceId, Vec<u8>), PldmError> {
        let instance = self.ids.allocate(eid)?;
        let body = encode_request(&PldmHeader::request(instance, pldm_type, command), payload);
        self.pending.push(Pending {
            eid,
            instance,
            pldm_type,
            command,
            body: body.clone(),
            sent_ms: now_ms,
            retries_left: self.retries,
        });
        Ok((instance, body))
    }

    /// Match a response body from `eid` to its request.
    pub fn complete(&mut self, eid: Eid, body: &[u8]) -> Result<PldmResponse, PldmError> {
        let header = PldmHeader::parse(body)?;
        if header.kind != MessageKind::Response {
            return Err(PldmError::UnexpectedKind);
        }
        let (&cc, payload) = body[HEADER_SIZE..]
            .split_first()
            .ok_or(PldmError::Truncated)?;

        let i = self
            .pending
            .iter()
            .position(|p| {
                p.eid == eid
                    && p.instance == header.instance
                    && p.pldm_type == header.pldm_type
                    && p.command == header.command
            })
            .ok_or(PldmError::NoPendingRequest)?;
        let p = self.pending.swap_remove(i);
        self.ids.release(eid, p.instance);

        Ok(PldmResponse {
            instance: header.instance,
            pldm_type: header.pldm_type,
            command: header.command,
            completion: CompletionCode::from_u8(cc),
            payload: payload.to_vec(),
        })
    }

    /// Drop a request that could not be sent.
    pub fn cancel(&mut self, eid: Eid, instance: InstanceId) {
        if let Some(i) = self
            .pending
            .iter()
            .position(|p| p.eid == eid && p.instance == instance)
        {
            self.pending.swap_remove(i);
            self.ids.release(eid, instance);
        }
    }

    /// Check for timed-out requests.
    pub fn poll(&mut self, now_ms: u64) -> Vec<RequesterAction> {
        let mut actions = Vec::new();
        let timeout = self.timeout_ms;
        let ids = &mut self.ids;

        self.pending.retain_mut(|p| {
            if now_ms.saturating_sub(p.sent_ms) < timeout {
                return true;
            }
            if p.retries_left > 0 {
                p.retries_left -= 1;
                p.sent_ms = now_ms;
                debug!(
                    "PLDM: retrying cmd 0x{:02x} to EID {} (instance {})",
                    p.command, p.eid, p.instance
                );
                actions.push(RequesterAction::Retry {
                    eid: p.eid,
                    body: p.body.clone(),
                });
                return true;
            }
            warn!(
                "PLDM: type 0x{:02x} cmd 0x{:02x} to EID {} timed out",
                p.pldm_type, p.command, p.eid
            );
            ids.release(p.eid, p.instance);
            actions.push(RequesterAction::Expired {
                eid: p.eid,
                instance: p.instance,
                pldm_type: p.pldm_type,
                command: p.command,
            });
            false
        });
        actions
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
