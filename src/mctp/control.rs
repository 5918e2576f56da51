//! MCTP control messages (message type 0x00).
//!
//! ```text
//! ┌──────────────────────────────┬─────────┬────────────┬──────────────┐
//! │ Rq(7) D(6) rsvd InstanceID   │ command │ [cc]       │ data ...     │
//! └──────────────────────────────┴─────────┴────────────┴──────────────┘
//! ```
//!
//! Request encoders and response decoders serve the bus-owner side;
//! [`ControlResponder`] answers requests on the endpoint side.

use log::{debug, info};

use super::eid::Eid;
use crate::error::ControlError;

pub const CMD_SET_ENDPOINT_ID: u8 = 0x01;
pub const CMD_GET_ENDPOINT_ID: u8 = 0x02;
pub const CMD_GET_ENDPOINT_UUID: u8 = 0x03;
pub const CMD_GET_VERSION_SUPPORT: u8 = 0x04;
pub const CMD_GET_MESSAGE_TYPE_SUPPORT: u8 = 0x05;
pub const CMD_ALLOCATE_ENDPOINT_IDS: u8 = 0x08;

/// Message type selector for the base specification version.
pub const VERSION_BASE_SPEC: u8 = 0xFF;

/// Completion code for an unsupported type in Get MCTP Version Support.
pub const CC_UNSUPPORTED_TYPE: u8 = 0x80;

const RQ: u8 = 0x80;
const D: u8 = 0x40;
const INSTANCE_MASK: u8 = 0x1F;

// Versions as BCD with the 0xF nibble marking "present".
const MCTP_BASE_VERSIONS: &[[u8; 4]] = &[[0xF1, 0xF3, 0xF1, 0x00]];
const PLDM_VERSIONS: &[[u8; 4]] = &[[0xF1, 0xF0, 0xFF, 0x00]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub request: bool,
    pub datagram: bool,
    pub instance: u8,
    pub command: u8,
}

impl ControlHeader {
    pub const SIZE: usize = 2;

    pub fn request(instance: u8, command: u8) -> Self {
        Self {
            request: true,
            datagram: false,
            instance: instance & INSTANCE_MASK,
            command,
        }
    }

    pub fn parse(body: &[u8]) -> Result<Self, ControlError> {
        let &[b0, command, ..] = body else {
            return Err(ControlError::Truncated);
        };
        Ok(Self {
            request: b0 & RQ != 0,
            datagram: b0 & D != 0,
            instance: b0 & INSTANCE_MASK,
            command,
        })
    }

    pub fn encode(&self) -> [u8; 2] {
        let mut b0 = self.instance & INSTANCE_MASK;
        if self.request {
            b0 |= RQ;
        }
        if self.datagram {
            b0 |= D;
        }
        [b0, self.command]
    }

    /// Header of the response to this request.
    pub fn to_response(self) -> Self {
        Self {
            request: false,
            datagram: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    Success,
    Error,
    ErrorInvalidData,
    ErrorInvalidLength,
    ErrorNotReady,
    ErrorUnsupportedCmd,
    Other(u8),
}

impl CompletionCode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Self::Success,
            0x01 => Self::Error,
            0x02 => Self::ErrorInvalidData,
            0x03 => Self::ErrorInvalidLength,
            0x04 => Self::ErrorNotReady,
            0x05 => Self::ErrorUnsupportedCmd,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::Error => 0x01,
            Self::ErrorInvalidData => 0x02,
            Self::ErrorInvalidLength => 0x03,
            Self::ErrorNotReady => 0x04,
            Self::ErrorUnsupportedCmd => 0x05,
            Self::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetEidOperation {
    Set,
    Force,
    Reset,
    SetDiscovered,
}

impl SetEidOperation {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v & 0x03 {
            0 => Some(Self::Set),
            1 => Some(Self::Force),
            2 => Some(Self::Reset),
            3 => Some(Self::SetDiscovered),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Set => 0,
            Self::Force => 1,
            Self::Reset => 2,
            Self::SetDiscovered => 3,
        }
    }
}

/// Endpoint type reported by Get Endpoint ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    Simple,
    BusOwnerBridge,
}

// ── Request encoders ─────────────────────────────────────────

fn request(instance: u8, command: u8, data: &[u8]) -> Vec<u8> {
    let mut body = ControlHeader::request(instance, command).encode().to_vec();
    body.extend_from_slice(data);
    body
}

pub fn set_endpoint_id_request(instance: u8, op: SetEidOperation, eid: Eid) -> Vec<u8> {
    request(instance, CMD_SET_ENDPOINT_ID, &[op.code(), eid.0])
}

pub fn get_endpoint_id_request(instance: u8) -> Vec<u8> {
    request(instance, CMD_GET_ENDPOINT_ID, &[])
}

pub fn get_endpoint_uuid_request(instance: u8) -> Vec<u8> {
    request(instance, CMD_GET_ENDPOINT_UUID, &[])
}

pub fn get_version_support_request(instance: u8, msg_type: u8) -> Vec<u8> {
    request(instance, CMD_GET_VERSION_SUPPORT, &[msg_type])
}

pub fn get_message_type_support_request(instance: u8) -> Vec<u8> {
    request(instance, CMD_GET_MESSAGE_TYPE_SUPPORT, &[])
}

/// Hand a bridge `count` EIDs starting at `first` (operation 0, allocate).
pub fn allocate_endpoint_ids_request(instance: u8, count: u8, first: Eid) -> Vec<u8> {
    request(instance, CMD_ALLOCATE_ENDPOINT_IDS, &[0x00, count, first.0])
}

// ── Response decoders ────────────────────────────────────────

/// Check header and completion code, returning the data after the code.
fn response_data(body: &[u8], command: u8) -> Result<&[u8], ControlError> {
    let header = ControlHeader::parse(body)?;
    if header.request || header.command != command {
        return Err(ControlError::UnexpectedCommand(header.command));
    }
    let (&cc, data) = body[ControlHeader::SIZE..]
        .split_first()
        .ok_or(ControlError::Truncated)?;
    if cc != CompletionCode::Success.code() {
        return Err(ControlError::Completion(cc));
    }
    Ok(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetEndpointIdResponse {
    pub accepted: bool,
    /// Endpoint requires a downstream EID pool.
    pub pool_required: bool,
    pub eid: Eid,
    pub pool_size: u8,
}

impl SetEndpointIdResponse {
    pub fn decode(body: &[u8]) -> Result<Self, ControlError> {
        let &[status, eid, pool_size, ..] = response_data(body, CMD_SET_ENDPOINT_ID)? else {
            return Err(ControlError::Truncated);
        };
        Ok(Self {
            accepted: (status >> 4) & 0x03 == 0,
            pool_required: status & 0x03 == 1,
            eid: Eid(eid),
            pool_size,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetEndpointIdResponse {
    pub eid: Eid,
    pub endpoint_type: EndpointType,
    pub static_eid: bool,
    pub medium_info: u8,
}

impl GetEndpointIdResponse {
    pub fn decode(body: &[u8]) -> Result<Self, ControlError> {
        let &[eid, kind, medium_info, ..] = response_data(body, CMD_GET_ENDPOINT_ID)? else {
            return Err(ControlError::Truncated);
        };
        Ok(Self {
            eid: Eid(eid),
            endpoint_type: if (kind >> 4) & 0x03 == 1 {
                EndpointType::BusOwnerBridge
            } else {
                EndpointType::Simple
            },
            static_eid: kind & 0x03 != 0,
            medium_info,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidResponse {
    pub uuid: [u8; 16],
}

impl UuidResponse {
    pub fn decode(body: &[u8]) -> Result<Self, ControlError> {
        let data = response_data(body, CMD_GET_ENDPOINT_UUID)?;
        let uuid = data
            .get(..16)
            .and_then(|s| <[u8; 16]>::try_from(s).ok())
            .ok_or(ControlError::Truncated)?;
        Ok(Self { uuid })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSupportResponse {
    pub versions: Vec<[u8; 4]>,
}

impl VersionSupportResponse {
    pub fn decode(body: &[u8]) -> Result<Self, ControlError> {
        let (&count, rest) = response_data(body, CMD_GET_VERSION_SUPPORT)?
            .split_first()
            .ok_or(ControlError::Truncated)?;
        let needed = usize::from(count) * 4;
        if rest.len() < needed {
            return Err(ControlError::Truncated);
        }
        let versions = rest[..needed]
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Ok(Self { versions })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTypeSupportResponse {
    pub types: Vec<u8>,
}

impl MessageTypeSupportResponse {
    pub fn decode(body: &[u8]) -> Result<Self, ControlError> {
        let (&count, rest) = response_data(body, CMD_GET_MESSAGE_TYPE_SUPPORT)?
            .split_first()
            .ok_or(ControlError::Truncated)?;
        let types = rest
            .get(..usize::from(count))
            .ok_or(ControlError::Truncated)?
            .to_vec();
        Ok(Self { types })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocateEndpointIdsResponse {
    pub accepted: bool,
    /// Pool size the bridge now holds.
    pub pool_size: u8,
    pub first: Eid,
}

impl AllocateEndpointIdsResponse {
    pub fn decode(body: &[u8]) -> Result<Self, ControlError> {
        let &[status, pool_size, first, ..] = response_data(body, CMD_ALLOCATE_ENDPOINT_IDS)? else {
            return Err(ControlError::Truncated);
        };
        Ok(Self {
            accepted: status & 0x03 == 0,
            pool_size,
            first: Eid(first),
        })
    }
}

// ── Responder ────────────────────────────────────────────────

/// Endpoint-side handler for control requests.
#[derive(Debug, Clone)]
pub struct ControlResponder {
    eid: Eid,
    endpoint_type: EndpointType,
    uuid: [u8; 16],
    message_types: Vec<u8>,
    bus_owner: Option<Eid>,
}

impl ControlResponder {
    pub fn new(eid: Eid, endpoint_type: EndpointType, uuid: [u8; 16], message_types: &[u8]) -> Self {
        Self {
            eid,
            endpoint_type,
            uuid,
            message_types: message_types.to_vec(),
            bus_owner: None,
        }
    }

    pub fn eid(&self) -> Eid {
        self.eid
    }

    pub fn set_eid(&mut self, eid: Eid) {
        self.eid = eid;
    }

    /// EID of the bus owner that last assigned ours.
    pub fn bus_owner(&self) -> Option<Eid> {
        self.bus_owner
    }

    /// Build the response body for a control request.
    pub fn handle(&mut self, source: Eid, body: &[u8]) -> Option<Vec<u8>> {
        let header = ControlHeader::parse(body).ok()?;
        if !header.request || header.datagram {
            return None;
        }
        let data = &body[ControlHeader::SIZE..];

        let mut out = header.to_response().encode().to_vec();
        let cc = match header.command {
            CMD_SET_ENDPOINT_ID => self.set_endpoint_id(source, data, &mut out),
            CMD_GET_ENDPOINT_ID => {
                let kind = match self.endpoint_type {
                    EndpointType::Simple => 0x00,
                    EndpointType::BusOwnerBridge => 0x10,
                };
                out.extend_from_slice(&[0, self.eid.0, kind, 0]);
                CompletionCode::Success
            }
            CMD_GET_ENDPOINT_UUID => {
                out.push(0);
                out.extend_from_slice(&self.uuid);
                CompletionCode::Success
            }
            CMD_GET_VERSION_SUPPORT => self.version_support(data, &mut out),
            CMD_GET_MESSAGE_TYPE_SUPPORT => {
                out.push(0);
                out.push(self.message_types.len() as u8);
                out.extend_from_slice(&self.message_types);
                CompletionCode::Success
            }
            other => {
                debug!("control: unsupported command 0x{:02x} from EID {}", other, source);
                CompletionCode::ErrorUnsupportedCmd
            }
        };

        if cc != CompletionCode::Success {
            out.truncate(ControlHeader::SIZE);
            out.push(cc.code());
        }
        Some(out)
    }

    fn set_endpoint_id(&mut self, source: Eid, data: &[u8], out: &mut Vec<u8>) -> CompletionCode {
        let &[op, eid, ..] = data else {
            return CompletionCode::ErrorInvalidLength;
        };
        let Some(op) = SetEidOperation::from_u8(op) else {
            return CompletionCode::ErrorInvalidData;
        };
        match op {
            SetEidOperation::Set | SetEidOperation::Force => {
                let eid = Eid(eid);
                if !eid.is_assignable() {
                    return CompletionCode::ErrorInvalidData;
                }
                info!("control: EID {} assigned by bus owner {}", eid, source);
                self.eid = eid;
                self.bus_owner = Some(source);
            }
            SetEidOperation::Reset => return CompletionCode::ErrorInvalidData,
            SetEidOperation::SetDiscovered => {}
        }
        // Accepted, no downstream pool.
        out.extend_from_slice(&[0, 0x00, self.eid.0, 0]);
        CompletionCode::Success
    }

    fn version_support(&self, data: &[u8], out: &mut Vec<u8>) -> CompletionCode {
        let Some(&msg_type) = data.first() else {
            return CompletionCode::ErrorInvalidLength;
        };
        let versions = match msg_type {
            VERSION_BASE_SPEC | 0x00 => MCTP_BASE_VERSIONS,
            0x01 if self.message_types.contains(&0x01) => PLDM_VERSIONS,
            _ => return CompletionCode::Other(CC_UNSUPPORTED_TYPE),
        };
        out.push(0);
        out.push(versions.len() as u8);
        for v in versions {
            out.extend_from_slice(v);
        }
        CompletionCode::Success
    }
}

// ── Tests ────────────────────────────────────────────────────
