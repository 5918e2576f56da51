//! PLDM message header (DSP0240).
//!
//! ```text
//! byte0: Rq(7) D(6) rsvd(5) InstanceID(4:0)
//! byte1: HdrVer(7:6)=0 | PLDM type(5:0)
//! byte2: command code
//! byte3: completion code (responses only)
//! ```

use core::fmt;

use crate::error::PldmError;

/// Header length, excluding the completion code.
pub const HEADER_SIZE: usize = 3;

const RQ: u8 = 0x80;
const D: u8 = 0x40;
const INSTANCE_MASK: u8 = 0x1F;
const TYPE_MASK: u8 = 0x3F;

/// Request instance ID (0..=31).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u8);

impl InstanceId {
    pub const MAX: u8 = 31;

    pub fn new(v: u8) -> Option<Self> {
        (v <= Self::MAX).then_some(Self(v))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    /// Unacknowledged request (Rq=1, D=1).
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PldmHeader {
    pub kind: MessageKind,
    pub instance: InstanceId,
    pub pldm_type: u8,
    pub command: u8,
}

impl PldmHeader {
    pub fn request(instance: InstanceId, pldm_type: u8, command: u8) -> Self {
        Self {
            kind: MessageKind::Request,
            instance,
            pldm_type: pldm_type & TYPE_MASK,
            command,
        }
    }

    pub fn parse(body: &[u8]) -> Result<Self, PldmError> {
        let &[b0, b1, command, ..] = body else {
            return Err(PldmError::Truncated);
        };
        let version = b1 >> 6;
        if version != 0 {
            return Err(PldmError::BadHeaderVersion(version));
        }
        let kind = match (b0 & RQ != 0, b0 & D != 0) {
            (true, false) => MessageKind::Request,
            (true, true) => MessageKind::Datagram,
            (false, false) => MessageKind::Response,
            (false, true) => return Err(PldmError::UnexpectedKind),
        };
        Ok(Self {
            kind,
            instance: InstanceId(b0 & INSTANCE_MASK),
            pldm_type: b1 & TYPE_MASK,
            command,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let flags = match self.kind {
            MessageKind::Request => RQ,
            MessageKind::Datagram => RQ | D,
            MessageKind::Response => 0,
        };
        [
            flags | self.instance.0,
            self.pldm_type & TYPE_MASK,
            self.command,
        ]
    }

    /// Header of the response to this request.
    pub fn to_response(self) -> Self {
        Self {
            kind: MessageKind::Response,
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
    ErrorUnsupportedPldmCmd,
    ErrorInvalidPldmType,
    /// Command-specific code (0x80..).
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
            0x05 => Self::ErrorUnsupportedPldmCmd,
            0x20 => Self::ErrorInvalidPldmType,
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
            Self::ErrorUnsupportedPldmCmd => 0x05,
            Self::ErrorInvalidPldmType => 0x20,
            Self::Other(v) => v,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Build a request body: header followed by `payload`.
pub fn encode_request(header: &PldmHeader, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(HEADER_SIZE + payload.len());
    body.extend_from_slice(&header.encode());
    body.extend_from_slice(payload);
    body
}
