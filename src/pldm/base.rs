//! PLDM base commands (type 0, DSP0240): wire types and codecs.
//!
//! The responder side lives in [`responder`](super::responder); this
//! module holds the payload formats shared by both directions.

use crate::crc::crc32;
use crate::error::PldmError;

/// PLDM type codes.
pub mod types {
    pub const BASE: u8 = 0x00;
    pub const SMBIOS: u8 = 0x01;
    pub const PLATFORM: u8 = 0x02;
    pub const BIOS: u8 = 0x03;
    pub const FRU: u8 = 0x04;
    pub const FIRMWARE_UPDATE: u8 = 0x05;
    pub const RDE: u8 = 0x06;
    pub const OEM: u8 = 0x3F;
}

pub const CMD_SET_TID: u8 = 0x01;
pub const CMD_GET_TID: u8 = 0x02;
pub const CMD_GET_PLDM_VERSION: u8 = 0x03;
pub const CMD_GET_PLDM_TYPES: u8 = 0x04;
pub const CMD_GET_PLDM_COMMANDS: u8 = 0x05;

pub const CC_INVALID_DATA_TRANSFER_HANDLE: u8 = 0x80;
pub const CC_INVALID_TRANSFER_OPERATION_FLAG: u8 = 0x81;
pub const CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA: u8 = 0x83;
pub const CC_INVALID_PLDM_VERSION_IN_REQUEST_DATA: u8 = 0x84;

pub const TRANSFER_OP_GET_NEXT_PART: u8 = 0x00;
pub const TRANSFER_OP_GET_FIRST_PART: u8 = 0x01;
pub const TRANSFER_FLAG_START_AND_END: u8 = 0x05;

/// TIDs a terminus may not be given.
pub const TID_UNASSIGNED: u8 = 0x00;
pub const TID_RESERVED: u8 = 0xFF;

/// Version in DSP0240 `ver32` form (BCD nibbles, 0xF-prefixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ver32 {
    pub major: u8,
    pub minor: u8,
    pub update: u8,
    pub alpha: u8,
}

impl Ver32 {
    pub const fn new(major: u8, minor: u8, update: u8, alpha: u8) -> Self {
        Self {
            major,
            minor,
            update,
            alpha,
        }
    }

    /// Little-endian: alpha first on the wire.
    pub fn to_bytes(self) -> [u8; 4] {
        [self.alpha, self.update, self.minor, self.major]
    }

    pub fn from_bytes(b: [u8; 4]) -> Self {
        Self {
            alpha: b[0],
            update: b[1],
            minor: b[2],
            major: b[3],
        }
    }
}

/// Base specification version implemented here (1.0.0).
pub const BASE_VERSION: Ver32 = Ver32::new(0xF1, 0xF0, 0xF0, 0x00);

/// Set of PLDM types, as the 8-byte bitfield of GetPLDMTypes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeSet(u64);

impl TypeSet {
    pub fn insert(&mut self, pldm_type: u8) {
        if pldm_type < 64 {
            self.0 |= 1 << pldm_type;
        }
    }

    pub fn contains(&self, pldm_type: u8) -> bool {
        pldm_type < 64 && self.0 & (1 << pldm_type) != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..64u8).filter(|&t| self.contains(t))
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(b: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(b))
    }
}

/// Set of command codes, as the 32-byte bitfield of GetPLDMCommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSet([u8; 32]);

impl Default for CommandSet {
    fn default() -> Self {
        Self([0; 32])
    }
}

impl CommandSet {
    pub fn from_commands(commands: &[u8]) -> Self {
        let mut set = Self::default();
        for &c in commands {
            set.insert(c);
        }
        set
    }

    pub fn insert(&mut self, command: u8) {
        self.0[usize::from(command / 8)] |= 1 << (command % 8);
    }

    pub fn contains(&self, command: u8) -> bool {
        self.0[usize::from(command / 8)] & (1 << (command % 8)) != 0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
}

// ── Request payloads ─────────────────────────────────────────

pub fn set_tid_request(tid: u8) -> Vec<u8> {
    vec![tid]
}

/// GetPLDMVersion for the first (and only) part.
pub fn get_version_request(pldm_type: u8) -> Vec<u8> {
    let mut p = 0u32.to_le_bytes().to_vec();
    p.push(TRANSFER_OP_GET_FIRST_PART);
    p.push(pldm_type);
    p
}

pub fn get_commands_request(pldm_type: u8, version: Ver32) -> Vec<u8> {
    let mut p = vec![pldm_type];
    p.extend_from_slice(&version.to_bytes());
    p
}

/// Parsed GetPLDMVersion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetVersionRequest {
    pub transfer_handle: u32,
    pub operation: u8,
    pub pldm_type: u8,
}

impl GetVersionRequest {
    pub fn decode(p: &[u8]) -> Result<Self, PldmError> {
        let &[h0, h1, h2, h3, operation, pldm_type, ..] = p else {
            return Err(PldmError::Truncated);
        };
        Ok(Self {
            transfer_handle: u32::from_le_bytes([h0, h1, h2, h3]),
            operation,
            pldm_type,
        })
    }
}

/// Parsed GetPLDMCommands request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetCommandsRequest {
    pub pldm_type: u8,
    pub version: Ver32,
}

impl GetCommandsRequest {
    pub fn decode(p: &[u8]) -> Result<Self, PldmError> {
        let &[pldm_type, v0, v1, v2, v3, ..] = p else {
            return Err(PldmError::Truncated);
        };
        Ok(Self {
            pldm_type,
            version: Ver32::from_bytes([v0, v1, v2, v3]),
        })
    }
}

// ── Response payloads (after the completion code) ────────────

/// GetPLDMVersion response data for a single-part transfer.
pub fn encode_version_response(versions: &[Ver32], out: &mut Vec<u8>) {
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(TRANSFER_FLAG_START_AND_END);
    let start = out.len();
    for v in versions {
        out.extend_from_slice(&v.to_bytes());
    }
    let crc = crc32(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
}

pub fn decode_tid_response(p: &[u8]) -> Result<u8, PldmError> {
    p.first().copied().ok_or(PldmError::Truncated)
}

/// Versions from a GetPLDMVersion response, checking the CRC.
pub fn decode_version_response(p: &[u8]) -> Result<Vec<Ver32>, PldmError> {
    // handle(4) + flag(1) + at least one version(4) + crc(4)
    if p.len() < 13 || (p.len() - 9) % 4 != 0 {
        return Err(PldmError::Truncated);
    }
    if p[4] != TRANSFER_FLAG_START_AND_END {
        return Err(PldmError::InvalidField);
    }
    let (data, crc) = p[5..].split_at(p.len() - 9);
    let crc = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    if crc32(data) != crc {
        return Err(PldmError::InvalidField);
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| Ver32::from_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn decode_types_response(p: &[u8]) -> Result<TypeSet, PldmError> {
    p.get(..8)
        .and_then(|s| <[u8; 8]>::try_from(s).ok())
        .map(TypeSet::from_bytes)
        .ok_or(PldmError::Truncated)
}

pub fn decode_commands_response(p: &[u8]) -> Result<CommandSet, PldmError> {
    p.get(..32)
        .and_then(|s| <[u8; 32]>::try_from(s).ok())
        .map(CommandSet::from_bytes)
        .ok_or(PldmError::Truncated)
}
