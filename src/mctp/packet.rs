//! MCTP transport header, message types and packet buffers.
//!
//! Wire format:
//! ```text
//! ┌──────────────┬──────────┬──────────┬─────────────────────────────────┐
//! │ rsvd │ ver   │ dest EID │ src EID  │ SOM EOM Seq(2) TO Tag(3)        │
//! │ 4b   │ 4b=1  │ 1B       │ 1B       │ 1B                              │
//! └──────────────┴──────────┴──────────┴─────────────────────────────────┘
//! ```
//!
//! The first packet of a message begins its payload with the message
//! type byte: `IC(7) | type(6:0)`.

use heapless::Vec as HVec;

use super::eid::Eid;
use crate::error::PacketError;

/// Transport header version understood by this stack.
pub const HEADER_VERSION: u8 = 0x01;

/// Transport header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Baseline transmission unit (payload bytes per packet).
pub const BASELINE_MTU: usize = 64;

/// Largest packet buffer (header + payload) of any binding.
pub const MAX_PACKET_SIZE: usize = 255;

const SOM: u8 = 0x80;
const EOM: u8 = 0x40;
const TO: u8 = 0x08;
const IC: u8 = 0x80;

/// Parsed transport header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub dest: Eid,
    pub source: Eid,
    pub som: bool,
    pub eom: bool,
    /// Packet sequence number (0..=3).
    pub seq: u8,
    pub tag_owner: bool,
    /// Message tag (0..=7).
    pub tag: u8,
}

impl PacketHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::TooShort);
        }
        let version = bytes[0] & 0x0F;
        if version != HEADER_VERSION {
            return Err(PacketError::BadHeaderVersion(version));
        }
        let flags = bytes[3];
        Ok(Self {
            dest: Eid(bytes[1]),
            source: Eid(bytes[2]),
            som: flags & SOM != 0,
            eom: flags & EOM != 0,
            seq: (flags >> 4) & 0x03,
            tag_owner: flags & TO != 0,
            tag: flags & 0x07,
        })
    }

    pub fn encode(&self) -> Result<[u8; HEADER_SIZE], PacketError> {
        if self.seq > 3 {
            return Err(PacketError::InvalidSequence);
        }
        if self.tag > 7 {
            return Err(PacketError::InvalidTag);
        }
        let mut flags = (self.seq << 4) | self.tag;
        if self.som {
            flags |= SOM;
        }
        if self.eom {
            flags |= EOM;
        }
        if self.tag_owner {
            flags |= TO;
        }
        Ok([HEADER_VERSION, self.dest.0, self.source.0, flags])
    }
}

/// MCTP message type (DSP0239).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Control,
    Pldm,
    NcSi,
    Ethernet,
    Nvme,
    Spdm,
    SecuredMessage,
    VendorPci,
    VendorIana,
    Other(u8),
}

impl MessageType {
    /// Split a type byte into message type and integrity-check flag.
    pub fn from_byte(b: u8) -> (Self, bool) {
        (Self::from_code(b & 0x7F), b & IC != 0)
    }

    /// Message type from its 7-bit code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Control,
            0x01 => Self::Pldm,
            0x02 => Self::NcSi,
            0x03 => Self::Ethernet,
            0x04 => Self::Nvme,
            0x05 => Self::Spdm,
            0x06 => Self::SecuredMessage,
            0x7E => Self::VendorPci,
            0x7F => Self::VendorIana,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Control => 0x00,
            Self::Pldm => 0x01,
            Self::NcSi => 0x02,
            Self::Ethernet => 0x03,
            Self::Nvme => 0x04,
            Self::Spdm => 0x05,
            Self::SecuredMessage => 0x06,
            Self::VendorPci => 0x7E,
            Self::VendorIana => 0x7F,
            Self::Other(c) => c & 0x7F,
        }
    }

    pub fn to_byte(self, ic: bool) -> u8 {
        if ic { self.code() | IC } else { self.code() }
    }
}

/// A single transport packet (header + payload) in a fixed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: HVec<u8, MAX_PACKET_SIZE>,
}

impl Packet {
    pub fn new(header: &PacketHeader, payload: &[u8]) -> Result<Self, PacketError> {
        if HEADER_SIZE + payload.len() > MAX_PACKET_SIZE {
            return Err(PacketError::PayloadTooLarge);
        }
        let mut data = HVec::new();
        data.extend_from_slice(&header.encode()?)
            .map_err(|_| PacketError::PayloadTooLarge)?;
        data.extend_from_slice(payload)
            .map_err(|_| PacketError::PayloadTooLarge)?;
        Ok(Self { data })
    }

    /// Wrap raw bytes, validating the header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        PacketHeader::parse(bytes)?;
        let mut data = HVec::new();
        data.extend_from_slice(bytes)
            .map_err(|_| PacketError::PayloadTooLarge)?;
        Ok(Self { data })
    }

    pub fn header(&self) -> PacketHeader {
        // Construction guarantees a valid header.
        PacketHeader::parse(&self.data).unwrap_or(PacketHeader {
            dest: Eid::NULL,
            source: Eid::NULL,
            som: false,
            eom: false,
            seq: 0,
            tag_owner: false,
            tag: 0,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A complete, reassembled MCTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub dest: Eid,
    pub source: Eid,
    pub tag_owner: bool,
    pub tag: u8,
    pub msg_type: MessageType,
    /// Integrity check flag from the type byte.
    pub ic: bool,
    /// Message body, excluding the type byte.
    pub body: Vec<u8>,
}

impl Message {
    /// A request (tag owner) message with no tag yet assigned.
    pub fn request(dest: Eid, source: Eid, msg_type: MessageType, body: &[u8]) -> Self {
        Self {
            dest,
            source,
            tag_owner: true,
            tag: 0,
            msg_type,
            ic: false,
            body: body.to_vec(),
        }
    }
}
