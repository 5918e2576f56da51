//! Unified error types for the MCTP/PLDM stack.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  The per-subsystem enums are
//! `Copy` so they can be passed through the packet path without
//! allocation.

use core::fmt;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An MCTP packet header or payload was malformed.
    Packet(PacketError),
    /// A serial binding frame could not be encoded or decoded.
    Frame(FrameError),
    /// Fragmentation or reassembly failed.
    Assembly(AssemblyError),
    /// An MCTP control message was malformed or refused.
    Control(ControlError),
    /// The routing table rejected an operation.
    Route(RouteError),
    /// The EID pool rejected an operation.
    Eid(EidError),
    /// A PLDM message was malformed or could not be matched.
    Pldm(PldmError),
    /// A host link or service operation failed.
    Link(LinkError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packet(e) => write!(f, "packet: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Assembly(e) => write!(f, "assembly: {e}"),
            Self::Control(e) => write!(f, "control: {e}"),
            Self::Route(e) => write!(f, "route: {e}"),
            Self::Eid(e) => write!(f, "eid: {e}"),
            Self::Pldm(e) => write!(f, "pldm: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Packet errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than a transport header.
    TooShort,
    /// Header version nibble is not 0x1.
    BadHeaderVersion(u8),
    /// Header plus payload exceeds the packet buffer.
    PayloadTooLarge,
    /// Packet sequence number outside 0..=3.
    InvalidSequence,
    /// Message tag outside 0..=7.
    InvalidTag,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "packet shorter than header"),
            Self::BadHeaderVersion(v) => write!(f, "unsupported header version {v:#x}"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::InvalidSequence => write!(f, "invalid packet sequence"),
            Self::InvalidTag => write!(f, "invalid message tag"),
        }
    }
}

impl From<PacketError> for Error {
    fn from(e: PacketError) -> Self {
        Self::Packet(e)
    }
}

// ---------------------------------------------------------------------------
// Serial framing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Revision byte is not the serial binding revision.
    BadRevision(u8),
    /// Byte count outside the allowed packet length.
    BadLength(u8),
    /// Frame check sequence did not match.
    FcsMismatch { expected: u16, found: u16 },
    /// Raw flag byte inside the body or FCS.
    UnexpectedFlag,
    /// Trailing flag byte absent.
    MissingEndFlag,
    /// Packet shorter than an MCTP header.
    PacketTooShort,
    /// Packet longer than the serial binding allows.
    PacketTooLarge,
    /// Frame checked out but the packet header did not parse.
    InvalidHeader,
    /// Output buffer cannot hold the worst-case frame.
    BufferTooSmall,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRevision(r) => write!(f, "bad serial revision {r:#04x}"),
            Self::BadLength(n) => write!(f, "bad byte count {n}"),
            Self::FcsMismatch { expected, found } => {
                write!(f, "FCS mismatch (expected {expected:#06x}, found {found:#06x})")
            }
            Self::UnexpectedFlag => write!(f, "unexpected flag inside frame"),
            Self::MissingEndFlag => write!(f, "missing end flag"),
            Self::PacketTooShort => write!(f, "packet too short"),
            Self::PacketTooLarge => write!(f, "packet too large"),
            Self::InvalidHeader => write!(f, "invalid packet header"),
            Self::BufferTooSmall => write!(f, "output buffer too small"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Fragmentation / reassembly errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyError {
    /// Continuation packet with no open context.
    UnexpectedPacket,
    /// Sequence number or destination broke the running message.
    OutOfSequence,
    /// Message grew past the configured maximum.
    MessageTooLarge,
    /// Every reassembly slot is in use.
    ContextsFull,
    /// First packet carried no message type byte.
    MissingType,
    /// MTU too small to carry anything.
    InvalidMtu,
    /// All eight tags towards the destination are outstanding.
    NoFreeTag,
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedPacket => write!(f, "packet without start of message"),
            Self::OutOfSequence => write!(f, "packet out of sequence"),
            Self::MessageTooLarge => write!(f, "message too large"),
            Self::ContextsFull => write!(f, "no free reassembly context"),
            Self::MissingType => write!(f, "missing message type"),
            Self::InvalidMtu => write!(f, "invalid MTU"),
            Self::NoFreeTag => write!(f, "no free message tag"),
        }
    }
}

impl From<AssemblyError> for Error {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}

// ---------------------------------------------------------------------------
// Control message errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Message shorter than its fixed fields.
    Truncated,
    /// Response carried a command we did not expect.
    UnexpectedCommand(u8),
    /// Peer answered with a non-success completion code.
    Completion(u8),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "control message truncated"),
            Self::UnexpectedCommand(c) => write!(f, "unexpected control command {c:#04x}"),
            Self::Completion(cc) => write!(f, "completion code {cc:#04x}"),
        }
    }
}

impl From<ControlError> for Error {
    fn from(e: ControlError) -> Self {
        Self::Control(e)
    }
}

// ---------------------------------------------------------------------------
// Routing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// No route covers the EID.
    NoRoute(u8),
    /// New route overlaps an existing one.
    Overlap,
    /// Routing table is at capacity.
    TableFull,
    /// Route is empty or runs past EID 255.
    InvalidRange,
    /// Link id was never registered.
    UnknownLink(u8),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoute(eid) => write!(f, "no route to EID {eid}"),
            Self::Overlap => write!(f, "route overlaps existing entry"),
            Self::TableFull => write!(f, "routing table full"),
            Self::InvalidRange => write!(f, "invalid EID range"),
            Self::UnknownLink(l) => write!(f, "unknown link {l}"),
        }
    }
}

impl From<RouteError> for Error {
    fn from(e: RouteError) -> Self {
        Self::Route(e)
    }
}

// ---------------------------------------------------------------------------
// EID pool errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EidError {
    /// Every EID in range is allocated.
    PoolExhausted,
    /// EID outside the pool range or not assignable.
    OutOfRange(u8),
    /// EID is already in use.
    AlreadyAllocated(u8),
    /// EID was not allocated.
    NotAllocated(u8),
    /// Requested block exceeds `max_pool_size`.
    PoolTooLarge(u8),
    /// Range is empty or contains non-assignable EIDs.
    InvalidRange,
}

impl fmt::Display for EidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted => write!(f, "all EIDs have been allocated"),
            Self::OutOfRange(e) => write!(f, "EID {e} outside pool range"),
            Self::AlreadyAllocated(e) => write!(f, "EID {e} already allocated"),
            Self::NotAllocated(e) => write!(f, "EID {e} not allocated"),
            Self::PoolTooLarge(n) => write!(f, "pool of {n} EIDs exceeds max_pool_size"),
            Self::InvalidRange => write!(f, "invalid EID range"),
        }
    }
}

impl From<EidError> for Error {
    fn from(e: EidError) -> Self {
        Self::Eid(e)
    }
}

// ---------------------------------------------------------------------------
// PLDM errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PldmError {
    /// Message shorter than its fixed fields.
    Truncated,
    /// Header version bits are not zero.
    BadHeaderVersion(u8),
    /// Expected a response, got a request (or the reverse).
    UnexpectedKind,
    /// Response did not match any outstanding request.
    NoPendingRequest,
    /// All 32 instance IDs towards the terminus are in use.
    InstanceIdsExhausted,
    /// A handler for this PLDM type is already registered.
    DuplicateType(u8),
    /// Field value outside its allowed range.
    InvalidField,
    /// Peer answered with a non-success completion code.
    Completion(u8),
}

impl fmt::Display for PldmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "PLDM message truncated"),
            Self::BadHeaderVersion(v) => write!(f, "unsupported PLDM header version {v}"),
            Self::UnexpectedKind => write!(f, "unexpected request/response bit"),
            Self::NoPendingRequest => write!(f, "no pending request matches response"),
            Self::InstanceIdsExhausted => write!(f, "no free instance ID"),
            Self::DuplicateType(t) => write!(f, "PLDM type {t:#04x} already registered"),
            Self::InvalidField => write!(f, "invalid field value"),
            Self::Completion(cc) => write!(f, "completion code {cc:#04x}"),
        }
    }
}

impl From<PldmError> for Error {
    fn from(e: PldmError) -> Self {
        Self::Pldm(e)
    }
}

// ---------------------------------------------------------------------------
// Host link / service errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No serial device matched the search patterns.
    NoDevices,
    /// More devices than free EIDs in the dynamic range.
    NotEnoughEids { devices: usize, available: usize },
    /// A device path does not exist.
    DeviceNotFound,
    /// No new network interface appeared after binding.
    InterfaceTimeout,
    /// An external command could not be spawned or exited non-zero.
    CommandFailed(&'static str),
    /// The controller was already closed.
    Closed,
    /// A byte transport failed to read or write.
    Transport,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevices => write!(f, "no serial devices match search pattern(s)"),
            Self::NotEnoughEids { devices, available } => write!(
                f,
                "not enough EIDs for targeted interfaces ({devices} devices, {available} EIDs)"
            ),
            Self::DeviceNotFound => write!(f, "device path not found"),
            Self::InterfaceTimeout => write!(f, "timed out waiting for new network interface"),
            Self::CommandFailed(what) => write!(f, "command failed: {what}"),
            Self::Closed => write!(f, "controller closed"),
            Self::Transport => write!(f, "transport I/O failed"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
