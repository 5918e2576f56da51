//! PLDM command dispatch.
//!
//! Every request passes through a gated pipeline:
//!
//! 1. **Header gate**: unparsable headers get no response at all.
//! 2. **Kind gate**: only requests are answered; responses and
//!    datagrams are ignored.
//! 3. **Type gate**: unknown PLDM types get `ERROR_INVALID_PLDM_TYPE`.
//! 4. **Command gate**: commands outside the type's set get
//!    `ERROR_UNSUPPORTED_PLDM_CMD`.
//!
//! Base (type 0) commands are answered here; other types go to a
//! registered [`PldmHandler`].

use log::{debug, info};

use super::base::{
    self, BASE_VERSION, CC_INVALID_DATA_TRANSFER_HANDLE, CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA,
    CC_INVALID_PLDM_VERSION_IN_REQUEST_DATA, CC_INVALID_TRANSFER_OPERATION_FLAG, CMD_GET_PLDM_COMMANDS,
    CMD_GET_PLDM_TYPES, CMD_GET_PLDM_VERSION, CMD_GET_TID, CMD_SET_TID, CommandSet,
    GetCommandsRequest, GetVersionRequest, TID_RESERVED, TID_UNASSIGNED, TRANSFER_OP_GET_FIRST_PART,
    TypeSet, Ver32, types,
};
use super::header::{CompletionCode, HEADER_SIZE, MessageKind, PldmHeader};
use crate::error::PldmError;

const BASE_COMMANDS: &[u8] = &[
    CMD_SET_TID,
    CMD_GET_TID,
    CMD_GET_PLDM_VERSION,
    CMD_GET_PLDM_TYPES,
    CMD_GET_PLDM_COMMANDS,
];
const BASE_VERSIONS: &[Ver32] = &[BASE_VERSION];

/// Responder for one PLDM type.
pub trait PldmHandler {
    fn pldm_type(&self) -> u8;

    /// Versions reported by GetPLDMVersion.
    fn versions(&self) -> &[Ver32];

    /// Command codes reported by GetPLDMCommands.
    fn commands(&self) -> &[u8];

    /// Handle a supported command. Response data goes into `response`;
    /// it is discarded unless the result is `Success`.
    fn handle(&mut self, command: u8, request: &[u8], response: &mut Vec<u8>) -> CompletionCode;
}

pub struct PldmResponder {
    tid: u8,
    handlers: Vec<Box<dyn PldmHandler>>,
}

impl PldmResponder {
    pub fn new(tid: u8) -> Self {
        Self {
            tid,
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Box<dyn PldmHandler>) -> Result<(), PldmError> {
        let t = handler.pldm_type();
        if t == types::BASE || self.handlers.iter().any(|h| h.pldm_type() == t) {
            return Err(PldmError::DuplicateType(t));
        }
        self.handlers.push(handler);
        Ok(())
    }

    pub fn tid(&self) -> u8 {
        self.tid
    }

    /// Supported PLDM types, base included.
    pub fn types(&self) -> TypeSet {
        let mut set = TypeSet::default();
        set.insert(types::BASE);
        for h in &self.handlers {
            set.insert(h.pldm_type());
        }
        set
    }

    /// Build the response body for a request body, if one is due.
    pub fn handle_request(&mut self, body: &[u8]) -> Option<Vec<u8>> {
        let header = match PldmHeader::parse(body) {
            Ok(h) => h,
            Err(e) => {
                debug!("PLDM: dropping message: {}", e);
                return None;
            }
        };
        if header.kind != MessageKind::Request {
            return None;
        }
        let payload = &body[HEADER_SIZE..];
        let mut data = Vec::new();

        let cc = if header.pldm_type == types::BASE {
            if BASE_COMMANDS.contains(&header.command) {
                self.handle_base(header.command, payload, &mut data)
            } else {
                CompletionCode::ErrorUnsupportedPldmCmd
            }
        } else {
            match self
                .handlers
                .iter_mut()
                .find(|h| h.pldm_type() == header.pldm_type)
            {
                None => CompletionCode::ErrorInvalidPldmType,
                Some(h) if !h.commands().contains(&header.command) => {
                    CompletionCode::ErrorUnsupportedPldmCmd
                }
                Some(h) => h.handle(header.command, payload, &mut data),
            }
        };

        if !cc.is_success() {
            debug!(
                "PLDM: type 0x{:02x} cmd 0x{:02x} -> cc 0x{:02x}",
                header.pldm_type,
                header.command,
                cc.code()
            );
        }

        let mut out = header.to_response().encode().to_vec();
        out.push(cc.code());
        if cc.is_success() {
            out.extend_from_slice(&data);
        }
        Some(out)
    }

    fn versions_for(&self, pldm_type: u8) -> Option<&[Ver32]> {
        if pldm_type == types::BASE {
            return Some(BASE_VERSIONS);
        }
        self.handlers
            .iter()
            .find(|h| h.pldm_type() == pldm_type)
            .map(|h| h.versions())
    }

    fn commands_for(&self, pldm_type: u8) -> Option<CommandSet> {
        if pldm_type == types::BASE {
            return Some(CommandSet::from_commands(BASE_COMMANDS));
        }
        self.handlers
            .iter()
            .find(|h| h.pldm_type() == pldm_type)
            .map(|h| CommandSet::from_commands(h.commands()))
    }

    fn handle_base(&mut self, command: u8, payload: &[u8], out: &mut Vec<u8>) -> CompletionCode {
        match command {
            CMD_SET_TID => {
                let Some(&tid) = payload.first() else {
                    return CompletionCode::ErrorInvalidLength;
                };
                if tid == TID_UNASSIGNED || tid == TID_RESERVED {
                    return CompletionCode::ErrorInvalidData;
                }
                info!("PLDM: TID set to {}", tid);
                self.tid = tid;
                CompletionCode::Success
            }
            CMD_GET_TID => {
                out.push(self.tid);
                CompletionCode::Success
            }
            CMD_GET_PLDM_VERSION => {
                let Ok(req) = GetVersionRequest::decode(payload) else {
                    return CompletionCode::ErrorInvalidLength;
                };
                if req.operation != TRANSFER_OP_GET_FIRST_PART {
                    return CompletionCode::Other(CC_INVALID_TRANSFER_OPERATION_FLAG);
                }
                if req.transfer_handle != 0 {
                    return CompletionCode::Other(CC_INVALID_DATA_TRANSFER_HANDLE);
                }
                let Some(versions) = self.versions_for(req.pldm_type) else {
                    return CompletionCode::Other(CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA);
                };
                base::encode_version_response(versions, out);
                CompletionCode::Success
            }
            CMD_GET_PLDM_TYPES => {
                out.extend_from_slice(&self.types().to_bytes());
                CompletionCode::Success
            }
            CMD_GET_PLDM_COMMANDS => {
                let Ok(req) = GetCommandsRequest::decode(payload) else {
                    return CompletionCode::ErrorInvalidLength;
                };
                let Some(versions) = self.versions_for(req.pldm_type) else {
                    return CompletionCode::Other(CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA);
                };
                if !versions.contains(&req.version) {
                    return CompletionCode::Other(CC_INVALID_PLDM_VERSION_IN_REQUEST_DATA);
                }
                let Some(commands) = self.commands_for(req.pldm_type) else {
                    return CompletionCode::Other(CC_INVALID_PLDM_TYPE_IN_REQUEST_DATA);
                };
                out.extend_from_slice(&commands.to_bytes());
                CompletionCode::Success
            }
            _ => CompletionCode::ErrorUnsupportedPldmCmd,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
