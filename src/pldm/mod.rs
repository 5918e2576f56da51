//! PLDM (DSP0240) over MCTP.
//!
//! [`header`] and [`base`] are wire formats. [`responder`] answers
//! requests, [`requester`] tracks our own, and [`service`] ties both to
//! an [`Endpoint`](crate::mctp::Endpoint).

pub mod base;
pub mod header;
pub mod requester;
pub mod responder;
pub mod service;

pub use header::{CompletionCode, InstanceId, MessageKind, PldmHeader};
pub use requester::{PldmRequester, PldmResponse};
pub use responder::{PldmHandler, PldmResponder};
pub use service::{PldmEvent, PldmService};
