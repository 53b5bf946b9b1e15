//! Wire types shared between the Loper host bridge and the embedded shell module.
//!
//! The shell runs isolated from host object identity, so everything crossing
//! the boundary is plain data: integer handles, strings, and base64 chunk
//! payloads.
//!
//! # Main Types
//!
//! - [`ConnectionHandle`], [`SessionHandle`], [`ReaderHandle`] - opaque handles by kind
//! - [`GlobalSessionId`] - service-assigned session identifier
//! - [`BridgeRequest`] / [`BridgeResponse`] - flat bridge calls and their results
//! - [`RequestEnvelope`] / [`ResponseEnvelope`] - correlation wrappers for concurrent calls

pub mod handle;
pub mod message;

pub use handle::{ConnectionHandle, GlobalSessionId, HandleKind, ReaderHandle, SessionHandle, TypedHandle};
pub use message::{BridgeRequest, BridgeResponse, ErrorCode, RequestEnvelope, ResponseEnvelope};
