//! Error types for the Loper bridge runtime.

use loper_protocol::{ErrorCode, HandleKind, TypedHandle};
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by bridge operations.
#[derive(Debug, Error)]
pub enum Error {
	/// Handle is unknown or has already been released.
	#[error("Invalid handle: {kind}#{handle}")]
	InvalidHandle { kind: HandleKind, handle: u32 },

	/// The resource exists (or existed) but its lifecycle state forbids the operation.
	#[error("Illegal state: cannot {operation} on closed {kind}#{handle}")]
	IllegalState {
		kind: HandleKind,
		handle: u32,
		operation: &'static str,
	},

	/// The transport failed while opening or creating a resource.
	#[error("Service error: {0}")]
	ServiceError(String),

	/// The transport reported an error frame while streaming results.
	#[error("Transport failure: {0}")]
	TransportFailure(String),

	/// The resource, or one of its ancestors, was closed while the operation was in flight.
	#[error("Resource closed: {kind}#{handle}")]
	ResourceClosed { kind: HandleKind, handle: u32 },

	/// Malformed input from the caller.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// The per-kind handle counter ran out of values.
	#[error("Handle space exhausted for {0} handles")]
	HandlesExhausted(HandleKind),

	/// A query was started outside a tokio runtime, so nothing could drive its stream.
	#[error("No tokio runtime available to drive the query stream")]
	RuntimeUnavailable,

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn invalid_handle<H: TypedHandle>(handle: H) -> Self {
		Error::InvalidHandle {
			kind: H::KIND,
			handle: handle.raw(),
		}
	}

	pub fn illegal_state<H: TypedHandle>(handle: H, operation: &'static str) -> Self {
		Error::IllegalState {
			kind: H::KIND,
			handle: handle.raw(),
			operation,
		}
	}

	pub fn closed<H: TypedHandle>(handle: H) -> Self {
		Error::ResourceClosed {
			kind: H::KIND,
			handle: handle.raw(),
		}
	}

	/// Wraps a transport failure from a create/open call, keeping its message unmodified.
	pub fn service(err: TransportError) -> Self {
		Error::ServiceError(err.message)
	}

	/// Wire classification for the shell module.
	pub fn code(&self) -> ErrorCode {
		match self {
			Error::InvalidHandle { .. } => ErrorCode::InvalidHandle,
			Error::IllegalState { .. } => ErrorCode::IllegalState,
			Error::ServiceError(_) => ErrorCode::ServiceError,
			Error::TransportFailure(_) => ErrorCode::TransportFailure,
			Error::ResourceClosed { .. } => ErrorCode::ResourceClosed,
			Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
			Error::HandlesExhausted(_) | Error::RuntimeUnavailable | Error::Io(_) | Error::Json(_) => ErrorCode::InternalError,
		}
	}

	/// Returns true if the error names an unknown or released handle.
	pub fn is_invalid_handle(&self) -> bool {
		matches!(self, Error::InvalidHandle { .. })
	}

	/// Returns true if an in-flight operation was cut short by a close.
	pub fn is_resource_closed(&self) -> bool {
		matches!(self, Error::ResourceClosed { .. })
	}

	/// Returns the remote message carried by transport-originated errors.
	pub fn transport_message(&self) -> Option<&str> {
		match self {
			Error::ServiceError(message) | Error::TransportFailure(message) => Some(message),
			_ => None,
		}
	}
}
