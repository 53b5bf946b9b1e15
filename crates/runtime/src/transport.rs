//! Boundary to the service transport that performs the actual RPCs.
//!
//! The bridge never speaks the wire protocol itself. A [`ServiceTransport`]
//! builds one [`ServiceClient`] per connection; the client opens the
//! connection, manages sessions, and turns a query into a stream of
//! [`Frame`]s. Dropping a [`FrameStream`] is how the bridge cancels a query.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use loper_protocol::GlobalSessionId;
use thiserror::Error;
use url::Url;

/// One unit of a streamed query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Data(Bytes),
	End,
	Error(String),
}

/// Asynchronous frame sequence returned by [`ServiceClient::execute_query`].
///
/// A stream that finishes without yielding [`Frame::End`] is treated as ended.
pub type FrameStream = BoxStream<'static, Frame>;

/// Failure reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
	pub message: String,
}

impl TransportError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Opaque credentials handed to the transport when a client is built.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Credentials(<redacted>)")
	}
}

/// Factory for per-connection clients.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
	async fn create_client(
		&self,
		url: &Url,
		credentials: Option<&Credentials>,
	) -> TransportResult<Arc<dyn ServiceClient>>;
}

/// RPC surface of one connection to the remote service.
#[async_trait]
pub trait ServiceClient: Send + Sync {
	async fn open_connection(&self) -> TransportResult<()>;

	async fn close_connection(&self) -> TransportResult<()>;

	/// Creates a session and returns the identifier the service assigned to it.
	async fn create_session(&self) -> TransportResult<GlobalSessionId>;

	async fn close_session(&self, session: &GlobalSessionId) -> TransportResult<()>;

	async fn execute_query(&self, session: &GlobalSessionId, text: &str) -> TransportResult<FrameStream>;
}
