//! Connections to the remote service and their cascade close.

use std::sync::Arc;

use loper_protocol::{ConnectionHandle, GlobalSessionId, SessionHandle};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::session;
use crate::transport::{Credentials, ServiceClient, ServiceTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Open,
	Closed,
}

pub(crate) struct ConnectionInner {
	pub(crate) state: ConnectionState,
	/// Child sessions in creation order.
	pub(crate) sessions: Vec<SessionHandle>,
}

/// A live connection: one transport client plus its child sessions.
pub(crate) struct ConnectionEntry {
	pub(crate) handle: ConnectionHandle,
	pub(crate) url: Url,
	pub(crate) client: Arc<dyn ServiceClient>,
	/// Parent of every session and reader token below this connection.
	pub(crate) cancel: CancellationToken,
	pub(crate) inner: Mutex<ConnectionInner>,
}

impl ConnectionEntry {
	fn new(handle: ConnectionHandle, url: Url, client: Arc<dyn ServiceClient>) -> Self {
		Self {
			handle,
			url,
			client,
			cancel: CancellationToken::new(),
			inner: Mutex::new(ConnectionInner {
				state: ConnectionState::Open,
				sessions: Vec::new(),
			}),
		}
	}

	pub(crate) fn is_open(&self) -> bool {
		self.inner.lock().state == ConnectionState::Open
	}

	/// Marks the connection closed and hands back its sessions.
	///
	/// Cancels every descendant token, so in-flight work below this connection
	/// resolves with `ResourceClosed`.
	fn begin_close(&self) -> Vec<SessionHandle> {
		let sessions = {
			let mut inner = self.inner.lock();
			inner.state = ConnectionState::Closed;
			std::mem::take(&mut inner.sessions)
		};
		self.cancel.cancel();
		sessions
	}

	pub(crate) fn forget_session(&self, session: SessionHandle) {
		self.inner.lock().sessions.retain(|s| *s != session);
	}
}

/// Opens and closes connections.
pub struct ConnectionManager {
	registry: Arc<Registry>,
	transport: Arc<dyn ServiceTransport>,
}

impl ConnectionManager {
	pub(crate) fn new(registry: Arc<Registry>, transport: Arc<dyn ServiceTransport>) -> Self {
		Self { registry, transport }
	}

	/// Builds a transport client for `url`, opens it, and registers the connection.
	///
	/// Nothing is registered if the transport fails.
	pub async fn open(&self, url: &str, credentials: Option<Credentials>) -> Result<ConnectionHandle> {
		let url = parse_service_url(url)?;

		let client = self
			.transport
			.create_client(&url, credentials.as_ref())
			.await
			.map_err(Error::service)?;
		client.open_connection().await.map_err(Error::service)?;

		let (handle, _) = match self
			.registry
			.connections
			.allocate(|handle| ConnectionEntry::new(handle, url.clone(), Arc::clone(&client)))
		{
			Ok(allocated) => allocated,
			Err(err) => {
				self.registry.spawn_background("close_connection", close_remote(client, Vec::new()));
				return Err(err);
			}
		};

		debug!(target: "loper::bridge", %handle, %url, "connection opened");
		Ok(handle)
	}

	/// Closes the connection and cascades to every session and reader below it.
	///
	/// Local handles are released before this returns. Remote close calls run
	/// in the background; their failures are logged and otherwise ignored.
	pub fn close(&self, handle: ConnectionHandle) -> Result<()> {
		let connection = self
			.registry
			.connections
			.release(handle)
			.ok_or_else(|| Error::invalid_handle(handle))?;

		let mut remote_sessions = Vec::new();
		for session in connection.begin_close() {
			if let Some(entry) = session::detach_session(&self.registry, session) {
				remote_sessions.push(entry.global_id.clone());
			}
		}

		debug!(
			target: "loper::bridge",
			handle = %connection.handle,
			url = %connection.url,
			sessions = remote_sessions.len(),
			"connection closed"
		);

		let client = Arc::clone(&connection.client);
		self.registry
			.spawn_background("close_connection", close_remote(client, remote_sessions));
		Ok(())
	}

	/// Returns the service URL a live connection was opened against.
	pub fn url(&self, handle: ConnectionHandle) -> Result<Url> {
		Ok(self.registry.connections.resolve(handle)?.url.clone())
	}

	/// Returns the live sessions of a connection in creation order.
	pub fn sessions(&self, handle: ConnectionHandle) -> Result<Vec<SessionHandle>> {
		Ok(self.registry.connections.resolve(handle)?.inner.lock().sessions.clone())
	}

	/// Live connection handles in allocation order.
	pub fn handles(&self) -> Vec<ConnectionHandle> {
		self.registry.connections.handles()
	}
}

/// Closes remote sessions in creation order, then the connection itself.
async fn close_remote(client: Arc<dyn ServiceClient>, sessions: Vec<GlobalSessionId>) {
	for global_id in sessions {
		if let Err(err) = client.close_session(&global_id).await {
			warn!(target: "loper::session", %global_id, error = %err, "remote session close failed");
		}
	}
	if let Err(err) = client.close_connection().await {
		warn!(target: "loper::bridge", error = %err, "remote connection close failed");
	}
}

fn parse_service_url(raw: &str) -> Result<Url> {
	let url = Url::parse(raw).map_err(|e| Error::InvalidArgument(format!("invalid service url '{raw}': {e}")))?;
	if url.host_str().is_none() {
		return Err(Error::InvalidArgument(format!("service url '{raw}' has no host")));
	}
	Ok(url)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_accepts_http_urls() {
		let url = parse_service_url("https://host:8443/db").unwrap();
		assert_eq!(url.host_str(), Some("host"));
		assert_eq!(url.port(), Some(8443));
	}

	#[test]
	fn parse_rejects_malformed_urls() {
		let err = parse_service_url("not a url").unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}

	#[test]
	fn parse_rejects_hostless_urls() {
		let err = parse_service_url("mailto:someone@example.com").unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}
}
