use std::sync::Arc;

use loper_protocol::ConnectionHandle;
use loper_runtime::{Bridge, Result};
use url::Url;

use crate::Session;

/// An open connection to the remote service.
///
/// Clones share the same underlying handle; closing one closes them all.
#[derive(Clone)]
pub struct Connection {
	bridge: Arc<Bridge>,
	handle: ConnectionHandle,
}

impl Connection {
	pub(crate) fn new(bridge: Arc<Bridge>, handle: ConnectionHandle) -> Self {
		Self { bridge, handle }
	}

	pub fn handle(&self) -> ConnectionHandle {
		self.handle
	}

	/// Service URL this connection was opened against.
	pub fn url(&self) -> Result<Url> {
		self.bridge.connections().url(self.handle)
	}

	pub async fn create_session(&self) -> Result<Session> {
		let (handle, global_id) = self.bridge.create_session(self.handle).await?;
		Ok(Session::new(Arc::clone(&self.bridge), handle, global_id))
	}

	/// Closes the connection together with every session and stream under it.
	pub fn close(&self) -> Result<()> {
		self.bridge.close_connection(self.handle)
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection").field("handle", &self.handle).finish()
	}
}
