use std::sync::Arc;

use loper_protocol::{GlobalSessionId, SessionHandle};
use loper_runtime::{Bridge, Result};

use crate::QueryStream;

/// A session on a [`Connection`](crate::Connection).
#[derive(Clone)]
pub struct Session {
	bridge: Arc<Bridge>,
	handle: SessionHandle,
	global_id: GlobalSessionId,
}

impl Session {
	pub(crate) fn new(bridge: Arc<Bridge>, handle: SessionHandle, global_id: GlobalSessionId) -> Self {
		Self {
			bridge,
			handle,
			global_id,
		}
	}

	pub fn handle(&self) -> SessionHandle {
		self.handle
	}

	/// Identifier the service assigned to this session.
	pub fn global_id(&self) -> &GlobalSessionId {
		&self.global_id
	}

	/// Runs `text` and returns a stream over its result chunks.
	pub async fn execute_query(&self, text: &str) -> Result<QueryStream> {
		let handle = self.bridge.execute_query(self.handle, text).await?;
		Ok(QueryStream::new(Arc::clone(&self.bridge), handle))
	}

	/// Closes the session and every stream it produced.
	pub fn close(&self) -> Result<()> {
		self.bridge.close_session(self.handle)
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("handle", &self.handle)
			.field("global_id", &self.global_id)
			.finish()
	}
}
