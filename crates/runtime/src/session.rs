//! Sessions scoped to a connection.

use std::sync::Arc;

use loper_protocol::{ConnectionHandle, GlobalSessionId, ReaderHandle, SessionHandle};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{ConnectionEntry, ConnectionState};
use crate::error::{Error, Result};
use crate::query;
use crate::registry::Registry;
use crate::transport::ServiceClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Open,
	Closed,
}

pub(crate) struct SessionInner {
	pub(crate) state: SessionState,
	/// Child readers in creation order.
	pub(crate) readers: Vec<ReaderHandle>,
	/// Readers released at end of stream; their markers go when the session closes.
	pub(crate) exhausted: Vec<ReaderHandle>,
}

pub(crate) struct SessionEntry {
	pub(crate) handle: SessionHandle,
	pub(crate) connection: ConnectionHandle,
	pub(crate) global_id: GlobalSessionId,
	pub(crate) client: Arc<dyn ServiceClient>,
	pub(crate) cancel: CancellationToken,
	pub(crate) inner: Mutex<SessionInner>,
}

impl SessionEntry {
	pub(crate) fn is_open(&self) -> bool {
		self.inner.lock().state == SessionState::Open
	}

	/// Marks the session closed, cancels its readers' tokens, and hands back
	/// the live and exhausted readers.
	fn begin_close(&self) -> (Vec<ReaderHandle>, Vec<ReaderHandle>) {
		let taken = {
			let mut inner = self.inner.lock();
			inner.state = SessionState::Closed;
			(std::mem::take(&mut inner.readers), std::mem::take(&mut inner.exhausted))
		};
		self.cancel.cancel();
		taken
	}

	pub(crate) fn forget_reader(&self, reader: ReaderHandle) {
		self.inner.lock().readers.retain(|r| *r != reader);
	}
}

/// Releases a session handle and tears down its readers.
///
/// Returns the entry only to the caller that actually released it, so the
/// cascade runs once even when closes race.
pub(crate) fn detach_session(registry: &Registry, handle: SessionHandle) -> Option<Arc<SessionEntry>> {
	let session = registry.sessions.release(handle)?;
	let (readers, exhausted) = session.begin_close();
	for reader in readers {
		query::detach_reader(registry, reader);
	}
	for reader in exhausted {
		registry.exhausted.remove(&reader);
	}
	Some(session)
}

/// Creates and closes sessions.
pub struct SessionManager {
	registry: Arc<Registry>,
}

impl SessionManager {
	pub(crate) fn new(registry: Arc<Registry>) -> Self {
		Self { registry }
	}

	/// Creates a session on an open connection.
	///
	/// Fails with `IllegalState` for a closed connection and `InvalidHandle`
	/// for one that never existed; neither contacts the transport.
	pub async fn create(&self, connection: ConnectionHandle) -> Result<(SessionHandle, GlobalSessionId)> {
		let entry = self.open_connection(connection, "create session")?;

		let global_id = tokio::select! {
			biased;
			_ = entry.cancel.cancelled() => return Err(Error::closed(connection)),
			created = entry.client.create_session() => created.map_err(Error::service)?,
		};

		let allocated = {
			let mut inner = entry.inner.lock();
			if inner.state != ConnectionState::Open {
				Err(Error::closed(connection))
			} else {
				self.registry
					.sessions
					.allocate(|handle| SessionEntry {
						handle,
						connection,
						global_id: global_id.clone(),
						client: Arc::clone(&entry.client),
						cancel: entry.cancel.child_token(),
						inner: Mutex::new(SessionInner {
							state: SessionState::Open,
							readers: Vec::new(),
							exhausted: Vec::new(),
						}),
					})
					.map(|(handle, _)| {
						inner.sessions.push(handle);
						handle
					})
			}
		};

		let handle = match allocated {
			Ok(handle) => handle,
			Err(err) => {
				// The service already created the session; nothing local will close it.
				let client = Arc::clone(&entry.client);
				let orphan = global_id.clone();
				self.registry.spawn_background("close_session", async move {
					close_remote(client, orphan).await;
				});
				return Err(err);
			}
		};

		debug!(target: "loper::session", %handle, %connection, %global_id, "session created");
		Ok((handle, global_id))
	}

	/// Closes the session, its readers, and (in the background) the remote session.
	///
	/// A second close of the same handle fails with `InvalidHandle`.
	pub fn close(&self, handle: SessionHandle) -> Result<()> {
		let session = detach_session(&self.registry, handle).ok_or_else(|| Error::invalid_handle(handle))?;

		if let Ok(connection) = self.registry.connections.resolve(session.connection) {
			connection.forget_session(handle);
		}

		debug!(
			target: "loper::session",
			handle = %session.handle,
			connection = %session.connection,
			global_id = %session.global_id,
			"session closed"
		);

		let client = Arc::clone(&session.client);
		let global_id = session.global_id.clone();
		self.registry.spawn_background("close_session", async move {
			close_remote(client, global_id).await;
		});
		Ok(())
	}

	/// Returns the service-assigned identifier of a live session.
	pub fn global_id(&self, handle: SessionHandle) -> Result<GlobalSessionId> {
		Ok(self.registry.sessions.resolve(handle)?.global_id.clone())
	}

	/// Returns the live readers of a session in creation order.
	pub fn readers(&self, handle: SessionHandle) -> Result<Vec<ReaderHandle>> {
		Ok(self.registry.sessions.resolve(handle)?.inner.lock().readers.clone())
	}

	fn open_connection(&self, handle: ConnectionHandle, operation: &'static str) -> Result<Arc<ConnectionEntry>> {
		match self.registry.connections.resolve(handle) {
			Ok(entry) if entry.is_open() => Ok(entry),
			Ok(_) => Err(Error::illegal_state(handle, operation)),
			Err(_) if self.registry.connections.was_released(handle) => Err(Error::illegal_state(handle, operation)),
			Err(err) => Err(err),
		}
	}
}

async fn close_remote(client: Arc<dyn ServiceClient>, global_id: GlobalSessionId) {
	if let Err(err) = client.close_session(&global_id).await {
		warn!(target: "loper::session", %global_id, error = %err, "remote session close failed");
	}
}
