//! Flat handle API used by the sandboxed shell module.
//!
//! Every operation takes and returns plain handles. The managers own the
//! lifecycle rules; [`Bridge`] only routes calls to them and, through
//! [`Bridge::dispatch`], evaluates wire envelopes.

mod dispatch;


use std::sync::Arc;

use bytes::Bytes;
use loper_protocol::{ConnectionHandle, GlobalSessionId, ReaderHandle, SessionHandle};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::query::{QueryStreamBridge, ReadBatch};
use crate::registry::Registry;
use crate::session::SessionManager;
use crate::transport::{Credentials, ServiceTransport};

/// Counts of live resources, for diagnostics and leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveCounts {
	pub connections: usize,
	pub sessions: usize,
	pub readers: usize,
}

/// Host side of the resource-handle bridge.
pub struct Bridge {
	registry: Arc<Registry>,
	connections: ConnectionManager,
	sessions: SessionManager,
	queries: QueryStreamBridge,
}

impl Bridge {
	pub fn new(transport: Arc<dyn ServiceTransport>, config: BridgeConfig) -> Self {
		let registry = Arc::new(Registry::new(config));
		Self {
			connections: ConnectionManager::new(Arc::clone(&registry), transport),
			sessions: SessionManager::new(Arc::clone(&registry)),
			queries: QueryStreamBridge::new(Arc::clone(&registry)),
			registry,
		}
	}

	pub fn connections(&self) -> &ConnectionManager {
		&self.connections
	}

	pub fn sessions(&self) -> &SessionManager {
		&self.sessions
	}

	pub fn queries(&self) -> &QueryStreamBridge {
		&self.queries
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.registry.config
	}

	pub async fn open_connection(&self, url: &str, credentials: Option<Credentials>) -> Result<ConnectionHandle> {
		self.connections.open(url, credentials).await
	}

	pub fn close_connection(&self, handle: ConnectionHandle) -> Result<()> {
		self.connections.close(handle)
	}

	pub async fn create_session(&self, connection: ConnectionHandle) -> Result<(SessionHandle, GlobalSessionId)> {
		self.sessions.create(connection).await
	}

	pub fn close_session(&self, handle: SessionHandle) -> Result<()> {
		self.sessions.close(handle)
	}

	pub async fn execute_query(&self, session: SessionHandle, text: &str) -> Result<ReaderHandle> {
		self.queries.execute(session, text).await
	}

	/// Next chunk of a reader, or `None` at end of stream.
	pub async fn pull(&self, reader: ReaderHandle) -> Result<Option<Bytes>> {
		self.queries.pull(reader).await
	}

	pub async fn pull_available(&self, reader: ReaderHandle) -> Result<ReadBatch> {
		self.queries.pull_available(reader).await
	}

	/// Never fails; closing an unknown or already closed reader is a no-op.
	pub fn close_reader(&self, reader: ReaderHandle) {
		self.queries.close(reader)
	}

	pub fn live_counts(&self) -> LiveCounts {
		LiveCounts {
			connections: self.registry.connections.len(),
			sessions: self.registry.sessions.len(),
			readers: self.registry.readers.len(),
		}
	}

	/// Closes every live connection and waits for all background work.
	///
	/// Stream pumps and remote close calls have finished when this returns.
	pub async fn shutdown(&self) {
		let handles = self.connections.handles();
		debug!(target: "loper::bridge", connections = handles.len(), "shutting down");
		for handle in handles {
			// A concurrent close may have released it already.
			let _ = self.connections.close(handle);
		}
		self.registry.drain().await;
	}

	/// Waits for background work spawned so far without closing anything.
	pub async fn settle(&self) {
		self.registry.drain().await;
	}
}
