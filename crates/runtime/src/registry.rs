//! Shared state behind the bridge managers.

use std::future::Future;

use dashmap::DashSet;
use loper_protocol::{ConnectionHandle, ReaderHandle, SessionHandle};
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use crate::config::BridgeConfig;
use crate::connection::ConnectionEntry;
use crate::handle_table::HandleTable;
use crate::query::ReaderEntry;
use crate::session::SessionEntry;

/// The three handle tables plus the background work spawned on their behalf.
///
/// The tables are the sole authority on liveness: a resource is live exactly
/// while its handle resolves.
pub(crate) struct Registry {
	pub(crate) connections: HandleTable<ConnectionHandle, ConnectionEntry>,
	pub(crate) sessions: HandleTable<SessionHandle, SessionEntry>,
	pub(crate) readers: HandleTable<ReaderHandle, ReaderEntry>,
	/// Readers released at end of stream whose session is still open.
	pub(crate) exhausted: DashSet<ReaderHandle>,
	pub(crate) config: BridgeConfig,
	tasks: TaskTracker,
}

impl Registry {
	pub(crate) fn new(config: BridgeConfig) -> Self {
		Self {
			connections: HandleTable::new(),
			sessions: HandleTable::new(),
			readers: HandleTable::new(),
			exhausted: DashSet::new(),
			config,
			tasks: TaskTracker::new(),
		}
	}

	/// Runs `work` on the current tokio runtime, tracked until [`Registry::drain`].
	///
	/// Close operations are synchronous, so remote close calls are handed off
	/// here. Outside a runtime the work is dropped.
	pub(crate) fn spawn_background<F>(&self, name: &'static str, work: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		match Handle::try_current() {
			Ok(runtime) => self.spawn_on(&runtime, work),
			Err(_) => {
				tracing::warn!(target: "loper::bridge", task = name, "no tokio runtime; background work dropped");
			}
		}
	}

	/// Spawns tracked work on a runtime the caller already holds.
	pub(crate) fn spawn_on<F>(&self, runtime: &Handle, work: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		runtime.spawn(self.tasks.track_future(work));
	}

	/// Waits for every background task spawned so far.
	pub(crate) async fn drain(&self) {
		self.tasks.close();
		self.tasks.wait().await;
		self.tasks.reopen();
	}
}
