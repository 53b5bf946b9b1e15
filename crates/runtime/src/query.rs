//! Query execution and pull-based delivery of result chunks.
//!
//! Each reader owns a pump task that polls the transport's [`FrameStream`]
//! and forwards frames, in arrival order, into a bounded channel. Pulls
//! consume that channel one at a time: the reader's cursor sits behind an
//! async mutex, so a second pull on the same handle waits for the first.
//!
//! Reader states:
//!
//! ```text
//! Active --data--> Active
//! Active --end---> Exhausted   (handle released, pulls keep returning None)
//! Active --error-> Closed      (handle released, pull fails)
//! Active --close-> Closed      (handle released, stream cancelled)
//! ```
//!
//! An exhausted reader leaves the handle table. Its session keeps a marker
//! so later pulls still answer `None`, until the session closes or the
//! reader is closed explicitly.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use loper_protocol::{ReaderHandle, SessionHandle};
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, MutexGuard, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::session::{SessionEntry, SessionState};
use crate::transport::{Frame, FrameStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
	Active,
	Exhausted,
	Closed,
}

/// Chunks taken by [`QueryStreamBridge::pull_available`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadBatch {
	pub chunks: Vec<Bytes>,
	/// True once the stream has signalled its end.
	pub finished: bool,
}

struct Cursor {
	/// `None` once the stream is exhausted.
	frames: Option<mpsc::Receiver<Frame>>,
	/// A terminal error met while draining, surfaced by the next pull.
	held: Option<Frame>,
}

impl Cursor {
	fn try_next(&mut self) -> Option<Frame> {
		if let Some(frame) = self.held.take() {
			return Some(frame);
		}
		self.frames.as_mut()?.try_recv().ok()
	}
}

pub(crate) struct ReaderEntry {
	handle: ReaderHandle,
	session: SessionHandle,
	cancel: CancellationToken,
	state: Mutex<ReaderState>,
	cursor: TokioMutex<Cursor>,
}

impl ReaderEntry {
	fn state(&self) -> ReaderState {
		*self.state.lock()
	}

	/// Waits for exclusive use of the cursor, giving up if the reader is closed meanwhile.
	async fn lock_cursor(&self) -> Result<MutexGuard<'_, Cursor>> {
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(Error::closed(self.handle)),
			cursor = self.cursor.lock() => Ok(cursor),
		}
	}

	async fn next_frame(&self, cursor: &mut Cursor) -> Result<Frame> {
		if let Some(frame) = cursor.held.take() {
			return Ok(frame);
		}
		let Some(frames) = cursor.frames.as_mut() else {
			return Ok(Frame::End);
		};
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(Error::closed(self.handle)),
			frame = frames.recv() => frame.ok_or_else(|| Error::closed(self.handle)),
		}
	}

	/// Drops the stream. Returns true if this call moved the reader out of `Active`.
	fn exhaust(&self, cursor: &mut Cursor) -> bool {
		cursor.frames = None;
		let mut state = self.state.lock();
		if *state != ReaderState::Active {
			return false;
		}
		*state = ReaderState::Exhausted;
		true
	}

	/// Marks the reader closed and stops its pump. Returns the state it left.
	fn shut(&self) -> ReaderState {
		let previous = std::mem::replace(&mut *self.state.lock(), ReaderState::Closed);
		self.cancel.cancel();
		previous
	}
}

/// Releases a reader handle and cancels its stream if still active.
pub(crate) fn detach_reader(registry: &Registry, handle: ReaderHandle) -> Option<Arc<ReaderEntry>> {
	let reader = registry.readers.release(handle)?;
	let previous = reader.shut();
	debug!(target: "loper::query", %handle, ?previous, "reader closed");
	Some(reader)
}

/// Executes queries and delivers their result chunks.
pub struct QueryStreamBridge {
	registry: Arc<Registry>,
}

impl QueryStreamBridge {
	pub(crate) fn new(registry: Arc<Registry>) -> Self {
		Self { registry }
	}

	/// Runs `text` on an open session and returns a reader over its result.
	///
	/// Fails with `IllegalState` for a closed session and `InvalidHandle` for
	/// one that never existed; neither contacts the transport.
	pub async fn execute(&self, session: SessionHandle, text: &str) -> Result<ReaderHandle> {
		let entry = self.open_session(session, "execute query")?;
		// The pump needs a runtime; refuse before the service starts the query.
		let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::RuntimeUnavailable)?;

		let frames = tokio::select! {
			biased;
			_ = entry.cancel.cancelled() => return Err(Error::closed(session)),
			started = entry.client.execute_query(&entry.global_id, text) => started.map_err(Error::service)?,
		};

		let (tx, rx) = mpsc::channel(self.registry.config.chunk_buffer.max(1));
		let (handle, cancel) = {
			let mut inner = entry.inner.lock();
			if inner.state != SessionState::Open {
				// Dropping `frames` cancels the query on the transport side.
				return Err(Error::closed(session));
			}
			let cancel = entry.cancel.child_token();
			let (handle, _) = self.registry.readers.allocate(|handle| ReaderEntry {
				handle,
				session,
				cancel: cancel.clone(),
				state: Mutex::new(ReaderState::Active),
				cursor: TokioMutex::new(Cursor {
					frames: Some(rx),
					held: None,
				}),
			})?;
			inner.readers.push(handle);
			(handle, cancel)
		};

		self.registry.spawn_on(&runtime, pump(handle, frames, tx, cancel));

		debug!(target: "loper::query", %handle, %session, "query started");
		Ok(handle)
	}

	/// Returns the next chunk, or `None` once the stream has ended.
	///
	/// An exhausted reader keeps answering `None` without touching the
	/// transport. An error frame closes the reader and fails the pull.
	pub async fn pull(&self, handle: ReaderHandle) -> Result<Option<Bytes>> {
		let Some(reader) = self.lookup(handle)? else {
			return Ok(None);
		};
		let mut cursor = reader.lock_cursor().await?;

		match reader.state() {
			ReaderState::Exhausted => return Ok(None),
			ReaderState::Closed => return Err(Error::closed(handle)),
			ReaderState::Active => {}
		}

		let frame = reader.next_frame(&mut cursor).await?;
		self.settle(&reader, &mut cursor, frame)
	}

	/// Takes every chunk already buffered, waiting for one frame only if none is.
	pub async fn pull_available(&self, handle: ReaderHandle) -> Result<ReadBatch> {
		let Some(reader) = self.lookup(handle)? else {
			return Ok(ReadBatch {
				chunks: Vec::new(),
				finished: true,
			});
		};
		let mut cursor = reader.lock_cursor().await?;

		match reader.state() {
			ReaderState::Exhausted => {
				return Ok(ReadBatch {
					chunks: Vec::new(),
					finished: true,
				});
			}
			ReaderState::Closed => return Err(Error::closed(handle)),
			ReaderState::Active => {}
		}

		let mut chunks = Vec::new();
		while let Some(frame) = cursor.try_next() {
			match frame {
				Frame::Data(chunk) => chunks.push(chunk),
				Frame::End => {
					self.exhaust(&reader, &mut cursor);
					return Ok(ReadBatch { chunks, finished: true });
				}
				Frame::Error(message) if chunks.is_empty() => {
					self.retire(handle);
					return Err(Error::TransportFailure(message));
				}
				error @ Frame::Error(_) => {
					cursor.held = Some(error);
					break;
				}
			}
		}
		if !chunks.is_empty() {
			trace!(target: "loper::query", %handle, count = chunks.len(), "drained buffered chunks");
			return Ok(ReadBatch { chunks, finished: false });
		}

		let frame = reader.next_frame(&mut cursor).await?;
		Ok(match self.settle(&reader, &mut cursor, frame)? {
			Some(chunk) => ReadBatch {
				chunks: vec![chunk],
				finished: false,
			},
			None => ReadBatch {
				chunks: Vec::new(),
				finished: true,
			},
		})
	}

	/// Closes a reader. Never fails; unknown handles are ignored.
	pub fn close(&self, handle: ReaderHandle) {
		match detach_reader(&self.registry, handle) {
			Some(reader) => {
				if let Ok(session) = self.registry.sessions.resolve(reader.session) {
					session.forget_reader(handle);
				}
			}
			None if self.registry.exhausted.remove(&handle).is_some() => {
				trace!(target: "loper::query", %handle, "exhausted reader closed");
			}
			None => trace!(target: "loper::query", %handle, "close of unknown reader ignored"),
		}
	}

	/// Returns the lifecycle state of a reader that is live or exhausted.
	pub fn state(&self, handle: ReaderHandle) -> Result<ReaderState> {
		Ok(match self.lookup(handle)? {
			Some(reader) => reader.state(),
			None => ReaderState::Exhausted,
		})
	}

	/// Resolves a reader; `None` means it ended and was released already.
	fn lookup(&self, handle: ReaderHandle) -> Result<Option<Arc<ReaderEntry>>> {
		match self.registry.readers.resolve(handle) {
			Ok(reader) => Ok(Some(reader)),
			Err(_) if self.registry.exhausted.contains(&handle) => Ok(None),
			Err(err) => Err(err),
		}
	}

	/// Marks the reader exhausted and releases its handle.
	///
	/// The marker is only recorded while the session is open, under the
	/// session lock, so a concurrent session close always clears it.
	fn exhaust(&self, reader: &ReaderEntry, cursor: &mut Cursor) {
		if !reader.exhaust(cursor) {
			return;
		}
		let Ok(session) = self.registry.sessions.resolve(reader.session) else {
			return;
		};
		let mut inner = session.inner.lock();
		if inner.state != SessionState::Open {
			return;
		}
		// Marker first, so no pull sees the handle as neither live nor exhausted.
		self.registry.exhausted.insert(reader.handle);
		if self.registry.readers.release(reader.handle).is_none() {
			// Closed concurrently.
			self.registry.exhausted.remove(&reader.handle);
			return;
		}
		inner.readers.retain(|r| *r != reader.handle);
		inner.exhausted.push(reader.handle);
		debug!(target: "loper::query", handle = %reader.handle, session = %reader.session, "reader exhausted");
	}

	fn settle(&self, reader: &ReaderEntry, cursor: &mut Cursor, frame: Frame) -> Result<Option<Bytes>> {
		match frame {
			Frame::Data(chunk) => {
				trace!(target: "loper::query", handle = %reader.handle, len = chunk.len(), "chunk delivered");
				Ok(Some(chunk))
			}
			Frame::End => {
				self.exhaust(reader, cursor);
				Ok(None)
			}
			Frame::Error(message) => {
				self.retire(reader.handle);
				Err(Error::TransportFailure(message))
			}
		}
	}

	fn retire(&self, handle: ReaderHandle) {
		self.close(handle);
	}

	fn open_session(&self, handle: SessionHandle, operation: &'static str) -> Result<Arc<SessionEntry>> {
		match self.registry.sessions.resolve(handle) {
			Ok(entry) if entry.is_open() => Ok(entry),
			Ok(_) => Err(Error::illegal_state(handle, operation)),
			Err(_) if self.registry.sessions.was_released(handle) => Err(Error::illegal_state(handle, operation)),
			Err(err) => Err(err),
		}
	}
}

/// Forwards frames from the transport to the reader until a terminal frame or cancellation.
async fn pump(handle: ReaderHandle, mut frames: FrameStream, tx: mpsc::Sender<Frame>, cancel: CancellationToken) {
	loop {
		let frame = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			frame = frames.next() => frame.unwrap_or(Frame::End),
		};
		let terminal = !matches!(frame, Frame::Data(_));

		let sent = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			sent = tx.send(frame) => sent.is_ok(),
		};
		if !sent || terminal {
			break;
		}
	}
	trace!(target: "loper::query", %handle, cancelled = cancel.is_cancelled(), "stream pump finished");
}
