use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use loper_protocol::ReaderHandle;
use loper_runtime::{Bridge, ReadBatch, Result};

/// Result chunks of one query, pulled on demand.
///
/// Dropping the stream closes its reader, cancelling the query if it is
/// still producing.
pub struct QueryStream {
	bridge: Arc<Bridge>,
	handle: ReaderHandle,
}

impl QueryStream {
	pub(crate) fn new(bridge: Arc<Bridge>, handle: ReaderHandle) -> Self {
		Self { bridge, handle }
	}

	pub fn handle(&self) -> ReaderHandle {
		self.handle
	}

	/// Next chunk in arrival order, or `None` once the result has ended.
	pub async fn next(&mut self) -> Result<Option<Bytes>> {
		self.bridge.pull(self.handle).await
	}

	/// Every chunk already received, waiting only if there is none yet.
	pub async fn next_batch(&mut self) -> Result<ReadBatch> {
		self.bridge.pull_available(self.handle).await
	}

	/// Reads the remaining chunks.
	pub async fn collect_chunks(&mut self) -> Result<Vec<Bytes>> {
		let mut chunks = Vec::new();
		while let Some(chunk) = self.next().await? {
			chunks.push(chunk);
		}
		Ok(chunks)
	}

	/// Closes the reader. Closing twice is harmless.
	pub fn close(&self) {
		self.bridge.close_reader(self.handle);
	}

	/// Adapts the stream into a [`Stream`] that ends after the last chunk or the first error.
	pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
		stream::unfold(Some(self), |state| async move {
			let Some(mut query) = state else {
				return None;
			};
			match query.next().await {
				Ok(Some(chunk)) => Some((Ok(chunk), Some(query))),
				Ok(None) => None,
				Err(err) => Some((Err(err), None)),
			}
		})
	}
}

impl Drop for QueryStream {
	fn drop(&mut self) {
		tracing::trace!(target: "loper::query", handle = %self.handle, "query stream dropped");
		self.bridge.close_reader(self.handle);
	}
}

impl std::fmt::Debug for QueryStream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("QueryStream").field("handle", &self.handle).finish()
	}
}
