//! Registry mapping opaque integer handles to host-owned resources.
//!
//! One [`HandleTable`] exists per [`HandleKind`](loper_protocol::HandleKind).
//! Values come from a monotonically increasing counter starting at 1, so a
//! released handle is never handed out again within a run. Entries live in a
//! [`DashMap`]; each mutation is a single map operation, so no partially
//! allocated entry is ever observable.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use loper_protocol::TypedHandle;

use crate::error::{Error, Result};

/// Thread-safe table of live resources of one kind.
pub struct HandleTable<H, T> {
	next: AtomicU32,
	entries: DashMap<u32, Arc<T>>,
	_kind: PhantomData<fn() -> H>,
}

impl<H: TypedHandle, T> Default for HandleTable<H, T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<H: TypedHandle, T> HandleTable<H, T> {
	pub fn new() -> Self {
		Self {
			next: AtomicU32::new(1),
			entries: DashMap::new(),
			_kind: PhantomData,
		}
	}

	/// Reserves the next handle and registers the resource built for it.
	pub fn allocate(&self, build: impl FnOnce(H) -> T) -> Result<(H, Arc<T>)> {
		let raw = self
			.next
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
			.map_err(|_| Error::HandlesExhausted(H::KIND))?;
		let handle = H::from_raw(raw);
		let resource = Arc::new(build(handle));
		self.entries.insert(raw, Arc::clone(&resource));
		Ok((handle, resource))
	}

	/// Looks up a live resource.
	pub fn resolve(&self, handle: H) -> Result<Arc<T>> {
		self.entries
			.get(&handle.raw())
			.map(|entry| Arc::clone(entry.value()))
			.ok_or_else(|| Error::invalid_handle(handle))
	}

	/// Removes the resource, returning it if this call released it.
	///
	/// Releasing an absent handle is a no-op.
	pub fn release(&self, handle: H) -> Option<Arc<T>> {
		self.entries.remove(&handle.raw()).map(|(_, resource)| resource)
	}

	/// Returns true if the handle was allocated in this run and has since been released.
	pub fn was_released(&self, handle: H) -> bool {
		let raw = handle.raw();
		raw != 0 && raw < self.next.load(Ordering::SeqCst) && !self.entries.contains_key(&raw)
	}

	/// Live handles in allocation order.
	pub fn handles(&self) -> Vec<H> {
		let mut handles: Vec<H> = self.entries.iter().map(|entry| H::from_raw(*entry.key())).collect();
		handles.sort();
		handles
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Moves the counter so the next allocation uses `next`.
	#[cfg(test)]
	pub(crate) fn skip_to(&self, next: u32) {
		self.next.store(next, Ordering::SeqCst);
	}
}
