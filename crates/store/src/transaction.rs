//! Optimistic transactions over a [`Store`].
//!
//! # Invariants
//!
//! - The first read of an object pins the version observed at that moment
//!   (`None` when the object did not exist).
//! - An object written without being read first is checked against the
//!   start of the transaction: any commit to it after `begin` conflicts.
//! - Commit re-checks every written object under the store lock and applies
//!   all writes or none.
//! - Dropping a transaction that was not committed discards its writes.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Result, StoreError};
use crate::store::{Committed, Oid, Store};

pub struct Transaction {
	store: Store,
	begun_at: u64,
	observed: FxHashMap<Oid, Option<u64>>,
	writes: FxHashMap<Oid, Arc<[u8]>>,
	allocated: FxHashSet<Oid>,
	finished: bool,
}

impl Transaction {
	pub(crate) fn new(store: Store) -> Self {
		Self {
			begun_at: store.commits(),
			store,
			observed: FxHashMap::default(),
			writes: FxHashMap::default(),
			allocated: FxHashSet::default(),
			finished: false,
		}
	}

	pub fn store(&self) -> &Store {
		&self.store
	}

	/// Reads an object, seeing this transaction's own writes first.
	pub fn read(&mut self, oid: Oid) -> Option<Arc<[u8]>> {
		if let Some(bytes) = self.writes.get(&oid) {
			return Some(Arc::clone(bytes));
		}
		let objects = self.store.0.objects.lock();
		let committed = objects.get(&oid);
		self.observed.entry(oid).or_insert(committed.map(|c| c.version));
		committed.map(|c| Arc::clone(&c.bytes))
	}

	/// Like [`Transaction::read`], failing with [`StoreError::MissingObject`].
	pub fn load(&mut self, oid: Oid) -> Result<Arc<[u8]>> {
		self.read(oid).ok_or(StoreError::MissingObject { oid })
	}

	/// Buffers a write until commit.
	pub fn write(&mut self, oid: Oid, bytes: impl Into<Arc<[u8]>>) {
		self.writes.insert(oid, bytes.into());
	}

	/// Allocates an id for an object created by this transaction.
	pub fn new_oid(&mut self) -> Oid {
		let oid = self.store.allocate();
		self.allocated.insert(oid);
		self.observed.insert(oid, None);
		oid
	}

	/// Objects written so far.
	pub fn pending_writes(&self) -> usize {
		self.writes.len()
	}

	/// Applies every buffered write, returning the commit number, or `None`
	/// when there was nothing to write.
	///
	/// # Errors
	///
	/// - [`StoreError::Conflict`] if a written object changed since it was
	///   first read here or, if it was never read, since the transaction
	///   began. Nothing is applied.
	/// - [`StoreError::Closed`] if the store was closed.
	pub fn commit(mut self) -> Result<Option<u64>> {
		self.finished = true;
		self.store.check_open()?;
		if self.writes.is_empty() {
			return Ok(None);
		}

		let mut objects = self.store.0.objects.lock();
		for oid in self.writes.keys() {
			let current = objects.get(oid);
			let conflict = match self.observed.get(oid) {
				Some(pinned) => *pinned != current.map(|c| c.version),
				None => current.is_some_and(|c| c.commit > self.begun_at),
			};
			if conflict {
				tracing::debug!(oid, begun_at = self.begun_at, "commit validation failed");
				return Err(StoreError::Conflict { oid: *oid });
			}
		}
		let commit = self.store.record_commit();
		for (oid, bytes) in self.writes.drain() {
			let version = objects.get(&oid).map_or(1, |c| c.version + 1);
			objects.insert(oid, Committed { version, commit, bytes });
		}
		drop(objects);

		tracing::debug!(commit, objects = self.observed.len(), "transaction committed");
		Ok(Some(commit))
	}

	/// Discards every buffered write.
	pub fn abort(mut self) {
		self.finished = true;
		tracing::debug!(writes = self.writes.len(), "transaction aborted");
	}
}

impl Drop for Transaction {
	fn drop(&mut self) {
		if !self.finished && !self.writes.is_empty() {
			tracing::debug!(writes = self.writes.len(), "transaction dropped without commit");
		}
	}
}
