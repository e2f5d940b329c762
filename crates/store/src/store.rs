use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{Result, StoreError};
use crate::transaction::Transaction;

/// Store object id.
pub type Oid = u64;

/// The well-known root object. [`Transaction::new_oid`] never hands it out.
pub const ROOT_OID: Oid = 0;

#[derive(Debug, Clone)]
pub(crate) struct Committed {
	pub version: u64,
	/// Commit number that wrote this version.
	pub commit: u64,
	pub bytes: Arc<[u8]>,
}

#[derive(Debug)]
pub(crate) struct StoreInner {
	pub objects: Mutex<FxHashMap<Oid, Committed>>,
	next_oid: AtomicU64,
	closed: AtomicBool,
	commits: AtomicU64,
}

/// Shared handle to an in-memory object store.
#[derive(Debug, Clone)]
pub struct Store(pub(crate) Arc<StoreInner>);

impl Default for Store {
	fn default() -> Self {
		Self::new()
	}
}

impl Store {
	pub fn new() -> Self {
		Self(Arc::new(StoreInner {
			objects: Mutex::new(FxHashMap::default()),
			next_oid: AtomicU64::new(ROOT_OID + 1),
			closed: AtomicBool::new(false),
			commits: AtomicU64::new(0),
		}))
	}

	/// Starts a transaction.
	///
	/// # Errors
	///
	/// [`StoreError::Closed`] once [`Store::close`] was called.
	pub fn begin(&self) -> Result<Transaction> {
		self.check_open()?;
		Ok(Transaction::new(self.clone()))
	}

	/// Refuses new transactions and commits. Committed data stays readable
	/// through transactions that were already open.
	pub fn close(&self) {
		if !self.0.closed.swap(true, Ordering::AcqRel) {
			tracing::debug!(commits = self.commits(), "store closed");
		}
	}

	pub fn is_closed(&self) -> bool {
		self.0.closed.load(Ordering::Acquire)
	}

	/// Number of committed objects.
	pub fn len(&self) -> usize {
		self.0.objects.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Committed version of `oid`, if it exists.
	pub fn version(&self, oid: Oid) -> Option<u64> {
		self.0.objects.lock().get(&oid).map(|c| c.version)
	}

	/// Number of successful commits that wrote something.
	pub fn commits(&self) -> u64 {
		self.0.commits.load(Ordering::Relaxed)
	}

	pub(crate) fn check_open(&self) -> Result<()> {
		if self.is_closed() {
			return Err(StoreError::Closed);
		}
		Ok(())
	}

	pub(crate) fn allocate(&self) -> Oid {
		self.0.next_oid.fetch_add(1, Ordering::Relaxed)
	}

	/// Must be called with the object lock held.
	pub(crate) fn record_commit(&self) -> u64 {
		self.0.commits.fetch_add(1, Ordering::Relaxed) + 1
	}
}
