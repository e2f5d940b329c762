//! Transactional object store used by persistent sites.
//!
//! Objects are opaque byte blobs addressed by [`Oid`]. Each committed object
//! carries a version. Transactions validate optimistically: reads and writes
//! record the version they observed, and [`Transaction::commit`] fails with
//! [`StoreError::Conflict`] when any written object moved in the meantime.
//! The caller reruns the whole unit of work, usually through
//! [`TransactionLoop`].

pub mod error;
mod retry;
mod store;
mod transaction;

pub use error::{Result, StoreError};
pub use retry::{Retryable, TransactionLoop};
pub use store::{Oid, ROOT_OID, Store};
pub use transaction::Transaction;
