use thiserror::Error;

use crate::store::Oid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
	/// Another transaction committed a change to `oid` first.
	#[error("conflicting write to object {oid}")]
	Conflict { oid: Oid },
	#[error("object {oid} does not exist")]
	MissingObject { oid: Oid },
	#[error("store is closed")]
	Closed,
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
