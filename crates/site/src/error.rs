use std::path::PathBuf;

use hostsite_registry::{RegistryError, Tag};
use hostsite_store::{Retryable, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error(transparent)]
	Store(#[from] StoreError),
	/// Traversal reached a site unrelated to the current one. Callers report
	/// it as not found.
	#[error("cannot traverse from site {current:?} into unrelated site {target:?}")]
	Navigation { current: String, target: String },
	#[error("site hooks are not installed on this thread")]
	ContextNotInstalled,
	#[error("no persistent site named {name:?}")]
	SiteNotFound { name: String },
	#[error("transient site {name:?} cannot be persisted")]
	TransientSite { name: String },
	#[error("persisted layout has no {what}")]
	MissingLayout { what: &'static str },
	#[error("no global registry named {name:?}")]
	UnknownGlobal { name: String },
	#[error("installed utility {name:?} is not the registered {provided} utility")]
	UtilityMismatch { name: String, provided: Tag },
	#[error("layout record: {0}")]
	Codec(#[from] postcard::Error),
	#[error("invalid configuration{}: {message}", .path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
	Config { path: Option<PathBuf>, message: String },
}

impl SiteError {
	/// Whether rerunning the whole unit of work may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Store(err) => err.is_retryable(),
			_ => false,
		}
	}
}

impl Retryable for SiteError {
	fn is_retryable(&self) -> bool {
		SiteError::is_retryable(self)
	}
}

pub type Result<T, E = SiteError> = std::result::Result<T, E>;
