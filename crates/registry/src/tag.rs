//! Capability tags.
//!
//! Tags replace interface introspection: a registration is keyed by an
//! explicit `(tag, name)` pair. Named tags compare by name and therefore
//! survive a store/reload cycle. Anonymous tags only carry a process-local
//! number; they are useful as throwaway markers but are rejected as
//! registration keys.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

static NEXT_ANONYMOUS: AtomicU64 = AtomicU64::new(1);

/// Overlay templates are registered as utilities providing this tag, named
/// after their host.
pub static COMPONENTS: LazyLock<Tag> = LazyLock::new(|| Tag::named("IComponents"));

/// Fired after a registration is installed.
pub static REGISTERED: LazyLock<Tag> = LazyLock::new(|| Tag::named("IRegistered"));

/// Fired after a registration is removed.
pub static UNREGISTERED: LazyLock<Tag> = LazyLock::new(|| Tag::named("IUnregistered"));

/// Identifies what a component provides.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
	/// A declared tag, identified by its name.
	Named(Arc<str>),
	/// A process-local marker with no stable identity.
	Anonymous(u64),
}

impl Tag {
	/// Declares a named tag.
	pub fn named(name: impl Into<Arc<str>>) -> Self {
		Self::Named(name.into())
	}

	/// Creates a fresh anonymous tag, distinct from every other tag.
	pub fn anonymous() -> Self {
		Self::Anonymous(NEXT_ANONYMOUS.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns the declared name, if any.
	pub fn name(&self) -> Option<&str> {
		match self {
			Self::Named(name) => Some(&**name),
			Self::Anonymous(_) => None,
		}
	}

	pub fn is_anonymous(&self) -> bool {
		matches!(self, Self::Anonymous(_))
	}

	/// Fails with [`RegistryError::UnsupportedTag`] unless the tag can key a map.
	pub(crate) fn check(&self) -> Result<()> {
		match self {
			Self::Named(_) => Ok(()),
			Self::Anonymous(_) => Err(RegistryError::UnsupportedTag(self.clone())),
		}
	}
}

impl From<&str> for Tag {
	fn from(name: &str) -> Self {
		Self::named(name)
	}
}

impl fmt::Display for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Named(name) => f.write_str(name),
			Self::Anonymous(n) => write!(f, "<anonymous #{n}>"),
		}
	}
}

impl fmt::Debug for Tag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Tag({self})")
	}
}
