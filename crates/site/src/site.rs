//! Sites and the records that point at them.
//!
//! # Role
//!
//! A [`Site`] is a named position in the persisted layout that owns one
//! [`Registry`]. A site met during traversal may be wrapped in a façade that
//! reports a composed registry in place of its own; everything else is read
//! from the wrapped site.
//!
//! # Invariants
//!
//! - Identity ([`Site::same`]) ignores the façade: a traversed site is the
//!   same site as the one it wraps.
//! - Transient sites and façades are never written to the store.

use std::fmt;
use std::sync::{Arc, LazyLock};

use hostsite_registry::{Component, Registry, Tag};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};
use crate::tree::SiteTree;

/// [`SiteMapping`] records are registered as utilities providing this tag,
/// named after their source host.
pub static SITE_MAPPING: LazyLock<Tag> = LazyLock::new(|| Tag::named("ISiteMapping"));

/// Notified through the global registry when synchronization creates a site.
/// Handlers receive a [`NewLocalSite`].
pub static NEW_LOCAL_SITE: LazyLock<Tag> = LazyLock::new(|| Tag::named("INewLocalSite"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
	/// The root folder of the persisted layout.
	Root,
	/// The main application folder holding the site tree.
	MainApplication,
	/// A persistent site in the site tree mirroring one overlay template.
	HostPolicy,
	/// Synthesized by host name lookup; exists only in memory.
	Transient,
	/// Any other site.
	Local,
}

impl SiteKind {
	/// Sentinel sites never become the current site during traversal.
	pub fn is_sentinel(self) -> bool {
		matches!(self, Self::Root | Self::MainApplication)
	}
}

#[derive(Debug)]
struct SiteInner {
	name: Arc<str>,
	kind: SiteKind,
	registry: Registry,
	parent: Option<Site>,
}

#[derive(Clone)]
pub struct Site {
	inner: Arc<SiteInner>,
	/// Registry reported by a traversal façade instead of the site's own.
	composed: Option<Registry>,
}

impl Site {
	pub fn new(name: impl Into<Arc<str>>, kind: SiteKind, registry: Registry, parent: Option<Site>) -> Self {
		Self {
			inner: Arc::new(SiteInner {
				name: name.into(),
				kind,
				registry,
				parent,
			}),
			composed: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn kind(&self) -> SiteKind {
		self.inner.kind
	}

	/// The registry lookups go through: the composed one for a façade, the
	/// site's own otherwise.
	pub fn registry(&self) -> &Registry {
		self.composed.as_ref().unwrap_or(&self.inner.registry)
	}

	pub fn own_registry(&self) -> &Registry {
		&self.inner.registry
	}

	pub fn parent(&self) -> Option<&Site> {
		self.inner.parent.as_ref()
	}

	pub fn is_traversed(&self) -> bool {
		self.composed.is_some()
	}

	/// The site behind a traversal façade.
	pub fn unwrapped(&self) -> Site {
		Self {
			inner: Arc::clone(&self.inner),
			composed: None,
		}
	}

	/// Wraps this site in a façade reporting `registry`.
	pub(crate) fn traversed(&self, registry: Registry) -> Site {
		Self {
			inner: Arc::clone(&self.inner),
			composed: Some(registry),
		}
	}

	pub fn same(&self, other: &Site) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// # Errors
	///
	/// [`SiteError::TransientSite`] for transient sites and traversal façades.
	pub fn ensure_persistable(&self) -> Result<()> {
		if self.kind() == SiteKind::Transient || self.is_traversed() {
			return Err(SiteError::TransientSite {
				name: self.name().to_string(),
			});
		}
		Ok(())
	}
}

impl fmt::Debug for Site {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Site")
			.field("name", &self.inner.name)
			.field("kind", &self.inner.kind)
			.field("registry", self.registry())
			.field("traversed", &self.is_traversed())
			.finish()
	}
}

/// Payload of [`NEW_LOCAL_SITE`] notifications.
#[derive(Debug, Clone)]
pub struct NewLocalSite {
	pub site: Site,
}

/// Redirects lookups for one host name to another.
///
/// Mappings are looked up once; a target that is itself mapped is not
/// followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMapping {
	pub source_name: String,
	pub target_name: String,
}

impl SiteMapping {
	pub fn new(source_name: impl Into<String>, target_name: impl Into<String>) -> Self {
		Self {
			source_name: source_name.into(),
			target_name: target_name.into(),
		}
	}

	/// Registers the mapping in `registry` under its source name.
	pub fn register(&self, registry: &Registry) -> Result<()> {
		registry.register_utility(Component::object(self.clone()), &SITE_MAPPING, &self.source_name)?;
		Ok(())
	}

	/// The mapping registered for `name` along `registry`'s resolution order.
	pub fn query(registry: &Registry, name: &str) -> Result<Option<SiteMapping>> {
		Ok(registry
			.query_utility(&SITE_MAPPING, name)?
			.and_then(|c| c.downcast_ref::<SiteMapping>().cloned()))
	}

	/// The persistent site the mapping points at.
	///
	/// # Errors
	///
	/// [`SiteError::SiteNotFound`] if the tree has no such site.
	pub fn target_site(&self, tree: &SiteTree) -> Result<Site> {
		tree.get(&self.target_name)
			.cloned()
			.ok_or_else(|| SiteError::SiteNotFound {
				name: self.target_name.clone(),
			})
	}
}
