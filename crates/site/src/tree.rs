//! The persistent site tree: host name to [`SiteKind::HostPolicy`] site.

use hostsite_store::Oid;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};
use crate::site::Site;

/// Stored form of a [`SiteTree`]: each site by the oid of its registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SiteTreeRecord {
	pub last_synchronized: u64,
	pub sites: IndexMap<String, Oid>,
}

#[derive(Debug, Clone)]
pub struct SiteTree {
	name: String,
	oid: Oid,
	last_synchronized: u64,
	sites: IndexMap<String, Site>,
	dirty: bool,
}

impl SiteTree {
	pub(crate) fn new(name: impl Into<String>, oid: Oid) -> Self {
		Self {
			name: name.into(),
			oid,
			last_synchronized: 0,
			sites: IndexMap::new(),
			dirty: true,
		}
	}

	pub(crate) fn restored(name: impl Into<String>, oid: Oid, last_synchronized: u64, sites: IndexMap<String, Site>) -> Self {
		Self {
			name: name.into(),
			oid,
			last_synchronized,
			sites,
			dirty: false,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn oid(&self) -> Oid {
		self.oid
	}

	/// Seconds since the Unix epoch at the end of the last synchronization,
	/// or 0 if it never ran.
	pub fn last_synchronized(&self) -> u64 {
		self.last_synchronized
	}

	pub fn len(&self) -> usize {
		self.sites.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sites.is_empty()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.sites.contains_key(name)
	}

	pub fn get(&self, name: &str) -> Option<&Site> {
		self.sites.get(name)
	}

	/// Sites in insertion order.
	pub fn sites(&self) -> impl Iterator<Item = &Site> {
		self.sites.values()
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.sites.keys().map(String::as_str)
	}

	/// Fetches a site by name.
	///
	/// With `safe`, a missing name gives `Ok(None)`; otherwise it fails with
	/// [`SiteError::SiteNotFound`].
	pub fn get_host_site(&self, name: &str, safe: bool) -> Result<Option<Site>> {
		match self.sites.get(name) {
			Some(site) => Ok(Some(site.clone())),
			None if safe => Ok(None),
			None => Err(SiteError::SiteNotFound { name: name.to_string() }),
		}
	}

	pub(crate) fn insert(&mut self, site: Site) -> Result<()> {
		site.ensure_persistable()?;
		self.sites.insert(site.name().to_string(), site);
		self.dirty = true;
		Ok(())
	}

	pub(crate) fn remove(&mut self, name: &str) -> Option<Site> {
		let removed = self.sites.shift_remove(name);
		self.dirty |= removed.is_some();
		removed
	}

	pub(crate) fn mark_synchronized(&mut self, at: u64) {
		self.last_synchronized = at;
		self.dirty = true;
	}

	pub(crate) fn take_dirty(&mut self) -> bool {
		std::mem::take(&mut self.dirty)
	}

	pub(crate) fn record(&self) -> Result<SiteTreeRecord> {
		let mut sites = IndexMap::with_capacity(self.sites.len());
		for (name, site) in &self.sites {
			let oid = site.registry().oid().ok_or_else(|| SiteError::TransientSite { name: name.clone() })?;
			sites.insert(name.clone(), oid);
		}
		Ok(SiteTreeRecord {
			last_synchronized: self.last_synchronized,
			sites,
		})
	}
}
