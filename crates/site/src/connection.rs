//! The persisted layout, opened inside one store transaction.
//!
//! # Role
//!
//! ```text
//! ROOT_OID ──▶ root folder registry          (bases: global root)
//!               └── main application folder  (bases: root folder)
//!                    └── site tree ──▶ host name ──▶ host site registry
//! ```
//!
//! A [`Connection`] loads that layout, hands out [`Site`]s whose registries
//! are restored from their records, and writes every created or modified
//! registry back on [`Connection::commit`].
//!
//! # Invariants
//!
//! - Each stored registry is restored at most once per connection, so
//!   registries compare by identity within a connection.
//! - Record bases resolve to the registries of this connection or, for
//!   global bases, to the global root and the overlay templates registered
//!   in it.
//! - Nothing reaches the store before [`Connection::commit`]; dropping the
//!   connection aborts.

use std::sync::Arc;

use hostsite_registry::{BaseRef, COMPONENTS, Registry, RegistryRecord};
use hostsite_store::{Oid, ROOT_OID, Store, Transaction};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::config::SiteConfig;
use crate::error::{Result, SiteError};
use crate::lookup;
use crate::site::{Site, SiteKind};
use crate::tree::{SiteTree, SiteTreeRecord};

/// Name of the root folder and its registry.
pub const ROOT_FOLDER: &str = "root";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FolderRef {
	name: String,
	oid: Oid,
}

/// Stored at [`ROOT_OID`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RootRecord {
	root_folder: Oid,
	main_folder: Option<FolderRef>,
	site_tree: Option<FolderRef>,
}

pub struct Connection {
	txn: Transaction,
	globals: Registry,
	config: Arc<SiteConfig>,
	registries: FxHashMap<Oid, Registry>,
	created: FxHashSet<Oid>,
	root: Option<Site>,
	main: Option<Site>,
	tree: Option<SiteTree>,
	layout_dirty: bool,
}

impl Connection {
	/// Begins a transaction on `store` and loads whatever part of the layout
	/// exists.
	pub fn open(store: &Store, globals: Registry, config: Arc<SiteConfig>) -> Result<Self> {
		let mut conn = Self {
			txn: store.begin()?,
			globals,
			config,
			registries: FxHashMap::default(),
			created: FxHashSet::default(),
			root: None,
			main: None,
			tree: None,
			layout_dirty: false,
		};
		conn.load_layout()?;
		Ok(conn)
	}

	fn load_layout(&mut self) -> Result<()> {
		let Some(bytes) = self.txn.read(ROOT_OID) else {
			return Ok(());
		};
		let record: RootRecord = postcard::from_bytes(&bytes)?;

		let root = Site::new(ROOT_FOLDER, SiteKind::Root, self.load_registry(record.root_folder)?, None);
		self.root = Some(root.clone());

		let Some(main_ref) = record.main_folder else {
			return Ok(());
		};
		let main = Site::new(
			main_ref.name,
			SiteKind::MainApplication,
			self.load_registry(main_ref.oid)?,
			Some(root),
		);
		self.main = Some(main.clone());

		let Some(tree_ref) = record.site_tree else {
			return Ok(());
		};
		let tree_record: SiteTreeRecord = postcard::from_bytes(&self.txn.load(tree_ref.oid)?)?;
		let mut sites = IndexMap::with_capacity(tree_record.sites.len());
		for (name, oid) in tree_record.sites {
			let registry = self.load_registry(oid)?;
			let site = Site::new(name.as_str(), SiteKind::HostPolicy, registry, Some(main.clone()));
			sites.insert(name, site);
		}
		tracing::debug!(sites = sites.len(), tree = %tree_ref.name, "loaded site tree");
		self.tree = Some(SiteTree::restored(
			tree_ref.name,
			tree_ref.oid,
			tree_record.last_synchronized,
			sites,
		));
		Ok(())
	}

	/// Restores the registry stored at `oid`, with its persistent bases.
	pub fn load_registry(&mut self, oid: Oid) -> Result<Registry> {
		if let Some(registry) = self.registries.get(&oid) {
			return Ok(registry.clone());
		}
		let record = RegistryRecord::decode(&self.txn.load(oid)?)?;
		let mut bases = Vec::with_capacity(record.bases.len());
		for base in &record.bases {
			bases.push(match base {
				BaseRef::Persistent(base_oid) => self.load_registry(*base_oid)?,
				BaseRef::Global(name) => self.resolve_global(name)?,
			});
		}
		let registry = Registry::restore(record, bases, self.config.storage_config(), oid);
		self.registries.insert(oid, registry.clone());
		Ok(registry)
	}

	/// The global root itself, or an overlay template registered in it.
	fn resolve_global(&self, name: &str) -> Result<Registry> {
		if self.globals.name() == name {
			return Ok(self.globals.clone());
		}
		self.globals
			.query_utility(&COMPONENTS, name)?
			.and_then(|c| c.as_registry().cloned())
			.ok_or_else(|| SiteError::UnknownGlobal { name: name.to_string() })
	}

	pub fn globals(&self) -> &Registry {
		&self.globals
	}

	pub fn config(&self) -> &SiteConfig {
		&self.config
	}

	pub fn transaction(&mut self) -> &mut Transaction {
		&mut self.txn
	}

	pub fn root_site(&self) -> Option<&Site> {
		self.root.as_ref()
	}

	pub fn main_site(&self) -> Option<&Site> {
		self.main.as_ref()
	}

	pub fn site_tree(&self) -> Option<&SiteTree> {
		self.tree.as_ref()
	}

	pub fn require_main_site(&self) -> Result<&Site> {
		self.main.as_ref().ok_or(SiteError::MissingLayout {
			what: "main application folder",
		})
	}

	pub fn require_tree(&self) -> Result<&SiteTree> {
		self.tree.as_ref().ok_or(SiteError::MissingLayout { what: "site tree" })
	}

	pub(crate) fn require_tree_mut(&mut self) -> Result<&mut SiteTree> {
		self.tree.as_mut().ok_or(SiteError::MissingLayout { what: "site tree" })
	}

	/// Creates whatever part of the layout is missing. Returns whether
	/// anything was created.
	pub fn install_site_tree_root(&mut self) -> Result<bool> {
		let mut created = false;
		let root = match self.root.clone() {
			Some(root) => root,
			None => {
				let registry = self.create_registry(ROOT_FOLDER, vec![self.globals.clone()])?;
				let root = Site::new(ROOT_FOLDER, SiteKind::Root, registry, None);
				self.root = Some(root.clone());
				created = true;
				root
			}
		};
		if self.main.is_none() {
			let name = self.config.layout.main_folder.clone();
			let registry = self.create_registry(&name, vec![root.registry().clone()])?;
			self.main = Some(Site::new(name, SiteKind::MainApplication, registry, Some(root)));
			created = true;
		}
		if self.tree.is_none() {
			let oid = self.txn.new_oid();
			self.tree = Some(SiteTree::new(self.config.layout.site_tree.clone(), oid));
			created = true;
		}
		if created {
			self.layout_dirty = true;
			tracing::info!(
				main = %self.config.layout.main_folder,
				tree = %self.config.layout.site_tree,
				"installed site tree root"
			);
		}
		Ok(created)
	}

	/// Creates a persistent registry to be written on commit.
	pub fn create_registry(&mut self, name: &str, bases: Vec<Registry>) -> Result<Registry> {
		let registry = Registry::builder(name)
			.persistent()
			.storage(self.config.storage_config())
			.bases(bases)
			.build()?;
		let oid = self.txn.new_oid();
		registry.assign_oid(oid);
		self.registries.insert(oid, registry.clone());
		self.created.insert(oid);
		Ok(registry)
	}

	/// Creates a host site with a new persistent registry and adds it to the
	/// site tree, replacing any site of the same name.
	pub fn create_host_site(&mut self, name: &str, bases: Vec<Registry>) -> Result<Site> {
		let main = self.require_main_site()?.clone();
		self.require_tree()?;
		let registry = self.create_registry(name, bases)?;
		let site = Site::new(name, SiteKind::HostPolicy, registry, Some(main));
		self.require_tree_mut()?.insert(site.clone())?;
		Ok(site)
	}

	/// Adds an existing site to the site tree.
	///
	/// # Errors
	///
	/// [`SiteError::TransientSite`] for transient sites and façades, which
	/// have no stored form.
	pub fn insert_host_site(&mut self, site: Site) -> Result<()> {
		site.ensure_persistable()?;
		let tracked = site
			.registry()
			.oid()
			.is_some_and(|oid| self.registries.get(&oid) == Some(site.registry()));
		if !tracked {
			return Err(SiteError::TransientSite {
				name: site.name().to_string(),
			});
		}
		self.require_tree_mut()?.insert(site)
	}

	/// Removes a host site and the overlay registration named after it.
	///
	/// Only a registration held by the main application folder's own
	/// registry is removed, so the change commits or aborts with this
	/// connection. Global templates are never touched: stored records may
	/// still name them as bases. A site without such a registration is
	/// removed all the same.
	pub fn remove_host_site(&mut self, name: &str) -> Result<Option<Site>> {
		let main = self.require_main_site()?.clone();
		let Some(removed) = self.require_tree_mut()?.remove(name) else {
			return Ok(None);
		};
		tracing::info!(site = %name, "removed host site");

		if main.registry().unregister_utility(None, &COMPONENTS, name)? {
			tracing::debug!(site = %name, registry = %main.registry(), "unregistered host overlay");
		}
		Ok(Some(removed))
	}

	/// Resolves host names to a site, falling back to the main application
	/// folder. See [`lookup::get_site_for_site_names`].
	pub fn site_for_names(&self, names: &[&str]) -> Result<Site> {
		lookup::get_site_for_site_names(names, self.require_main_site()?, self.tree.as_ref())
	}

	/// Writes every created or modified registry, the site tree and the
	/// layout, then commits. Returns the commit number, or `None` when nothing
	/// changed.
	pub fn commit(mut self) -> Result<Option<u64>> {
		let mut written = 0;
		for (oid, registry) in &self.registries {
			let created = self.created.contains(oid);
			if registry.take_dirty() || created {
				let bytes = registry.to_record()?.encode()?;
				self.txn.write(*oid, bytes);
				written += 1;
			}
		}
		if let Some(tree) = self.tree.as_mut()
			&& tree.take_dirty()
		{
			let bytes = postcard::to_stdvec(&tree.record()?)?;
			self.txn.write(tree.oid(), bytes);
		}
		if self.layout_dirty {
			let record = self.root_record()?;
			self.txn.write(ROOT_OID, postcard::to_stdvec(&record)?);
		}

		let commit = self.txn.commit()?;
		tracing::debug!(registries = written, ?commit, "connection committed");
		Ok(commit)
	}

	/// Discards every change made through this connection.
	pub fn abort(self) {
		self.txn.abort();
	}

	fn root_record(&self) -> Result<RootRecord> {
		let oid_of = |site: &Site| {
			site.registry().oid().ok_or_else(|| SiteError::TransientSite {
				name: site.name().to_string(),
			})
		};
		let root = self.root.as_ref().ok_or(SiteError::MissingLayout { what: "root folder" })?;
		Ok(RootRecord {
			root_folder: oid_of(root)?,
			main_folder: self
				.main
				.as_ref()
				.map(|main| oid_of(main).map(|oid| FolderRef { name: main.name().to_string(), oid }))
				.transpose()?,
			site_tree: self.tree.as_ref().map(|tree| FolderRef {
				name: tree.name().to_string(),
				oid: tree.oid(),
			}),
		})
	}
}
