//! Component registries with atomic snapshot publication.
//!
//! # Role
//!
//! A [`Registry`] is a named node in the base DAG. It owns its local
//! registrations and answers lookups by walking its
//! [resolution order](crate::order::resolution_order).
//!
//! # Invariants
//!
//! - Readers load an immutable [`RegistryState`] snapshot and never block.
//! - Writers clone the current snapshot, apply the change and publish it
//!   with compare-and-swap, retrying from the latest snapshot when another
//!   writer won first. A mutation that fails publishes nothing.
//! - Threshold conversion runs on the clone before publication, and only on
//!   live mutation paths. [`Registry::restore`] never converts.
//! - Registration events are delivered after publication. The handlers that
//!   receive them are resolved before publication so a handler lookup
//!   failure also fails the mutation.
//! - Equality and hashing are by identity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::error::{RegistryError, Result};
use crate::event::RegistrationEvent;
use crate::order::{self, OrderMemo};
use crate::table::{BucketKey, SubscriptionKey};
use crate::tag::Tag;

mod lookup;
pub(crate) mod maps;
mod next;


pub(crate) use maps::RegistryMaps;

/// Default size past which a map is converted to its ordered form.
pub const DEFAULT_THRESHOLD: usize = 30;

/// Conversion thresholds for the adaptive maps of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
	/// Bucket maps and the per-table bucket index.
	pub map_threshold: usize,
	/// The provided-tag index of each lookup table.
	pub provided_threshold: usize,
	/// Utility and adapter registration bookkeeping.
	pub registration_threshold: usize,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			map_threshold: DEFAULT_THRESHOLD,
			provided_threshold: DEFAULT_THRESHOLD,
			registration_threshold: DEFAULT_THRESHOLD,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryKind {
	/// Declared in process; never persisted.
	Global,
	/// Backed by the transactional store.
	Persistent,
	/// Synthesized in memory; persisting it is an error.
	Transient,
}

impl fmt::Display for RegistryKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Global => "global",
			Self::Persistent => "persistent",
			Self::Transient => "transient",
		})
	}
}

/// Process-unique registry identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(u64);

impl RegistryId {
	fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

/// Published registry contents.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegistryState {
	pub bases: Vec<Registry>,
	pub maps: RegistryMaps,
	/// Loaded from a record written before adaptive storage existed.
	pub needs_migration: bool,
}

pub(crate) struct RegistryInner {
	id: RegistryId,
	name: Arc<str>,
	kind: RegistryKind,
	reserved: bool,
	host_overlay: Option<Registry>,
	config: StorageConfig,
	state: ArcSwap<RegistryState>,
	order: ArcSwapOption<OrderMemo>,
	dirty: AtomicBool,
	oid: OnceLock<u64>,
}

/// Shared handle to a component registry.
#[derive(Clone)]
pub struct Registry(Arc<RegistryInner>);

/// Changes collected while a mutation runs.
#[derive(Default)]
pub(crate) struct Pending {
	events: Vec<RegistrationEvent>,
	touched: bool,
}

impl Pending {
	pub fn touch(&mut self) {
		self.touched = true;
	}

	pub fn fire(&mut self, event: RegistrationEvent) {
		self.touched = true;
		self.events.push(event);
	}
}

impl Registry {
	pub fn builder(name: impl Into<Arc<str>>) -> RegistryBuilder {
		RegistryBuilder::new(name)
	}

	/// A global registry with no bases.
	pub fn global(name: impl Into<Arc<str>>) -> Self {
		Self::from_parts(
			name.into(),
			RegistryKind::Global,
			false,
			None,
			StorageConfig::default(),
			RegistryState::default(),
		)
	}

	pub(crate) fn from_parts(
		name: Arc<str>,
		kind: RegistryKind,
		reserved: bool,
		host_overlay: Option<Registry>,
		config: StorageConfig,
		state: RegistryState,
	) -> Self {
		Self(Arc::new(RegistryInner {
			id: RegistryId::next(),
			name,
			kind,
			reserved,
			host_overlay,
			config,
			state: ArcSwap::from_pointee(state),
			order: ArcSwapOption::empty(),
			dirty: AtomicBool::new(false),
			oid: OnceLock::new(),
		}))
	}

	pub fn id(&self) -> RegistryId {
		self.0.id
	}

	pub fn name(&self) -> &str {
		&self.0.name
	}

	pub fn kind(&self) -> RegistryKind {
		self.0.kind
	}

	/// Whether the registry was declared as a reserved root of the overlay DAG.
	pub fn is_reserved(&self) -> bool {
		self.0.reserved
	}

	/// The host overlay a composed registry keeps at the end of its order.
	pub fn host_overlay(&self) -> Option<&Registry> {
		self.0.host_overlay.as_ref()
	}

	pub fn storage_config(&self) -> StorageConfig {
		self.0.config
	}

	pub fn bases(&self) -> Vec<Registry> {
		self.0.state.load().bases.clone()
	}

	/// See [`order::resolution_order`].
	pub fn order(&self) -> Result<Arc<[Registry]>> {
		order::resolution_order(self)
	}

	/// True if `other` appears in this registry's resolution order.
	pub fn inherits_from(&self, other: &Registry) -> Result<bool> {
		Ok(self.order()?.contains(other))
	}

	pub fn needs_migration(&self) -> bool {
		self.0.state.load().needs_migration
	}

	/// Whether anything was published since the flag was last taken.
	pub fn is_dirty(&self) -> bool {
		self.0.dirty.load(Ordering::Acquire)
	}

	pub fn take_dirty(&self) -> bool {
		self.0.dirty.swap(false, Ordering::AcqRel)
	}

	/// Store object id of a persistent registry, once assigned.
	pub fn oid(&self) -> Option<u64> {
		self.0.oid.get().copied()
	}

	/// Assigns the store object id. Returns false if one was already assigned.
	pub fn assign_oid(&self, oid: u64) -> bool {
		self.0.oid.set(oid).is_ok()
	}

	/// Replaces the bases.
	///
	/// # Errors
	///
	/// - [`RegistryError::Cycle`] if a new base already inherits from `self`.
	/// - [`RegistryError::InconsistentHierarchy`] if the new bases cannot be
	///   linearized.
	///
	/// The bases are left untouched on error.
	pub fn set_bases(&self, bases: Vec<Registry>) -> Result<()> {
		for base in &bases {
			if base == self || base.inherits_from(self)? {
				return Err(RegistryError::Cycle {
					registry: self.name().to_string(),
					base: base.name().to_string(),
				});
			}
		}
		order::linearize(self, &bases)?;

		self.mutate(|_, state, pending| {
			state.bases = bases.clone();
			pending.touch();
			Ok(())
		})?;
		let generation = order::bump_generation();
		tracing::debug!(
			registry = %self.name(),
			bases = bases.len(),
			generation,
			"registry bases replaced"
		);
		Ok(())
	}

	/// Migrates a registry loaded from a legacy record.
	///
	/// Thaws every frozen subscriber leaf, runs the threshold checks that
	/// legacy storage never ran and invalidates memoized orders so dependent
	/// registries see the new state. Returns whether anything was migrated;
	/// calling it again is a no-op.
	pub fn rebuild(&self) -> Result<bool> {
		let thawed = self.mutate(|_, state, pending| {
			if !state.needs_migration && !state.maps.has_frozen_leaves() {
				return Ok(None);
			}
			let thawed = state.maps.thaw();
			state.needs_migration = false;
			pending.touch();
			Ok(Some(thawed))
		})?;
		let Some(thawed) = thawed else {
			return Ok(false);
		};
		order::bump_generation();
		tracing::info!(registry = %self.name(), thawed, "rebuilt registry storage");
		Ok(true)
	}

	/// Adds a named child object, returning the one it replaced.
	pub fn add_content(&self, name: &str, component: Component) -> Result<Option<Component>> {
		self.mutate(|_, state, pending| {
			pending.touch();
			Ok(state.maps.contents.insert(name.to_string(), component.clone()))
		})
	}

	pub fn content(&self, name: &str) -> Option<Component> {
		self.0.state.load().maps.contents.get(name).cloned()
	}

	pub fn remove_content(&self, name: &str) -> Result<Option<Component>> {
		self.mutate(|_, state, pending| {
			let removed = state.maps.contents.shift_remove(name);
			if removed.is_some() {
				pending.touch();
			}
			Ok(removed)
		})
	}

	pub fn content_names(&self) -> Vec<String> {
		self.0.state.load().maps.contents.keys().cloned().collect()
	}

	/// Whether the local bucket of utilities providing `provided` has been
	/// converted to ordered storage, or `None` if there is no such bucket.
	pub fn utility_bucket_is_paged(&self, provided: &Tag) -> Option<bool> {
		self.0
			.state
			.load()
			.maps
			.utilities
			.bucket_is_paged(&BucketKey::utility(provided.clone()))
	}

	pub(crate) fn state(&self) -> Arc<RegistryState> {
		self.0.state.load_full()
	}

	pub(crate) fn order_memo(&self) -> Option<Arc<OrderMemo>> {
		self.0.order.load_full()
	}

	pub(crate) fn store_order_memo(&self, memo: OrderMemo) {
		self.0.order.store(Some(Arc::new(memo)));
	}

	/// Applies `apply` to a copy of the current state and publishes it.
	///
	/// `apply` may run more than once if another writer publishes first, so it
	/// must only touch the state it is handed.
	pub(crate) fn mutate<T>(
		&self,
		mut apply: impl FnMut(&Registry, &mut RegistryState, &mut Pending) -> Result<T>,
	) -> Result<T> {
		loop {
			let current = self.0.state.load_full();
			let mut next = RegistryState::clone(&current);
			let mut pending = Pending::default();
			let out = apply(self, &mut next, &mut pending)?;
			if !pending.touched {
				return Ok(out);
			}

			if !next.needs_migration {
				let converted = next.maps.changed(&self.0.config);
				if converted > 0 {
					tracing::debug!(
						registry = %self.name(),
						converted,
						"converted registry maps to ordered storage"
					);
				}
			}

			let mut deliveries = Vec::with_capacity(pending.events.len());
			for event in pending.events {
				let handlers = self.event_handlers(&next, &event)?;
				if !handlers.is_empty() {
					deliveries.push((event, handlers));
				}
			}

			let next = Arc::new(next);
			let prev = self.0.state.compare_and_swap(&current, Arc::clone(&next));
			if !Arc::ptr_eq(&prev, &current) {
				continue;
			}
			self.0.dirty.store(true, Ordering::Release);

			for (event, handlers) in deliveries {
				let payload = [Component::object(event)];
				for handler in handlers {
					handler.call(&payload);
				}
			}
			return Ok(out);
		}
	}

	/// Handlers for `event` along the resolution order, root first, reading
	/// this registry's handlers from the unpublished `state`.
	fn event_handlers(&self, state: &RegistryState, event: &RegistrationEvent) -> Result<Vec<Component>> {
		let key = SubscriptionKey::new(vec![event.tag().clone()], None);
		let mut handlers = Vec::new();
		for registry in self.order()?.iter().rev() {
			if registry == self {
				handlers.extend_from_slice(state.maps.adapters.subscriptions(&key));
			} else {
				handlers.extend_from_slice(registry.state().maps.adapters.subscriptions(&key));
			}
		}
		Ok(handlers)
	}
}

impl PartialEq for Registry {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for Registry {}

impl Hash for Registry {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.id.hash(state);
	}
}

impl fmt::Debug for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("name", &self.0.name)
			.field("kind", &self.0.kind)
			.finish_non_exhaustive()
	}
}

impl fmt::Display for Registry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.0.kind, self.0.name)
	}
}

/// Builder for [`Registry`].
///
/// ```
/// use hostsite_registry::Registry;
///
/// let root = Registry::global("root");
/// let host = Registry::builder("example.com").base(root.clone()).build().unwrap();
/// assert_eq!(host.order().unwrap().len(), 2);
/// ```
#[derive(Debug)]
pub struct RegistryBuilder {
	name: Arc<str>,
	kind: RegistryKind,
	reserved: bool,
	host_overlay: Option<Registry>,
	config: StorageConfig,
	bases: Vec<Registry>,
}

impl RegistryBuilder {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
			kind: RegistryKind::Global,
			reserved: false,
			host_overlay: None,
			config: StorageConfig::default(),
			bases: Vec::new(),
		}
	}

	pub fn kind(mut self, kind: RegistryKind) -> Self {
		self.kind = kind;
		self
	}

	pub fn persistent(self) -> Self {
		self.kind(RegistryKind::Persistent)
	}

	pub fn transient(self) -> Self {
		self.kind(RegistryKind::Transient)
	}

	/// Marks the registry as a reserved root that synchronization never mirrors.
	pub fn reserved(mut self) -> Self {
		self.reserved = true;
		self
	}

	pub fn host_overlay(mut self, overlay: Registry) -> Self {
		self.host_overlay = Some(overlay);
		self
	}

	pub fn storage(mut self, config: StorageConfig) -> Self {
		self.config = config;
		self
	}

	pub fn base(mut self, base: Registry) -> Self {
		self.bases.push(base);
		self
	}

	pub fn bases(mut self, bases: impl IntoIterator<Item = Registry>) -> Self {
		self.bases.extend(bases);
		self
	}

	/// # Errors
	///
	/// [`RegistryError::InconsistentHierarchy`] if the bases cannot be linearized.
	pub fn build(self) -> Result<Registry> {
		let registry = Registry::from_parts(
			self.name,
			self.kind,
			self.reserved,
			self.host_overlay,
			self.config,
			RegistryState {
				bases: self.bases,
				..RegistryState::default()
			},
		);
		order::resolution_order(&registry)?;
		Ok(registry)
	}
}
