//! Persisted registry records.
//!
//! # Role
//!
//! A [`RegistryRecord`] is the stored form of a persistent registry: its
//! name, its maps and references to its bases. Records are encoded with
//! `postcard`.
//!
//! # Invariants
//!
//! - Only [`RegistryKind::Persistent`] registries holding nothing but
//!   [`Component::Value`](crate::Component::Value)s have a record.
//! - Restoring a record never converts a map. A [`StorageFormat::Legacy`]
//!   record restores as a registry that needs [`Registry::rebuild`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::registry::{Registry, RegistryKind, RegistryMaps, RegistryState, StorageConfig};

/// How the maps in a record were laid out when it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageFormat {
	/// Written before adaptive storage; leaves are frozen and thresholds were never checked.
	Legacy,
	Adaptive,
}

/// Reference from a record to one of its bases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseRef {
	/// Another persistent registry, by store object id.
	Persistent(u64),
	/// A global registry, by name.
	Global(String),
}

impl BaseRef {
	/// The reference a record should store for `base`, if it has one.
	pub fn of(base: &Registry) -> Option<Self> {
		match base.kind() {
			RegistryKind::Persistent => base.oid().map(Self::Persistent),
			RegistryKind::Global => Some(Self::Global(base.name().to_string())),
			RegistryKind::Transient => None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
	pub name: String,
	pub format: StorageFormat,
	pub bases: Vec<BaseRef>,
	pub(crate) maps: RegistryMaps,
}

impl RegistryRecord {
	pub fn encode(&self) -> Result<Vec<u8>> {
		Ok(postcard::to_stdvec(self)?)
	}

	pub fn decode(bytes: &[u8]) -> Result<Self> {
		Ok(postcard::from_bytes(bytes)?)
	}

	/// Rewrites the record the way it was stored before adaptive storage.
	#[cfg(test)]
	pub(crate) fn into_legacy(mut self) -> Self {
		use crate::adaptive::AdaptiveMap;

		fn unpage<K: Ord + std::hash::Hash, V>(map: AdaptiveMap<K, V>) -> AdaptiveMap<K, V> {
			match map {
				AdaptiveMap::Paged(m) => AdaptiveMap::Simple(m.into_iter().collect()),
				simple => simple,
			}
		}

		self.format = StorageFormat::Legacy;
		self.maps.utility_registrations = unpage(std::mem::take(&mut self.maps.utility_registrations));
		self.maps.adapter_registrations = unpage(std::mem::take(&mut self.maps.adapter_registrations));
		self.maps.utilities = std::mem::take(&mut self.maps.utilities).into_legacy();
		self.maps.adapters = std::mem::take(&mut self.maps.adapters).into_legacy();
		self
	}
}

impl Registry {
	/// Captures the persistent form of this registry.
	///
	/// # Errors
	///
	/// [`RegistryError::NotPersistable`] for global or transient registries,
	/// for registries holding components with no persistent form and for
	/// bases with no [`BaseRef`].
	pub fn to_record(&self) -> Result<RegistryRecord> {
		let not_persistable = |reason: String| RegistryError::NotPersistable {
			registry: self.name().to_string(),
			reason,
		};
		if self.kind() != RegistryKind::Persistent {
			return Err(not_persistable(format!("{} registries are never stored", self.kind())));
		}

		let state = self.state();
		if let Some(component) = state.maps.components().find(|c| !c.is_persistable()) {
			return Err(not_persistable(format!("holds {}", component.describe())));
		}
		let bases = state
			.bases
			.iter()
			.map(|base| BaseRef::of(base).ok_or_else(|| not_persistable(format!("base {base} has no reference"))))
			.collect::<Result<Vec<_>>>()?;

		Ok(RegistryRecord {
			name: self.name().to_string(),
			format: if state.needs_migration {
				StorageFormat::Legacy
			} else {
				StorageFormat::Adaptive
			},
			bases,
			maps: state.maps.clone(),
		})
	}

	/// Recreates a persistent registry from its record.
	///
	/// `bases` are the registries the record's [`BaseRef`]s resolved to, in
	/// record order. No map is converted, whatever its size.
	pub fn restore(record: RegistryRecord, bases: Vec<Registry>, config: StorageConfig, oid: u64) -> Self {
		let needs_migration = record.format == StorageFormat::Legacy;
		if needs_migration {
			tracing::debug!(registry = %record.name, oid, "restored legacy registry record");
		}
		let registry = Self::from_parts(
			Arc::from(record.name),
			RegistryKind::Persistent,
			false,
			None,
			config,
			RegistryState {
				bases,
				maps: record.maps,
				needs_migration,
			},
		);
		registry.assign_oid(oid);
		registry
	}
}
