//! The mutable state behind a registry snapshot.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::StorageConfig;
use crate::adaptive::AdaptiveMap;
use crate::component::Component;
use crate::table::LookupTable;
use crate::tag::Tag;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct UtilityKey {
	pub provided: Tag,
	pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct AdapterKey {
	pub required: Vec<Tag>,
	pub provided: Tag,
	pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Registration {
	pub component: Component,
	pub info: String,
}

impl Registration {
	pub fn matches(&self, component: &Component, info: &str) -> bool {
		self.component.same(component) && self.info == info
	}
}

/// A subscriber or handler registration. Handlers have no provided tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SubscriptionRegistration {
	pub required: Vec<Tag>,
	pub provided: Option<Tag>,
	pub component: Component,
	pub info: String,
}

/// Registration bookkeeping plus the two lookup tables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct RegistryMaps {
	pub utility_registrations: AdaptiveMap<UtilityKey, Registration>,
	pub adapter_registrations: AdaptiveMap<AdapterKey, Registration>,
	pub subscription_registrations: Vec<SubscriptionRegistration>,
	pub utilities: LookupTable,
	pub adapters: LookupTable,
	pub contents: IndexMap<String, Component>,
}

impl RegistryMaps {
	/// Runs every threshold check. Returns the number of maps converted.
	pub fn changed(&mut self, config: &StorageConfig) -> usize {
		let threshold = config.registration_threshold;
		let mut converted = usize::from(self.utility_registrations.convert_if_over(threshold));
		converted += usize::from(self.adapter_registrations.convert_if_over(threshold));
		converted + self.utilities.changed(config) + self.adapters.changed(config)
	}

	/// Whether `component` is still registered as a utility providing `provided`
	/// under any name.
	pub fn utility_subscribed(&self, provided: &Tag, component: &Component) -> bool {
		self.utility_registrations
			.iter()
			.any(|(key, reg)| key.provided == *provided && reg.component.same(component))
	}

	pub fn components(&self) -> impl Iterator<Item = &Component> {
		self.utilities
			.components()
			.chain(self.adapters.components())
			.chain(self.contents.values())
	}

	pub fn has_frozen_leaves(&self) -> bool {
		self.utilities.has_frozen_leaves() || self.adapters.has_frozen_leaves()
	}

	pub fn thaw(&mut self) -> usize {
		self.utilities.thaw() + self.adapters.thaw()
	}
}
