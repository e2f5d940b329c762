//! Per-registry lookup tables.
//!
//! # Role
//!
//! A [`LookupTable`] is the local half of a registry's lookups: exact-key
//! buckets of named components, a reference count per provided tag and the
//! subscriber multimap. Walking the resolution order across tables is the
//! registry's job; a table only answers for itself.
//!
//! # Invariants
//!
//! - `provided[tag]` equals the number of bucket entries plus subscriber
//!   entries providing `tag`; a tag whose count drops to zero is removed.
//! - Empty buckets and empty subscriber leaves are removed.
//! - Every key tag has passed [`Tag::check`] before it reaches a map.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adaptive::{AdaptiveMap, Leaf};
use crate::component::Component;
use crate::error::{RegistryError, Result};
use crate::registry::StorageConfig;
use crate::tag::Tag;

/// Key of a named-component bucket.
///
/// Utilities use an empty `required` list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
	pub required: Vec<Tag>,
	pub provided: Tag,
}

impl BucketKey {
	pub fn utility(provided: Tag) -> Self {
		Self {
			required: Vec::new(),
			provided,
		}
	}

	pub fn adapter(required: Vec<Tag>, provided: Tag) -> Self {
		Self { required, provided }
	}

	fn check(&self) -> Result<()> {
		self.required.iter().try_for_each(Tag::check)?;
		self.provided.check()
	}
}

/// Key of a subscriber leaf. Handlers have no provided tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
	pub required: Vec<Tag>,
	pub provided: Option<Tag>,
}

impl SubscriptionKey {
	pub fn new(required: Vec<Tag>, provided: Option<Tag>) -> Self {
		Self { required, provided }
	}

	fn check(&self) -> Result<()> {
		self.required.iter().try_for_each(Tag::check)?;
		self.provided.as_ref().map_or(Ok(()), Tag::check)
	}
}

impl fmt::Display for SubscriptionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("(")?;
		for (i, tag) in self.required.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			write!(f, "{tag}")?;
		}
		match &self.provided {
			Some(tag) => write!(f, ") -> {tag}"),
			None => f.write_str(") -> <handler>"),
		}
	}
}

/// Local lookup state of one registry, for either utilities or adapters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LookupTable {
	buckets: AdaptiveMap<BucketKey, AdaptiveMap<String, Component>>,
	provided: AdaptiveMap<Tag, u32>,
	subscribers: AdaptiveMap<SubscriptionKey, Leaf>,
}

impl LookupTable {
	pub fn lookup(&self, key: &BucketKey, name: &str) -> Option<&Component> {
		self.buckets.get(key)?.get(name)
	}

	/// Every `(name, component)` pair in one bucket.
	pub fn names(&self, key: &BucketKey) -> impl Iterator<Item = (&String, &Component)> {
		self.buckets.get(key).into_iter().flat_map(|bucket| bucket.iter())
	}

	pub fn is_provided(&self, tag: &Tag) -> bool {
		self.provided.contains_key(tag)
	}

	pub fn register(&mut self, key: BucketKey, name: &str, component: Component) -> Result<()> {
		key.check()?;
		let provided = key.provided.clone();
		let previous = self
			.buckets
			.get_or_insert_with(key, AdaptiveMap::new)
			.insert(name.to_string(), component);
		if previous.is_none() {
			self.add_provided(provided);
		}
		Ok(())
	}

	pub fn unregister(&mut self, key: &BucketKey, name: &str) -> Option<Component> {
		let bucket = self.buckets.get_mut(key)?;
		let removed = bucket.remove(name)?;
		if bucket.is_empty() {
			self.buckets.remove(key);
		}
		self.remove_provided(&key.provided);
		Some(removed)
	}

	pub fn subscriptions(&self, key: &SubscriptionKey) -> &[Component] {
		self.subscribers.get(key).map_or(&[][..], Leaf::items)
	}

	pub fn subscribe(&mut self, key: SubscriptionKey, component: Component) -> Result<()> {
		key.check()?;
		let label = key.to_string();
		let provided = key.provided.clone();
		self.subscribers
			.get_or_insert_with(key, Leaf::default)
			.push(component)
			.map_err(|_| RegistryError::ImmutableLeaf { key: label })?;
		if let Some(tag) = provided {
			self.add_provided(tag);
		}
		Ok(())
	}

	/// Removes every copy of `component` from a leaf, or the whole leaf when
	/// `component` is `None`.
	///
	/// Returns whether anything was removed.
	pub fn unsubscribe(&mut self, key: &SubscriptionKey, component: Option<&Component>) -> Result<bool> {
		let Some(leaf) = self.subscribers.get_mut(key) else {
			return Ok(false);
		};
		let removed = leaf
			.remove_where(|c| component.is_none_or(|target| c.same(target)))
			.map_err(|_| RegistryError::ImmutableLeaf {
				key: key.to_string(),
			})?;
		if leaf.is_empty() {
			self.subscribers.remove(key);
		}
		if let Some(tag) = &key.provided {
			for _ in 0..removed {
				self.remove_provided(tag);
			}
		}
		Ok(removed > 0)
	}

	/// Converts every map that has outgrown its threshold.
	///
	/// Subscriber maps are paged as soon as they hold anything. Returns the
	/// number of maps converted.
	pub fn changed(&mut self, config: &StorageConfig) -> usize {
		let mut converted = 0;
		for bucket in self.buckets.values_mut() {
			converted += usize::from(bucket.convert_if_over(config.map_threshold));
		}
		converted += usize::from(self.buckets.convert_if_over(config.map_threshold));
		converted += usize::from(self.provided.convert_if_over(config.provided_threshold));
		if !self.subscribers.is_empty() {
			converted += usize::from(self.subscribers.page());
		}
		converted
	}

	/// Makes every frozen subscriber leaf mutable. Returns how many were thawed.
	pub fn thaw(&mut self) -> usize {
		self.subscribers.values_mut().map(|leaf| usize::from(leaf.thaw())).sum()
	}

	pub fn bucket_is_paged(&self, key: &BucketKey) -> Option<bool> {
		self.buckets.get(key).map(AdaptiveMap::is_paged)
	}

	pub fn provided_is_paged(&self) -> bool {
		self.provided.is_paged()
	}

	pub fn subscribers_are_paged(&self) -> bool {
		self.subscribers.is_paged()
	}

	pub(crate) fn has_frozen_leaves(&self) -> bool {
		self.subscribers.values().any(Leaf::is_frozen)
	}

	pub(crate) fn components(&self) -> impl Iterator<Item = &Component> {
		self.buckets
			.values()
			.flat_map(|bucket| bucket.values())
			.chain(self.subscribers.values().flat_map(|leaf| leaf.items()))
	}

	/// Reverts to the representation written before adaptive storage existed.
	#[cfg(test)]
	pub(crate) fn into_legacy(mut self) -> Self {
		fn unpage<K: Ord + std::hash::Hash, V>(map: AdaptiveMap<K, V>) -> AdaptiveMap<K, V> {
			match map {
				AdaptiveMap::Paged(m) => AdaptiveMap::Simple(m.into_iter().collect()),
				simple => simple,
			}
		}
		self.buckets = unpage(std::mem::take(&mut self.buckets));
		for bucket in self.buckets.values_mut() {
			*bucket = unpage(std::mem::take(bucket));
		}
		self.provided = unpage(std::mem::take(&mut self.provided));
		self.subscribers = unpage(std::mem::take(&mut self.subscribers));
		for leaf in self.subscribers.values_mut() {
			leaf.freeze();
		}
		self
	}

	fn add_provided(&mut self, tag: Tag) {
		*self.provided.get_or_insert_with(tag, || 0) += 1;
	}

	fn remove_provided(&mut self, tag: &Tag) {
		let Some(count) = self.provided.get_mut(tag) else {
			return;
		};
		*count = count.saturating_sub(1);
		if *count == 0 {
			self.provided.remove(tag);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(threshold: usize) -> StorageConfig {
		StorageConfig {
			map_threshold: threshold,
			provided_threshold: threshold,
			registration_threshold: threshold,
		}
	}

	#[test]
	fn provided_counts_follow_registrations() {
		let mut table = LookupTable::default();
		let key = BucketKey::utility(Tag::named("IFoo"));
		table.register(key.clone(), "a", Component::value("a")).unwrap();
		table.register(key.clone(), "b", Component::value("b")).unwrap();
		table
			.subscribe(SubscriptionKey::new(vec![], Some(Tag::named("IFoo"))), Component::value("a"))
			.unwrap();
		assert!(table.is_provided(&Tag::named("IFoo")));

		table.unregister(&key, "a");
		table.unregister(&key, "b");
		assert!(table.is_provided(&Tag::named("IFoo")));
		table
			.unsubscribe(&SubscriptionKey::new(vec![], Some(Tag::named("IFoo"))), None)
			.unwrap();
		assert!(!table.is_provided(&Tag::named("IFoo")));
		assert_eq!(table.names(&key).count(), 0);
	}

	#[test]
	fn anonymous_keys_are_rejected_without_side_effects() {
		let mut table = LookupTable::default();
		let err = table
			.register(BucketKey::utility(Tag::anonymous()), "", Component::value("x"))
			.unwrap_err();
		assert!(matches!(err, RegistryError::UnsupportedTag(_)));
		assert!(table.components().next().is_none());
	}

	#[test]
	fn bucket_converts_only_past_threshold() {
		let mut table = LookupTable::default();
		let key = BucketKey::utility(Tag::named("IFoo"));
		for i in 0..3 {
			table.register(key.clone(), &format!("n{i}"), Component::value("v")).unwrap();
		}
		assert_eq!(table.changed(&config(3)), 0);
		assert_eq!(table.bucket_is_paged(&key), Some(false));

		table.register(key.clone(), "n3", Component::value("v")).unwrap();
		assert_eq!(table.changed(&config(3)), 1);
		assert_eq!(table.bucket_is_paged(&key), Some(true));
		assert_eq!(table.names(&key).count(), 4);
	}

	#[test]
	fn subscribers_page_immediately() {
		let mut table = LookupTable::default();
		table
			.subscribe(SubscriptionKey::new(vec![Tag::named("IEvent")], None), Component::value("h"))
			.unwrap();
		table.changed(&config(100));
		assert!(table.subscribers_are_paged());
	}

	#[test]
	fn legacy_leaves_refuse_mutation() {
		let key = SubscriptionKey::new(vec![], Some(Tag::named("IFoo")));
		let mut table = LookupTable::default();
		table.subscribe(key.clone(), Component::value("a")).unwrap();
		let mut table = table.into_legacy();

		let err = table.subscribe(key.clone(), Component::value("b")).unwrap_err();
		assert!(matches!(err, RegistryError::ImmutableLeaf { key } if key == "() -> IFoo"));
		assert_eq!(table.subscriptions(&key).len(), 1);

		assert_eq!(table.thaw(), 1);
		table.subscribe(key.clone(), Component::value("b")).unwrap();
		assert_eq!(table.subscriptions(&key).len(), 2);
	}
}
