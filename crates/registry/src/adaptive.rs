//! Adaptive map storage.
//!
//! # Role
//!
//! Registry maps start as insertion-ordered [`IndexMap`]s. Once a map grows
//! past its threshold it is converted, in place and with every entry intact,
//! into a [`BTreeMap`], whose sorted nodes page well in the backing store.
//!
//! # Invariants
//!
//! - Conversion only happens through [`AdaptiveMap::convert_if_over`] and
//!   [`AdaptiveMap::page`], which the registry calls on live mutation paths.
//!   Deserialization restores whichever representation was stored.
//! - Conversion never changes the set of key/value pairs.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::component::Component;

/// A map that switches from insertion order to sorted pages at scale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AdaptiveMap<K: Ord + Hash, V> {
	Simple(IndexMap<K, V>),
	Paged(BTreeMap<K, V>),
}

impl<K: Ord + Hash, V> Default for AdaptiveMap<K, V> {
	fn default() -> Self {
		Self::Simple(IndexMap::new())
	}
}

impl<K: Ord + Hash, V> AdaptiveMap<K, V> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		match self {
			Self::Simple(m) => m.len(),
			Self::Paged(m) => m.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns true once the map has been converted to its ordered form.
	pub fn is_paged(&self) -> bool {
		matches!(self, Self::Paged(_))
	}

	pub fn get<Q>(&self, key: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
		Q: Ord + Hash + Eq + ?Sized,
	{
		match self {
			Self::Simple(m) => m.get(key),
			Self::Paged(m) => m.get(key),
		}
	}

	pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
	where
		K: Borrow<Q>,
		Q: Ord + Hash + Eq + ?Sized,
	{
		match self {
			Self::Simple(m) => m.get_mut(key),
			Self::Paged(m) => m.get_mut(key),
		}
	}

	pub fn contains_key<Q>(&self, key: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: Ord + Hash + Eq + ?Sized,
	{
		self.get(key).is_some()
	}

	pub fn insert(&mut self, key: K, value: V) -> Option<V> {
		match self {
			Self::Simple(m) => m.insert(key, value),
			Self::Paged(m) => m.insert(key, value),
		}
	}

	/// Removes a key, keeping the order of the remaining simple entries.
	pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
	where
		K: Borrow<Q>,
		Q: Ord + Hash + Eq + ?Sized,
	{
		match self {
			Self::Simple(m) => m.shift_remove(key),
			Self::Paged(m) => m.remove(key),
		}
	}

	pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
		match self {
			Self::Simple(m) => m.entry(key).or_insert_with(default),
			Self::Paged(m) => m.entry(key).or_insert_with(default),
		}
	}

	pub fn iter(&self) -> Iter<'_, K, V> {
		match self {
			Self::Simple(m) => Iter::Simple(m.iter()),
			Self::Paged(m) => Iter::Paged(m.iter()),
		}
	}

	pub fn keys(&self) -> impl Iterator<Item = &K> {
		self.iter().map(|(k, _)| k)
	}

	pub fn values(&self) -> impl Iterator<Item = &V> {
		self.iter().map(|(_, v)| v)
	}

	pub fn values_mut(&mut self) -> Box<dyn Iterator<Item = &mut V> + '_> {
		match self {
			Self::Simple(m) => Box::new(m.values_mut()),
			Self::Paged(m) => Box::new(m.values_mut()),
		}
	}

	pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
		match self {
			Self::Simple(m) => m.retain(|k, v| keep(k, v)),
			Self::Paged(m) => m.retain(|k, v| keep(k, v)),
		}
	}

	/// Converts to the ordered form if the map holds more than `threshold` entries.
	///
	/// Returns whether a conversion happened.
	pub fn convert_if_over(&mut self, threshold: usize) -> bool {
		if self.is_paged() || self.len() <= threshold {
			return false;
		}
		self.page()
	}

	/// Converts to the ordered form unconditionally.
	pub fn page(&mut self) -> bool {
		let Self::Simple(simple) = self else {
			return false;
		};
		let paged: BTreeMap<K, V> = std::mem::take(simple).into_iter().collect();
		*self = Self::Paged(paged);
		true
	}
}

/// Borrowing iterator over an [`AdaptiveMap`].
pub enum Iter<'a, K, V> {
	Simple(indexmap::map::Iter<'a, K, V>),
	Paged(btree_map::Iter<'a, K, V>),
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
	type Item = (&'a K, &'a V);

	fn next(&mut self) -> Option<Self::Item> {
		match self {
			Self::Simple(it) => it.next(),
			Self::Paged(it) => it.next(),
		}
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		match self {
			Self::Simple(it) => it.size_hint(),
			Self::Paged(it) => it.size_hint(),
		}
	}
}

/// Raised when a frozen leaf would have been mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenLeaf;

/// The ordered sequence of subscribers stored under one key.
///
/// Records written before adaptive storage existed hold their leaves as
/// immutable sequences. Those load as [`Leaf::Frozen`] and refuse in-place
/// mutation until the owning registry is rebuilt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Leaf {
	Frozen(Arc<[Component]>),
	List(Vec<Component>),
}

impl Default for Leaf {
	fn default() -> Self {
		Self::List(Vec::new())
	}
}

impl Leaf {
	pub fn items(&self) -> &[Component] {
		match self {
			Self::Frozen(items) => items,
			Self::List(items) => items,
		}
	}

	pub fn len(&self) -> usize {
		self.items().len()
	}

	pub fn is_empty(&self) -> bool {
		self.items().is_empty()
	}

	pub fn is_frozen(&self) -> bool {
		matches!(self, Self::Frozen(_))
	}

	pub fn push(&mut self, component: Component) -> Result<(), FrozenLeaf> {
		match self {
			Self::Frozen(_) => Err(FrozenLeaf),
			Self::List(items) => {
				items.push(component);
				Ok(())
			}
		}
	}

	/// Removes every entry matching `pred`. Returns how many were removed.
	pub fn remove_where(&mut self, pred: impl Fn(&Component) -> bool) -> Result<usize, FrozenLeaf> {
		let Self::List(items) = self else {
			return Err(FrozenLeaf);
		};
		let before = items.len();
		items.retain(|c| !pred(c));
		Ok(before - items.len())
	}

	/// Turns a frozen leaf into a mutable list. Returns whether it was frozen.
	pub fn thaw(&mut self) -> bool {
		let Self::Frozen(items) = self else {
			return false;
		};
		*self = Self::List(items.to_vec());
		true
	}

	#[cfg(test)]
	pub(crate) fn freeze(&mut self) {
		if let Self::List(items) = self {
			*self = Self::Frozen(Arc::from(std::mem::take(items)));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn filled(n: usize) -> AdaptiveMap<String, usize> {
		let mut map = AdaptiveMap::new();
		for i in 0..n {
			map.insert(format!("k{i:03}"), i);
		}
		map
	}

	#[test]
	fn stays_simple_up_to_threshold() {
		let mut map = filled(30);
		assert!(!map.convert_if_over(30));
		assert!(!map.is_paged());
	}

	#[test]
	fn converts_past_threshold_preserving_entries() {
		let mut map = filled(31);
		let before: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
		assert!(map.convert_if_over(30));
		assert!(map.is_paged());
		assert_eq!(map.len(), 31);
		for (k, v) in before {
			assert_eq!(map.get(k.as_str()), Some(&v));
		}
		// Already paged; nothing more to do.
		assert!(!map.convert_if_over(0));
	}

	#[test]
	fn simple_remove_keeps_insertion_order() {
		let mut map = AdaptiveMap::new();
		map.insert("b", 1);
		map.insert("a", 2);
		map.insert("c", 3);
		map.remove("a");
		assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec!["b", "c"]);
	}

	#[test]
	fn frozen_leaf_refuses_mutation_until_thawed() {
		let mut leaf = Leaf::default();
		leaf.push(Component::value("a")).unwrap();
		leaf.freeze();
		assert_eq!(leaf.push(Component::value("b")), Err(FrozenLeaf));
		assert_eq!(leaf.remove_where(|_| true), Err(FrozenLeaf));
		assert!(leaf.thaw());
		assert!(!leaf.thaw());
		leaf.push(Component::value("b")).unwrap();
		assert_eq!(leaf.len(), 2);
	}

	#[test]
	fn remove_where_drops_every_match() {
		let a = Component::value("a");
		let mut leaf = Leaf::default();
		leaf.push(a.clone()).unwrap();
		leaf.push(Component::value("b")).unwrap();
		leaf.push(a.clone()).unwrap();
		assert_eq!(leaf.remove_where(|c| c.same(&a)), Ok(2));
		assert_eq!(leaf.len(), 1);
		assert!(!leaf.items()[0].same(&a));
	}
}
