//! Base linearization.
//!
//! # Role
//!
//! Turns the base DAG of a registry into the single lookup order used by
//! every query: the registry itself, then its bases transitively, root last.
//!
//! # Invariants
//!
//! - The order is a C3 merge. A registry's declared base order is preserved,
//!   anything preceding something else in an input order precedes it in the
//!   output, and each registry appears exactly once.
//! - Orders are memoized per registry against the global structural
//!   generation. Anything that changes the bases of a registry that already
//!   has dependents must call [`bump_generation`] after publishing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RegistryError, Result};
use crate::registry::Registry;


static GENERATION: AtomicU64 = AtomicU64::new(0);

/// A cached order and the generation it was computed at.
#[derive(Debug)]
pub(crate) struct OrderMemo {
	pub generation: u64,
	pub order: Arc<[Registry]>,
}

/// The current structural generation.
pub fn generation() -> u64 {
	GENERATION.load(Ordering::Acquire)
}

/// Invalidates every memoized order.
pub(crate) fn bump_generation() -> u64 {
	GENERATION.fetch_add(1, Ordering::AcqRel) + 1
}

/// Returns `[registry, ...bases transitively, root]`.
///
/// # Errors
///
/// [`RegistryError::InconsistentHierarchy`] if no order satisfies every base
/// list at once.
pub fn resolution_order(registry: &Registry) -> Result<Arc<[Registry]>> {
	let generation = generation();
	if let Some(memo) = registry.order_memo()
		&& memo.generation == generation
	{
		return Ok(Arc::clone(&memo.order));
	}

	let order: Arc<[Registry]> = linearize(registry, &registry.bases())?.into();
	registry.store_order_memo(OrderMemo {
		generation,
		order: Arc::clone(&order),
	});
	Ok(order)
}

/// Computes the order `head` would have with `bases`, without touching any memo.
pub(crate) fn linearize(head: &Registry, bases: &[Registry]) -> Result<Vec<Registry>> {
	let mut sequences = Vec::with_capacity(bases.len() + 1);
	for base in bases {
		sequences.push(resolution_order(base)?.to_vec());
	}
	sequences.push(bases.to_vec());

	let mut order = Vec::with_capacity(sequences.iter().map(Vec::len).sum::<usize>() + 1);
	order.push(head.clone());
	merge(sequences, &mut order).map_err(|unmerged| RegistryError::InconsistentHierarchy {
		registry: head.name().to_string(),
		unmerged,
	})?;
	Ok(order)
}

/// C3 merge of `sequences` onto `out`.
///
/// On failure returns the names left in each non-empty sequence.
fn merge(sequences: Vec<Vec<Registry>>, out: &mut Vec<Registry>) -> Result<(), Vec<Vec<String>>> {
	let mut cursors: Vec<(Vec<Registry>, usize)> = sequences
		.into_iter()
		.filter(|s| !s.is_empty())
		.map(|s| (s, 0))
		.collect();

	loop {
		cursors.retain(|(seq, at)| *at < seq.len());
		if cursors.is_empty() {
			return Ok(());
		}

		let in_tail = |candidate: &Registry| {
			cursors
				.iter()
				.any(|(seq, at)| seq[at + 1..].contains(candidate))
		};
		let Some(next) = cursors
			.iter()
			.map(|(seq, at)| &seq[*at])
			.find(|head| !in_tail(head))
			.cloned()
		else {
			return Err(cursors
				.iter()
				.map(|(seq, at)| seq[*at..].iter().map(|r| r.name().to_string()).collect())
				.collect());
		};

		for (seq, at) in &mut cursors {
			if seq[*at] == next {
				*at += 1;
			}
		}
		out.push(next);
	}
}
