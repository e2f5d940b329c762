use super::Registry;
use crate::component::Component;
use crate::error::Result;
use crate::tag::Tag;

impl Registry {
	/// The utility one step closer to the root than `current`.
	///
	/// `self` is the registry that holds `current`. Persistent registries mix
	/// persistent and global bases, so the next utility is taken from the full
	/// root-first list of registrations rather than from the first declared
	/// base. That keeps a persistent registration in an intermediate registry
	/// ahead of a less specific global one.
	///
	/// Returns `None` when `current` is not registered in the order, is the
	/// root-most registration, or the preceding entry is `current` itself.
	pub fn query_next_utility(&self, current: &Component, provided: &Tag) -> Result<Option<Component>> {
		let all = self.get_all_utilities_registered_for(provided)?;
		let Some(position) = all.iter().position(|c| c.same(current)) else {
			return Ok(None);
		};
		Ok(position
			.checked_sub(1)
			.map(|prev| all[prev].clone())
			.filter(|prev| !prev.same(current)))
	}
}
