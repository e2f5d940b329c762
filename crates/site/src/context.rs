//! The current site of each thread.
//!
//! # Role
//!
//! Every thread has at most one current [`Site`]. [`set_site`] replaces it
//! unconditionally; [`enter`] applies the traversal rules of [`compose`].
//! Both return a [`SiteGuard`] that restores the previous site when dropped,
//! on every exit path.
//!
//! # Invariants
//!
//! - The current site is thread-local and never shared between threads.
//! - Guards restore in reverse order of creation; they are not `Send`.
//! - [`current_registry`] fails with [`SiteError::ContextNotInstalled`]
//!   until [`install_hooks`] ran on the calling thread.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use hostsite_registry::Registry;

use crate::error::{Result, SiteError};
use crate::site::{Site, SiteKind};

thread_local! {
	static CURRENT: RefCell<Option<Site>> = const { RefCell::new(None) };
	static HOOKS: Cell<bool> = const { Cell::new(false) };
}

/// Lets [`current_registry`] answer on this thread.
pub fn install_hooks() {
	HOOKS.set(true);
}

pub fn uninstall_hooks() {
	HOOKS.set(false);
}

pub fn hooks_installed() -> bool {
	HOOKS.get()
}

pub fn current_site() -> Option<Site> {
	CURRENT.with_borrow(Clone::clone)
}

/// Registry of the current site, or `None` when no site is current.
pub fn current_registry() -> Result<Option<Registry>> {
	if !hooks_installed() {
		return Err(SiteError::ContextNotInstalled);
	}
	Ok(CURRENT.with_borrow(|site| site.as_ref().map(|s| s.registry().clone())))
}

/// Restores the previously current site when dropped.
#[must_use = "the previous site is restored when the guard is dropped"]
pub struct SiteGuard {
	previous: Option<Site>,
	_not_send: PhantomData<*const ()>,
}

impl Drop for SiteGuard {
	fn drop(&mut self) {
		let previous = self.previous.take();
		CURRENT.with_borrow_mut(|current| *current = previous);
	}
}

/// Makes `site` current, whatever was current before.
pub fn set_site(site: Option<Site>) -> SiteGuard {
	if let Some(site) = &site {
		warn_unmigrated(site);
	}
	let previous = CURRENT.replace(site);
	SiteGuard {
		previous,
		_not_send: PhantomData,
	}
}

/// Runs `f` with `site` current.
pub fn with_site<T>(site: &Site, f: impl FnOnce() -> T) -> T {
	let _guard = set_site(Some(site.clone()));
	f()
}

/// Enters `site` during traversal.
///
/// The current site becomes whatever [`compose`] decides; when it decides
/// to keep the current site, the guard restores that same site.
///
/// # Errors
///
/// [`SiteError::Navigation`] when `site` is unrelated to the current site.
pub fn enter(site: &Site) -> Result<SiteGuard> {
	let current = current_site();
	match compose(current.as_ref(), site)? {
		Some(next) => Ok(set_site(Some(next))),
		None => Ok(set_site(current)),
	}
}

/// Decides which site becomes current when traversal reaches `target`
/// while `current` is current. `None` keeps `current`.
///
/// - Nothing current: `target`.
/// - `target` itself, or a sentinel ([`SiteKind::is_sentinel`]) on either
///   side: keep.
/// - Two host sites neither of which inherits from the other: keep.
///   Related host sites go on to the rules below.
/// - `current` carries a host overlay: a façade over `target` whose
///   registry has `target`'s bases followed by that overlay.
/// - Anything else is a [`SiteError::Navigation`].
pub fn compose(current: Option<&Site>, target: &Site) -> Result<Option<Site>> {
	if target.kind().is_sentinel() {
		return Ok(None);
	}
	let Some(current) = current else {
		return Ok(Some(target.clone()));
	};
	if current.same(target) || current.kind().is_sentinel() {
		return Ok(None);
	}

	if current.kind() == SiteKind::HostPolicy && target.kind() == SiteKind::HostPolicy {
		let (from, to) = (current.own_registry(), target.own_registry());
		let related = to.inherits_from(from)? || from.inherits_from(to)?;
		tracing::trace!(current = %current.name(), target = %target.name(), related, "host site traversal");
		if !related {
			return Ok(None);
		}
	}

	if let Some(overlay) = current.registry().host_overlay() {
		let mut bases = target.registry().bases();
		if !bases.contains(overlay) {
			bases.push(overlay.clone());
		}
		let composed = Registry::builder(target.name())
			.transient()
			.host_overlay(overlay.clone())
			.storage(target.registry().storage_config())
			.bases(bases)
			.build()?;
		tracing::debug!(
			site = %target.name(),
			overlay = %overlay.name(),
			"composed host overlay into traversed site"
		);
		return Ok(Some(target.traversed(composed)));
	}

	Err(SiteError::Navigation {
		current: current.name().to_string(),
		target: target.name().to_string(),
	})
}

fn warn_unmigrated(site: &Site) {
	let order = match site.registry().order() {
		Ok(order) => order.to_vec(),
		Err(_) => vec![site.registry().clone()],
	};
	for registry in order.iter().filter(|r| r.needs_migration()) {
		tracing::warn!(
			site = %site.name(),
			registry = %registry.name(),
			"activated a registry stored in the legacy format; run rebuild() on it"
		);
	}
}

#[cfg(test)]
mod tests;
