//! Utilities held inside a site's registry.
//!
//! An installed utility is both a named child of the registry and its
//! default (unnamed) registration for the provided tag.

use hostsite_registry::{Component, RegistrationEvent, Registry, Tag};

use crate::error::{Result, SiteError};

/// Adds `utility` as the child `utility_name` of `registry` and registers it
/// for `provided`.
pub fn install_utility(utility: Component, utility_name: &str, provided: &Tag, registry: &Registry) -> Result<()> {
	registry.add_content(utility_name, utility.clone())?;
	registry.register_utility(utility, provided, "")?;
	tracing::debug!(registry = %registry.name(), utility = %utility_name, %provided, "installed local utility");
	Ok(())
}

/// Undoes [`install_utility`]. Returns false when there is no such child.
///
/// # Errors
///
/// [`SiteError::UtilityMismatch`] when the registered utility is not the
/// child; nothing is removed then.
pub fn uninstall_utility(utility_name: &str, provided: &Tag, registry: &Registry) -> Result<bool> {
	let Some(child) = registry.content(utility_name) else {
		return Ok(false);
	};
	let registered = registry.get_utility(provided, "")?;
	if !registered.same(&child) {
		return Err(SiteError::UtilityMismatch {
			name: utility_name.to_string(),
			provided: provided.clone(),
		});
	}
	registry.unregister_utility(Some(&child), provided, "")?;
	registry.remove_content(utility_name)?;
	tracing::debug!(registry = %registry.name(), utility = %utility_name, %provided, "uninstalled local utility");
	Ok(true)
}

/// [`install_utility`] into the registry a registration event came from.
pub fn install_utility_on_registration(
	utility: Component,
	utility_name: &str,
	provided: &Tag,
	event: &RegistrationEvent,
) -> Result<()> {
	install_utility(utility, utility_name, provided, &event.info().registry)
}

/// [`uninstall_utility`] from the registry a registration event came from.
pub fn uninstall_utility_on_unregistration(utility_name: &str, provided: &Tag, event: &RegistrationEvent) -> Result<bool> {
	uninstall_utility(utility_name, provided, &event.info().registry)
}
