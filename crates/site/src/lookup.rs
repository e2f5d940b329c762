//! Resolving virtual host names to sites.

use hostsite_registry::{COMPONENTS, Registry};

use crate::error::Result;
use crate::site::{Site, SiteKind, SiteMapping};
use crate::tree::SiteTree;

/// The overlay template for the first of `names` that has one.
///
/// Each name is first looked up as the source of a [`SiteMapping`]; a mapped
/// target that has a template wins, otherwise the name itself is tried. An
/// empty name stops the search.
pub fn find_site_components(registry: &Registry, names: &[&str]) -> Result<Option<Registry>> {
	for name in names {
		if name.is_empty() {
			return Ok(None);
		}
		if let Some(mapping) = SiteMapping::query(registry, name)?
			&& let Some(template) = template(registry, &mapping.target_name)?
		{
			tracing::debug!(host = %name, target = %mapping.target_name, "host name mapped");
			return Ok(Some(template));
		}
		if let Some(template) = template(registry, name)? {
			return Ok(Some(template));
		}
	}
	Ok(None)
}

fn template(registry: &Registry, name: &str) -> Result<Option<Registry>> {
	Ok(registry
		.query_utility(&COMPONENTS, name)?
		.and_then(|c| c.as_registry().cloned()))
}

/// The site for the first of `names` with an overlay template, or
/// `fallback` when none has one.
///
/// A persistent site named after the template is returned when `tree` has
/// one. Otherwise a transient site is synthesized whose registry has the
/// template and then `fallback`'s registry as bases, and which carries the
/// template as its host overlay. The transient site is never stored.
pub fn get_site_for_site_names(names: &[&str], fallback: &Site, tree: Option<&SiteTree>) -> Result<Site> {
	let Some(template) = find_site_components(fallback.registry(), names)? else {
		return Ok(fallback.clone());
	};
	if let Some(site) = tree.and_then(|t| t.get(template.name())) {
		return Ok(site.clone());
	}

	let registry = Registry::builder(template.name())
		.transient()
		.host_overlay(template.clone())
		.storage(fallback.registry().storage_config())
		.bases([template.clone(), fallback.registry().clone()])
		.build()?;
	tracing::debug!(site = %template.name(), fallback = %fallback.name(), "synthesized transient host site");
	Ok(Site::new(
		template.name(),
		SiteKind::Transient,
		registry,
		Some(fallback.clone()),
	))
}
