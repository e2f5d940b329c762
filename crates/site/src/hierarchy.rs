//! The chain of overlay templates above a host site.

use hostsite_registry::{COMPONENTS, Registry};

use crate::error::Result;
use crate::site::Site;
use crate::tree::SiteTree;

/// Templates from the one named after `site` up through first bases, for as
/// long as each has a persistent site in `tree`. Most specific first.
pub fn component_hierarchy(site: &Site, tree: &SiteTree) -> Result<Vec<Registry>> {
	let mut hierarchy = Vec::new();
	let mut next = site
		.registry()
		.query_utility(&COMPONENTS, site.name())?
		.and_then(|c| c.as_registry().cloned());
	while let Some(template) = next {
		if !tree.contains(template.name()) || hierarchy.contains(&template) {
			break;
		}
		next = template.bases().into_iter().next();
		hierarchy.push(template);
	}
	Ok(hierarchy)
}

/// Names of [`component_hierarchy`], root-most first when `reverse`.
pub fn component_hierarchy_names(site: &Site, tree: &SiteTree, reverse: bool) -> Result<Vec<String>> {
	let mut names: Vec<String> = component_hierarchy(site, tree)?
		.iter()
		.map(|t| t.name().to_string())
		.collect();
	if reverse {
		names.reverse();
	}
	Ok(names)
}
