//! Running jobs inside sites.
//!
//! [`Application::run_job_in_site`] and
//! [`Application::run_job_in_all_sites`] own the transaction: they open a
//! connection, run the job with the right site current, commit and rerun
//! the whole attempt after a store conflict. [`run_job_in_all_sites`] runs
//! inside a connection the caller manages.
//!
//! [`Application::run_job_in_site`]: crate::app::Application::run_job_in_site
//! [`Application::run_job_in_all_sites`]: crate::app::Application::run_job_in_all_sites

use std::time::Duration;

use hostsite_registry::RegistryKind;
use indexmap::IndexSet;

use crate::connection::Connection;
use crate::context;
use crate::error::{Result, SiteError};
use crate::lookup;
use crate::site::Site;
use crate::tree::SiteTree;

/// Which site a job runs in.
#[derive(Debug, Clone, Copy)]
pub enum SiteSelector<'a> {
	/// The main application folder.
	Main,
	/// A persistent host site by name.
	Named(&'a str),
	/// The first host name that resolves, see
	/// [`get_site_for_site_names`](crate::lookup::get_site_for_site_names).
	HostNames(&'a [&'a str]),
}

#[derive(Debug, Clone, Default)]
pub struct JobOptions {
	/// Used in logs.
	pub job_name: Option<String>,
	/// Abort instead of committing.
	pub side_effect_free: bool,
	/// Overrides `[jobs] retries`.
	pub retries: Option<u32>,
	/// Overrides `[jobs] sleep_ms`.
	pub sleep: Option<Duration>,
}

impl JobOptions {
	pub fn named(job_name: impl Into<String>) -> Self {
		Self {
			job_name: Some(job_name.into()),
			..Self::default()
		}
	}

	pub(crate) fn name(&self) -> &str {
		self.job_name.as_deref().unwrap_or("job")
	}
}

pub(crate) fn select_site(conn: &Connection, selector: SiteSelector<'_>) -> Result<Site> {
	let main = conn.require_main_site()?;
	match selector {
		SiteSelector::Main => Ok(main.clone()),
		SiteSelector::Named(name) => conn
			.require_tree()?
			.get_host_site(name, false)?
			.ok_or_else(|| SiteError::SiteNotFound { name: name.to_string() }),
		SiteSelector::HostNames(names) => lookup::get_site_for_site_names(names, main, conn.site_tree()),
	}
}

/// Makes `site` current and checks that lookups now go through it.
pub(crate) fn activate(site: &Site) -> Result<context::SiteGuard> {
	let guard = context::set_site(Some(site.clone()));
	if context::current_registry()?.as_ref() != Some(site.registry()) {
		return Err(SiteError::ContextNotInstalled);
	}
	Ok(guard)
}

/// Host sites of `tree`, shallowest first.
///
/// Every site's resolution order is consumed from its root end one entry
/// per round, across all sites, and each host site is taken the first time
/// it comes up. A site's ancestors therefore always come before it.
pub fn site_order(tree: &SiteTree) -> Result<Vec<Site>> {
	let mut lineages = Vec::with_capacity(tree.len());
	for site in tree.sites() {
		let lineage: Vec<Option<String>> = site
			.registry()
			.order()?
			.iter()
			.map(|registry| {
				let hosted = registry.kind() == RegistryKind::Persistent
					&& tree.get(registry.name()).is_some_and(|s| s.registry() == registry);
				hosted.then(|| registry.name().to_string())
			})
			.collect();
		lineages.push(lineage);
	}

	let mut ordered = IndexSet::with_capacity(tree.len());
	while lineages.iter().any(|l| !l.is_empty()) {
		for lineage in &mut lineages {
			if let Some(Some(name)) = lineage.pop() {
				ordered.insert(name);
			}
		}
	}
	Ok(ordered.iter().filter_map(|name| tree.get(name).cloned()).collect())
}

/// Runs `job` once in every host site, parents before children, inside the
/// caller's connection. Returns `(site name, result)` pairs in run order.
pub fn run_job_in_all_sites<T>(
	conn: &mut Connection,
	job_name: &str,
	mut job: impl FnMut(&mut Connection, &Site) -> Result<T>,
) -> Result<Vec<(String, T)>> {
	let sites = site_order(conn.require_tree()?)?;
	tracing::debug!(job = %job_name, sites = sites.len(), "running job in all sites");
	let mut results = Vec::with_capacity(sites.len());
	for site in sites {
		tracing::debug!(job = %job_name, site = %site.name(), "running job in site");
		let _guard = activate(&site)?;
		let result = job(conn, &site)?;
		results.push((site.name().to_string(), result));
	}
	Ok(results)
}
