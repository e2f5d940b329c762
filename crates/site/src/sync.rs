//! Mirroring overlay templates into persistent host sites.
//!
//! For every template registered under [`COMPONENTS`] in the global root,
//! the template's resolution order is walked from the root end. Reserved
//! roots and the global root itself are skipped. Each remaining template
//! either already has a persistent site of the same name, which becomes the
//! base for the next one, or gets a new site whose bases are the template
//! followed by that base.
//!
//! A second run finds every site by name and creates nothing. The whole
//! run belongs to one transaction; see [`Application::synchronize`].
//!
//! [`Application::synchronize`]: crate::app::Application::synchronize

use std::time::{SystemTime, UNIX_EPOCH};

use hostsite_registry::{COMPONENTS, Component};

use crate::connection::Connection;
use crate::error::Result;
use crate::site::{NEW_LOCAL_SITE, NewLocalSite, Site};

/// Creates the missing host sites in `conn`'s site tree and returns them in
/// creation order.
///
/// Handlers registered in the global root for [`NEW_LOCAL_SITE`] are
/// notified for each created site before it is committed.
pub fn synchronize_host_policies(conn: &mut Connection) -> Result<Vec<Site>> {
	let policy = conn.config().sync.reserved_roots;
	let main = conn.require_main_site()?.clone();
	conn.require_tree()?;
	let globals = conn.globals().clone();

	let mut created = Vec::new();
	for (name, component) in globals.get_utilities_for(&COMPONENTS)? {
		let Some(template) = component.as_registry() else {
			continue;
		};
		tracing::debug!(template = %name, "checking host policy");

		let mut current_base = main.registry().clone();
		for comps in template.order()?.iter().rev() {
			if comps == &globals || policy.is_reserved(comps) {
				continue;
			}
			if let Some(existing) = conn.require_tree()?.get(comps.name()) {
				tracing::debug!(site = %comps.name(), "host policy already in place");
				current_base = existing.registry().clone();
				continue;
			}

			tracing::info!(site = %comps.name(), base = %current_base.name(), "installing host policy site");
			let site = conn.create_host_site(comps.name(), vec![comps.clone(), current_base])?;
			globals.notify(&NEW_LOCAL_SITE, Component::object(NewLocalSite { site: site.clone() }))?;
			current_base = site.registry().clone();
			created.push(site);
		}
	}

	let now = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
	conn.require_tree_mut()?.mark_synchronized(now.max(1));
	tracing::info!(created = created.len(), "synchronized host policies");
	Ok(created)
}
