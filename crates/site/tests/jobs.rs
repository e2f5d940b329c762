#![allow(unused_crate_dependencies)]

mod common;

use common::world;
use hostsite_registry::{Component, Registry, Tag};
use hostsite_site::localutility::install_utility;
use hostsite_site::{
	JobOptions, Site, SiteError, SiteKind, SiteSelector, current_registry, current_site, enter, install_hooks,
};
use hostsite_store::StoreError;
use pretty_assertions::assert_eq;

fn itool() -> Tag {
	Tag::named("ITool")
}

#[test]
fn test_job_changes_are_committed() {
	install_hooks();
	let w = world();
	w.app.synchronize().unwrap();

	let tool = Component::value("tool");
	let installed = tool.clone();
	let site_name = w
		.app
		.run_job_in_site(SiteSelector::Named("S1"), &JobOptions::named("install"), |_, site| {
			assert!(current_site().unwrap().same(site));
			install_utility(installed.clone(), "tool", &itool(), site.registry())?;
			Ok(site.name().to_string())
		})
		.unwrap();
	assert_eq!(site_name, "S1");
	assert!(current_site().is_none());

	let conn = w.app.open().unwrap();
	let tree = conn.require_tree().unwrap();
	let from_child = tree.get("S2").unwrap().registry().get_utility(&itool(), "").unwrap();
	assert!(from_child.same(&tool));
	assert!(w.globals.query_utility(&itool(), "").unwrap().is_none());
}

#[test]
fn test_side_effect_free_job_writes_nothing() {
	install_hooks();
	let w = world();
	w.app.synchronize().unwrap();
	let commits = w.app.store().commits();

	let options = JobOptions {
		side_effect_free: true,
		..JobOptions::named("dry-run")
	};
	w.app
		.run_job_in_site(SiteSelector::Named("S1"), &options, |_, site| {
			site.registry().register_utility(Component::value("tool"), &itool(), "")?;
			Ok(())
		})
		.unwrap();

	assert_eq!(w.app.store().commits(), commits);
	let conn = w.app.open().unwrap();
	let ps1 = conn.require_tree().unwrap().get("S1").unwrap();
	assert!(ps1.registry().query_utility(&itool(), "").unwrap().is_none());
}

#[test]
fn test_job_needs_hooks() {
	let w = world();
	w.app.synchronize().unwrap();
	let app = w.app.clone();
	let err = std::thread::spawn(move || {
		app.run_job_in_site(SiteSelector::Main, &JobOptions::default(), |_, _| Ok(()))
			.unwrap_err()
	})
	.join()
	.unwrap();
	assert!(matches!(err, SiteError::ContextNotInstalled));
}

#[test]
fn test_job_in_missing_site() {
	install_hooks();
	let w = world();
	w.app.install_site_tree_root().unwrap();
	let err = w
		.app
		.run_job_in_site(SiteSelector::Named("S1"), &JobOptions::default(), |_, _| Ok(()))
		.unwrap_err();
	assert!(matches!(err, SiteError::SiteNotFound { ref name } if name == "S1"));

	let fresh = common::world();
	let err = fresh
		.app
		.run_job_in_site(SiteSelector::Main, &JobOptions::default(), |_, _| Ok(()))
		.unwrap_err();
	assert!(matches!(err, SiteError::MissingLayout { .. }));
}

#[test]
fn test_job_by_host_names() {
	install_hooks();
	let w = world();
	w.app.install_site_tree_root().unwrap();

	let (kind, registry_is_current) = w
		.app
		.run_job_in_site(SiteSelector::HostNames(&["S2"]), &JobOptions::default(), |_, site| {
			Ok((site.kind(), current_registry()?.as_ref() == Some(site.registry())))
		})
		.unwrap();
	assert_eq!(kind, SiteKind::Transient);
	assert!(registry_is_current);
}

/// A competing commit to the same site registry makes the first attempt
/// conflict; the rerun sees the competing change.
#[test]
fn test_conflicting_job_is_rerun() {
	install_hooks();
	let w = world();
	w.app.synchronize().unwrap();

	let mut attempts = 0;
	let seen = w
		.app
		.run_job_in_site(SiteSelector::Named("S1"), &JobOptions::default(), |_, site| {
			attempts += 1;
			if attempts == 1 {
				let other = w.app.open()?;
				let competing = other.require_tree()?.get("S1").unwrap().registry().clone();
				competing.register_utility(Component::value("competing"), &itool(), "competing")?;
				other.commit()?;
			}
			site.registry().register_utility(Component::value("ours"), &itool(), "ours")?;
			Ok(site.registry().get_utilities_for(&itool())?.len())
		})
		.unwrap();

	assert_eq!(attempts, 2);
	assert_eq!(seen, 2);
}

#[test]
fn test_conflicts_past_retries_propagate() {
	install_hooks();
	let w = world();
	w.app.synchronize().unwrap();

	let options = JobOptions {
		retries: Some(1),
		..JobOptions::default()
	};
	let mut attempts = 0;
	let err = w
		.app
		.run_job_in_site(SiteSelector::Named("S1"), &options, |_, site| {
			attempts += 1;
			let other = w.app.open()?;
			let competing = other.require_tree()?.get("S1").unwrap().registry().clone();
			competing.register_utility(Component::value("c"), &itool(), &format!("c{attempts}"))?;
			other.commit()?;
			site.registry().register_utility(Component::value("ours"), &itool(), "ours")?;
			Ok(())
		})
		.unwrap_err();

	assert_eq!(attempts, 2);
	assert!(err.is_retryable());
	assert!(matches!(err, SiteError::Store(StoreError::Conflict { .. })));
}

/// Sites run parents first, whatever order the tree holds them in.
#[test]
fn test_all_sites_run_parents_first() {
	install_hooks();
	let w = world();
	w.app.install_site_tree_root().unwrap();

	let mut conn = w.app.open().unwrap();
	let main = conn.require_main_site().unwrap().clone();
	let parent_registry = conn.create_registry("parent.com", vec![main.registry().clone()]).unwrap();
	let child = conn.create_host_site("child.com", vec![parent_registry.clone()]).unwrap();
	conn.create_host_site("grandchild.com", vec![child.registry().clone()]).unwrap();
	conn.insert_host_site(Site::new("parent.com", SiteKind::HostPolicy, parent_registry, Some(main)))
		.unwrap();
	conn.create_host_site("other.com", vec![w.s1.clone(), conn.require_main_site().unwrap().registry().clone()])
		.unwrap();
	assert_eq!(
		conn.require_tree().unwrap().names().collect::<Vec<_>>(),
		["child.com", "grandchild.com", "parent.com", "other.com"]
	);
	conn.commit().unwrap();

	let results = w
		.app
		.run_job_in_all_sites(&JobOptions::named("walk"), |_, site| {
			let current: Registry = current_registry()?.unwrap();
			Ok(&current == site.registry())
		})
		.unwrap();
	let order: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
	assert_eq!(order, ["parent.com", "child.com", "grandchild.com", "other.com"]);
	assert!(results.iter().all(|(_, current)| *current));
}

/// Traversal between sibling host sites keeps the current one; an unrelated
/// folder is a navigation error.
#[test]
fn test_traversal_from_host_site() {
	install_hooks();
	let w = world();
	w.app.synchronize().unwrap();

	w.app
		.run_job_in_site(SiteSelector::Named("S2"), &JobOptions::default(), |conn, site| {
			let s3 = conn.require_tree()?.get("S3").unwrap().clone();
			{
				let _guard = enter(&s3)?;
				assert!(current_site().unwrap().same(site));
			}

			let main = conn.require_main_site()?.clone();
			let folder_registry = conn.create_registry("folder", vec![main.registry().clone()])?;
			let folder = Site::new("folder", SiteKind::Local, folder_registry, Some(main));
			assert!(matches!(enter(&folder), Err(SiteError::Navigation { .. })));
			assert!(current_site().unwrap().same(site));
			Ok(())
		})
		.unwrap();
}
