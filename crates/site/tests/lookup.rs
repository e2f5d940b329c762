#![allow(unused_crate_dependencies)]

mod common;

use common::{describe, world};
use hostsite_site::{SiteError, SiteKind, SiteMapping};
use pretty_assertions::assert_eq;

#[test]
fn test_persistent_site_wins_over_template() {
	let w = world();
	w.app.synchronize().unwrap();
	let conn = w.app.open().unwrap();

	let site = conn.site_for_names(&["unknown.com", "S2"]).unwrap();
	assert_eq!(site.kind(), SiteKind::HostPolicy);
	assert!(site.same(conn.require_tree().unwrap().get("S2").unwrap()));
}

/// Without a persistent counterpart the host gets a transient site layered
/// over the main application folder.
#[test]
fn test_transient_site_for_unsynchronized_host() {
	let w = world();
	w.app.install_site_tree_root().unwrap();
	let mut conn = w.app.open().unwrap();
	let main = conn.require_main_site().unwrap().clone();

	let site = conn.site_for_names(&["S1"]).unwrap();
	assert_eq!(site.kind(), SiteKind::Transient);
	assert_eq!(site.name(), "S1");
	assert!(site.parent().unwrap().same(&main));
	assert_eq!(describe(&site.registry().bases()), ["global(S1)", "persistent(dataserver2)"]);
	assert_eq!(site.registry().host_overlay(), Some(&w.s1));

	match conn.insert_host_site(site.clone()) {
		Err(SiteError::TransientSite { name }) => assert_eq!(name, "S1"),
		other => panic!("expected a transient site error, got {other:?}"),
	}
	assert!(conn.require_tree().unwrap().is_empty());
}

#[test]
fn test_alias_redirects_before_direct_lookup() {
	let w = world();
	w.app.synchronize().unwrap();
	SiteMapping::new("alias.com", "S1").register(&w.globals).unwrap();
	SiteMapping::new("S2", "S3").register(&w.globals).unwrap();
	SiteMapping::new("broken.com", "nowhere").register(&w.globals).unwrap();
	let conn = w.app.open().unwrap();

	assert_eq!(conn.site_for_names(&["alias.com"]).unwrap().name(), "S1");
	assert_eq!(conn.site_for_names(&["S2"]).unwrap().name(), "S3");
	assert_eq!(conn.site_for_names(&["broken.com", "S1"]).unwrap().name(), "S1");
}

/// Mappings are not chased: a mapping to a mapped name resolves the
/// intermediate name's own template.
#[test]
fn test_alias_is_not_transitive() {
	let w = world();
	w.app.synchronize().unwrap();
	SiteMapping::new("a.com", "b.com").register(&w.globals).unwrap();
	SiteMapping::new("b.com", "S2").register(&w.globals).unwrap();
	let conn = w.app.open().unwrap();

	let main = conn.require_main_site().unwrap();
	assert!(conn.site_for_names(&["a.com"]).unwrap().same(main));
	assert_eq!(conn.site_for_names(&["b.com"]).unwrap().name(), "S2");
}

#[test]
fn test_fallback_for_empty_or_unknown_names() {
	let w = world();
	w.app.synchronize().unwrap();
	let conn = w.app.open().unwrap();
	let main = conn.require_main_site().unwrap();

	assert!(conn.site_for_names(&[]).unwrap().same(main));
	assert!(conn.site_for_names(&["", "S1"]).unwrap().same(main));
	assert!(conn.site_for_names(&["nope.com", "also.nope"]).unwrap().same(main));
}

#[test]
fn test_mapping_target_site_and_host_site_lookup() {
	let w = world();
	w.app.synchronize().unwrap();
	let conn = w.app.open().unwrap();
	let tree = conn.require_tree().unwrap();

	let mapping = SiteMapping::new("alias.com", "S2");
	assert!(mapping.target_site(tree).unwrap().same(tree.get("S2").unwrap()));
	let missing = SiteMapping::new("alias.com", "S9").target_site(tree).unwrap_err();
	assert!(matches!(missing, SiteError::SiteNotFound { ref name } if name == "S9"));

	assert!(tree.get_host_site("S1", false).unwrap().is_some());
	assert!(tree.get_host_site("S9", true).unwrap().is_none());
	assert!(matches!(tree.get_host_site("S9", false), Err(SiteError::SiteNotFound { .. })));
}
