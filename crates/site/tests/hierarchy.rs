#![allow(unused_crate_dependencies)]

mod common;

use common::world;
use hostsite_registry::{Component, Tag};
use hostsite_site::SiteError;
use hostsite_site::hierarchy::{component_hierarchy, component_hierarchy_names};
use hostsite_site::localutility::{install_utility, uninstall_utility};

#[test]
fn test_component_hierarchy_stops_at_unmirrored_templates() {
	let w = world();
	w.app.synchronize().unwrap();
	let conn = w.app.open().unwrap();
	let tree = conn.require_tree().unwrap();
	let ps2 = tree.get("S2").unwrap();

	let hierarchy = component_hierarchy(ps2, tree).unwrap();
	assert_eq!(hierarchy, vec![w.s2.clone(), w.s1.clone()]);
	assert_eq!(component_hierarchy_names(ps2, tree, false).unwrap(), ["S2", "S1"]);
	assert_eq!(component_hierarchy_names(ps2, tree, true).unwrap(), ["S1", "S2"]);
	assert!(component_hierarchy(conn.require_main_site().unwrap(), tree).unwrap().is_empty());
}

#[test]
fn test_install_and_uninstall_local_utility() {
	let w = world();
	w.app.synchronize().unwrap();
	let conn = w.app.open().unwrap();
	let tree = conn.require_tree().unwrap();
	let ps1 = tree.get("S1").unwrap().registry();
	let ps2 = tree.get("S2").unwrap().registry();
	let icatalog = Tag::named("ICatalog");

	let parent = Component::value("catalog");
	let child = Component::value("catalog");
	install_utility(parent.clone(), "catalog", &icatalog, ps1).unwrap();
	install_utility(child.clone(), "catalog", &icatalog, ps2).unwrap();
	assert!(ps2.get_utility(&icatalog, "").unwrap().same(&child));
	assert!(ps2.query_next_utility(&child, &icatalog).unwrap().unwrap().same(&parent));
	assert!(ps1.query_next_utility(&parent, &icatalog).unwrap().is_none());

	assert!(uninstall_utility("catalog", &icatalog, ps2).unwrap());
	assert!(ps2.content("catalog").is_none());
	assert!(ps2.get_utility(&icatalog, "").unwrap().same(&parent));
	assert!(!uninstall_utility("catalog", &icatalog, ps2).unwrap());
}

#[test]
fn test_uninstall_refuses_a_replaced_utility() {
	let w = world();
	w.app.synchronize().unwrap();
	let conn = w.app.open().unwrap();
	let ps1 = conn.require_tree().unwrap().get("S1").unwrap().registry();
	let icatalog = Tag::named("ICatalog");

	install_utility(Component::value("catalog"), "catalog", &icatalog, ps1).unwrap();
	ps1.register_utility(Component::value("replacement"), &icatalog, "").unwrap();

	let err = uninstall_utility("catalog", &icatalog, ps1).unwrap_err();
	assert!(matches!(err, SiteError::UtilityMismatch { ref name, .. } if name == "catalog"));
	assert!(ps1.content("catalog").is_some());
}
