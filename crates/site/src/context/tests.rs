use std::sync::{Arc, Mutex};

use hostsite_registry::{Registry, StorageConfig, StorageFormat};
use pretty_assertions::assert_eq;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

use super::*;

struct Fixture {
	global: Registry,
	host: Registry,
	main: Site,
	/// Transient site for `host`, as host name lookup builds it.
	transient: Site,
	parent: Site,
	child: Site,
	sibling: Site,
	folder: Site,
}

fn persistent(name: &str, bases: Vec<Registry>) -> Registry {
	Registry::builder(name).persistent().bases(bases).build().unwrap()
}

fn fixture() -> Fixture {
	let global = Registry::global("global");
	let host = Registry::builder("example.com").base(global.clone()).build().unwrap();
	let main_registry = persistent("dataserver2", vec![global.clone()]);
	let main = Site::new("dataserver2", SiteKind::MainApplication, main_registry.clone(), None);
	let transient_registry = Registry::builder("example.com")
		.transient()
		.host_overlay(host.clone())
		.bases([host.clone(), main_registry.clone()])
		.build()
		.unwrap();
	let transient = Site::new("example.com", SiteKind::Transient, transient_registry, Some(main.clone()));

	let host_site = |name: &str, bases: Vec<Registry>| {
		Site::new(name, SiteKind::HostPolicy, persistent(name, bases), Some(main.clone()))
	};
	let parent = host_site("parent.com", vec![main_registry.clone()]);
	let child = host_site("child.com", vec![parent.registry().clone()]);
	let sibling = host_site("sibling.com", vec![main_registry.clone()]);
	let folder = Site::new("folder", SiteKind::Local, persistent("folder", vec![main_registry]), Some(main.clone()));

	Fixture {
		global,
		host,
		main,
		transient,
		parent,
		child,
		sibling,
		folder,
	}
}

fn current_name() -> Option<String> {
	current_site().map(|s| s.name().to_string())
}

#[test]
fn test_enter_with_nothing_current() {
	let fx = fixture();
	let guard = enter(&fx.parent).unwrap();
	assert!(current_site().unwrap().same(&fx.parent));
	drop(guard);
	assert!(current_site().is_none());
}

#[test]
fn test_sentinels_never_become_current() {
	let fx = fixture();
	{
		let _guard = enter(&fx.main).unwrap();
		assert!(current_site().is_none());
	}

	let _outer = set_site(Some(fx.main.clone()));
	let _inner = enter(&fx.sibling).unwrap();
	assert_eq!(current_name().as_deref(), Some("dataserver2"));
}

#[test]
fn test_entering_the_current_site_is_a_noop() {
	let fx = fixture();
	let _outer = enter(&fx.parent).unwrap();
	let _inner = enter(&fx.parent).unwrap();
	assert!(!current_site().unwrap().is_traversed());
	assert!(compose(Some(&fx.parent), &fx.parent.unwrapped()).unwrap().is_none());
}

/// Traversing from a transient host site into a persistent site keeps the
/// host overlay at the very end of the composed order.
#[test]
fn test_host_overlay_is_appended_to_traversed_site() {
	let fx = fixture();
	let _outer = enter(&fx.transient).unwrap();
	let _inner = enter(&fx.child).unwrap();

	let current = current_site().unwrap();
	assert!(current.is_traversed());
	assert!(current.same(&fx.child));
	assert_eq!(current.kind(), SiteKind::HostPolicy);
	assert_eq!(current.registry().host_overlay(), Some(&fx.host));
	assert_eq!(current.registry().bases(), vec![fx.parent.registry().clone(), fx.host.clone()]);
	assert!(!current.registry().bases().contains(fx.child.own_registry()));

	let order: Vec<String> = current.registry().order().unwrap().iter().map(|r| r.to_string()).collect();
	assert_eq!(
		order,
		[
			"transient(child.com)",
			"persistent(parent.com)",
			"persistent(dataserver2)",
			"global(example.com)",
			"global(global)",
		]
	);
}

#[test]
fn test_overlay_already_in_bases_is_not_repeated() {
	let fx = fixture();
	let with_host = Site::new(
		"hosted",
		SiteKind::Local,
		persistent("hosted", vec![fx.host.clone(), fx.main.registry().clone()]),
		None,
	);
	let composed = compose(Some(&fx.transient), &with_host).unwrap().unwrap();
	assert_eq!(composed.registry().bases(), with_host.registry().bases());
}

/// Sibling host sites traverse freely and keep the overlay of the site
/// that was current.
#[test]
fn test_sibling_host_site_keeps_current_overlay() {
	let fx = fixture();
	let _host = enter(&fx.transient).unwrap();
	let _first = enter(&fx.parent).unwrap();
	let _second = enter(&fx.sibling).unwrap();

	let current = current_site().unwrap();
	assert!(current.same(&fx.parent));
	assert_eq!(current.registry().host_overlay(), Some(&fx.host));
}

/// Only unrelated host sites traverse freely. A parent and its child are
/// composed like any other site.
#[test]
fn test_related_host_sites_fall_through() {
	let fx = fixture();
	assert!(compose(Some(&fx.parent), &fx.sibling).unwrap().is_none());
	assert!(compose(Some(&fx.child), &fx.sibling).unwrap().is_none());
	assert!(matches!(
		compose(Some(&fx.parent), &fx.child),
		Err(SiteError::Navigation { .. })
	));
	assert!(matches!(
		compose(Some(&fx.child), &fx.parent),
		Err(SiteError::Navigation { .. })
	));

	let _host = enter(&fx.transient).unwrap();
	let _parent = enter(&fx.parent).unwrap();
	let _child = enter(&fx.child).unwrap();
	let current = current_site().unwrap();
	assert!(current.same(&fx.child) && current.is_traversed());
	assert_eq!(current.registry().host_overlay(), Some(&fx.host));
	let order: Vec<String> = current.registry().order().unwrap().iter().map(|r| r.name().to_string()).collect();
	assert_eq!(order, ["child.com", "parent.com", "dataserver2", "example.com", "global"]);
}

#[test]
fn test_unrelated_site_fails_navigation() {
	let fx = fixture();
	let _guard = enter(&fx.sibling).unwrap();
	match enter(&fx.folder) {
		Err(SiteError::Navigation { current, target }) => {
			assert_eq!((current.as_str(), target.as_str()), ("sibling.com", "folder"));
		}
		other => panic!("expected navigation error, got {:?}", other.map(|_| ())),
	}
	assert_eq!(current_name().as_deref(), Some("sibling.com"));
}

#[test]
fn test_guard_restores_on_error_exit() {
	fn fails_inside(site: &Site) -> Result<()> {
		let _guard = set_site(Some(site.clone()));
		assert!(current_site().is_some_and(|s| s.same(site)));
		Err(SiteError::SiteNotFound { name: "x".into() })
	}

	let fx = fixture();
	let _outer = set_site(Some(fx.sibling.clone()));
	assert!(fails_inside(&fx.transient).is_err());
	assert_eq!(current_name().as_deref(), Some("sibling.com"));

	let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
		with_site(&fx.parent, || panic!("job failed"));
	}));
	assert!(result.is_err());
	assert_eq!(current_name().as_deref(), Some("sibling.com"));
}

#[test]
fn test_current_registry_requires_hooks() {
	let fx = fixture();
	let parent = fx.parent.clone();
	std::thread::spawn(move || {
		let _guard = set_site(Some(parent.clone()));
		assert!(matches!(current_registry(), Err(SiteError::ContextNotInstalled)));
		install_hooks();
		assert_eq!(current_registry().unwrap().as_ref(), Some(parent.registry()));
		uninstall_hooks();
		assert!(!hooks_installed());
	})
	.join()
	.unwrap();
}

#[test]
fn test_context_is_per_thread() {
	let fx = fixture();
	let _guard = set_site(Some(fx.parent.clone()));
	let seen = std::thread::spawn(|| current_site().is_none()).join().unwrap();
	assert!(seen);
}

#[derive(Clone, Default)]
struct WarnCapture(Arc<Mutex<Vec<String>>>);

struct MessageVisitor(String);

impl Visit for MessageVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
		if field.name() == "registry" {
			self.0 = format!("{value:?}");
		}
	}
}

impl<S: Subscriber> Layer<S> for WarnCapture {
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		if *event.metadata().level() == Level::WARN {
			let mut visitor = MessageVisitor(String::new());
			event.record(&mut visitor);
			self.0.lock().unwrap().push(visitor.0);
		}
	}
}

#[test]
fn test_activating_unmigrated_registry_warns() {
	let fx = fixture();
	let stored = persistent("legacy.com", vec![fx.global.clone()]);
	let mut record = stored.to_record().unwrap();
	record.format = StorageFormat::Legacy;
	let legacy = Registry::restore(record, vec![fx.global.clone()], StorageConfig::default(), 11);
	let site = Site::new("legacy.com", SiteKind::HostPolicy, legacy.clone(), None);

	let capture = WarnCapture::default();
	let subscriber = tracing_subscriber::registry().with(capture.clone());
	tracing::subscriber::with_default(subscriber, || {
		with_site(&site, || {});
		legacy.rebuild().unwrap();
		with_site(&site, || {});
	});
	assert_eq!(*capture.0.lock().unwrap(), ["legacy.com"]);
}
