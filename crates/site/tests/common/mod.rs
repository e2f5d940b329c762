#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use hostsite_registry::{COMPONENTS, Component, Registry};
use hostsite_site::{Application, NEW_LOCAL_SITE, NewLocalSite, SiteConfig};
use hostsite_store::Store;

/// Global root plus the overlay chain `base -> S1 -> S2`, and `S3` beside
/// `S2`.
pub struct World {
	pub app: Application,
	pub globals: Registry,
	pub base: Registry,
	pub s1: Registry,
	pub s2: Registry,
	pub s3: Registry,
}

pub fn template(globals: &Registry, name: &str, base: &Registry) -> Registry {
	let template = Registry::builder(name).base(base.clone()).build().unwrap();
	globals
		.register_utility(Component::Registry(template.clone()), &COMPONENTS, name)
		.unwrap();
	template
}

pub fn world_with(config: SiteConfig) -> World {
	let globals = Registry::global("global");
	let base = template(&globals, "base", &globals);
	let s1 = template(&globals, "S1", &base);
	let s2 = template(&globals, "S2", &s1);
	let s3 = template(&globals, "S3", &s1);
	World {
		app: Application::new(globals.clone(), Store::new(), config),
		globals,
		base,
		s1,
		s2,
		s3,
	}
}

pub fn world() -> World {
	world_with(SiteConfig::default())
}

/// `kind(name)` of every registry in `registries`.
pub fn describe(registries: &[Registry]) -> Vec<String> {
	registries.iter().map(ToString::to_string).collect()
}

/// Records the name of every site announced through [`NEW_LOCAL_SITE`].
pub fn record_new_sites(globals: &Registry) -> Arc<Mutex<Vec<String>>> {
	let log = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&log);
	let handler = Component::callable(move |objects| {
		if let Some(event) = objects.first().and_then(|o| o.downcast_ref::<NewLocalSite>()) {
			sink.lock().unwrap().push(event.site.name().to_string());
		}
		None
	});
	globals
		.register_handler(handler, std::slice::from_ref(&*NEW_LOCAL_SITE), "test")
		.unwrap();
	log
}
