//! Persistent host sites over hierarchical component registries.
//!
//! A deployment declares one global overlay template per virtual host and
//! registers it in the global registry under
//! [`COMPONENTS`](hostsite_registry::COMPONENTS). This crate mirrors that
//! template DAG into persistent [`Site`]s, keeps track of the active site of
//! each thread and resolves host names to sites.
//!
//! # Modules
//!
//! - [`site`]: sites, the traversed façade and alias records
//! - [`tree`]: the persistent site tree
//! - [`connection`]: the persisted layout, opened inside one store transaction
//! - [`sync`]: mirroring overlay templates into persistent sites
//! - [`context`]: the current site of a thread and traversal composition
//! - [`lookup`]: resolving host names to sites
//! - [`hierarchy`], [`localutility`]: helpers over a site's registry
//! - [`runner`]: running jobs inside sites with commit and retry
//! - [`app`]: the process-wide entry point

pub mod app;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod hierarchy;
pub mod localutility;
pub mod lookup;
pub mod runner;
pub mod site;
pub mod sync;
pub mod tree;

pub use app::Application;
pub use config::{ReservedRootPolicy, SiteConfig};
pub use connection::Connection;
pub use context::{SiteGuard, current_registry, current_site, enter, install_hooks, set_site, uninstall_hooks};
pub use error::{Result, SiteError};
pub use lookup::get_site_for_site_names;
pub use runner::{JobOptions, SiteSelector};
pub use site::{NEW_LOCAL_SITE, NewLocalSite, SITE_MAPPING, Site, SiteKind, SiteMapping};
pub use sync::synchronize_host_policies;
pub use tree::SiteTree;
