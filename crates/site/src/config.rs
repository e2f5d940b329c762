//! Site configuration.
//!
//! Loaded from TOML. Every section and key is optional:
//!
//! ```toml
//! [storage]
//! map_threshold = 30
//! provided_threshold = 30
//! registration_threshold = 30
//!
//! [sync]
//! reserved_roots = "either"   # "name-convention" | "marker" | "either"
//!
//! [layout]
//! main_folder = "dataserver2"
//! site_tree = "++etc++hostsites"
//!
//! [jobs]
//! retries = 3
//! sleep_ms = 0
//! ```

use std::path::Path;
use std::time::Duration;

use hostsite_registry::{DEFAULT_THRESHOLD, Registry, StorageConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
	pub storage: StorageSection,
	pub sync: SyncSection,
	pub layout: LayoutSection,
	pub jobs: JobsSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
	pub map_threshold: usize,
	pub provided_threshold: usize,
	pub registration_threshold: usize,
}

impl Default for StorageSection {
	fn default() -> Self {
		Self {
			map_threshold: DEFAULT_THRESHOLD,
			provided_threshold: DEFAULT_THRESHOLD,
			registration_threshold: DEFAULT_THRESHOLD,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
	pub reserved_roots: ReservedRootPolicy,
}

/// How synchronization recognizes the shared roots of the template DAG,
/// which never get a persistent site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservedRootPolicy {
	/// Names starting or ending with `base`.
	NameConvention,
	/// Registries built with [`RegistryBuilder::reserved`](hostsite_registry::RegistryBuilder::reserved).
	Marker,
	/// Either of the above.
	#[default]
	Either,
}

impl ReservedRootPolicy {
	pub fn is_reserved(self, registry: &Registry) -> bool {
		let by_name = || {
			let name = registry.name();
			name.starts_with("base") || name.ends_with("base")
		};
		match self {
			Self::NameConvention => by_name(),
			Self::Marker => registry.is_reserved(),
			Self::Either => registry.is_reserved() || by_name(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutSection {
	/// Name of the main application folder under the root folder.
	pub main_folder: String,
	/// Name of the site tree inside the main application folder.
	pub site_tree: String,
}

impl Default for LayoutSection {
	fn default() -> Self {
		Self {
			main_folder: "dataserver2".to_string(),
			site_tree: "++etc++hostsites".to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsSection {
	/// Reruns after a store conflict.
	pub retries: u32,
	/// Pause before each rerun, in milliseconds.
	pub sleep_ms: u64,
}

impl Default for JobsSection {
	fn default() -> Self {
		Self { retries: 3, sleep_ms: 0 }
	}
}

impl JobsSection {
	pub fn sleep(&self) -> Option<Duration> {
		(self.sleep_ms > 0).then(|| Duration::from_millis(self.sleep_ms))
	}
}

impl SiteConfig {
	pub fn from_toml_str(source: &str) -> Result<Self> {
		toml::from_str(source).map_err(|e| SiteError::Config {
			path: None,
			message: e.to_string(),
		})
	}

	/// Load configuration from a file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|e| SiteError::Config {
			path: Some(path.to_path_buf()),
			message: e.to_string(),
		})?;
		toml::from_str(&source).map_err(|e| SiteError::Config {
			path: Some(path.to_path_buf()),
			message: e.to_string(),
		})
	}

	pub fn storage_config(&self) -> StorageConfig {
		StorageConfig {
			map_threshold: self.storage.map_threshold,
			provided_threshold: self.storage.provided_threshold,
			registration_threshold: self.storage.registration_threshold,
		}
	}
}
