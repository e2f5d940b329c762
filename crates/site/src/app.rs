use std::sync::Arc;

use hostsite_registry::Registry;
use hostsite_store::{Store, TransactionLoop};

use crate::config::SiteConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::runner::{self, JobOptions, SiteSelector};
use crate::site::Site;
use crate::sync;

/// Process-wide entry point: the global root registry, the store and the
/// configuration.
#[derive(Debug, Clone)]
pub struct Application {
	globals: Registry,
	store: Store,
	config: Arc<SiteConfig>,
}

impl Application {
	pub fn new(globals: Registry, store: Store, config: SiteConfig) -> Self {
		Self {
			globals,
			store,
			config: Arc::new(config),
		}
	}

	pub fn globals(&self) -> &Registry {
		&self.globals
	}

	pub fn store(&self) -> &Store {
		&self.store
	}

	pub fn config(&self) -> &SiteConfig {
		&self.config
	}

	/// Opens a connection on a new transaction.
	pub fn open(&self) -> Result<Connection> {
		Connection::open(&self.store, self.globals.clone(), Arc::clone(&self.config))
	}

	fn transaction_loop(&self, options: &JobOptions) -> TransactionLoop {
		TransactionLoop {
			retries: options.retries.unwrap_or(self.config.jobs.retries),
			sleep: options.sleep.or_else(|| self.config.jobs.sleep()),
		}
	}

	/// Installs the site tree root if needed and mirrors every overlay
	/// template into a persistent site, in one transaction rerun on conflict.
	/// Returns the names of the created sites.
	pub fn synchronize(&self) -> Result<Vec<String>> {
		self.transaction_loop(&JobOptions::default()).run(|attempt| {
			let mut conn = self.open()?;
			conn.install_site_tree_root()?;
			let created = sync::synchronize_host_policies(&mut conn)?;
			let names = created.iter().map(|s| s.name().to_string()).collect();
			conn.commit()?;
			tracing::debug!(attempt, "synchronization committed");
			Ok(names)
		})
	}

	/// Creates the persisted layout if needed. Returns whether anything was
	/// created.
	pub fn install_site_tree_root(&self) -> Result<bool> {
		self.transaction_loop(&JobOptions::default()).run(|_| {
			let mut conn = self.open()?;
			let created = conn.install_site_tree_root()?;
			conn.commit()?;
			Ok(created)
		})
	}

	/// Runs `job` with the selected site current and commits, rerunning the
	/// whole attempt after a store conflict.
	///
	/// # Errors
	///
	/// - [`SiteError::ContextNotInstalled`](crate::SiteError::ContextNotInstalled)
	///   when the site hooks are not installed on this thread.
	/// - Whatever selecting the site or the job fails with.
	pub fn run_job_in_site<T>(
		&self,
		selector: SiteSelector<'_>,
		options: &JobOptions,
		mut job: impl FnMut(&mut Connection, &Site) -> Result<T>,
	) -> Result<T> {
		self.transaction_loop(options).run(|attempt| {
			let mut conn = self.open()?;
			let site = runner::select_site(&conn, selector)?;
			tracing::debug!(job = %options.name(), site = %site.name(), attempt, "running job in site");
			let result = {
				let _guard = runner::activate(&site)?;
				job(&mut conn, &site)?
			};
			if options.side_effect_free {
				conn.abort();
			} else {
				conn.commit()?;
			}
			Ok(result)
		})
	}

	/// Runs `job` once in every host site, parents first, in one transaction
	/// rerun on conflict.
	pub fn run_job_in_all_sites<T>(
		&self,
		options: &JobOptions,
		mut job: impl FnMut(&mut Connection, &Site) -> Result<T>,
	) -> Result<Vec<(String, T)>> {
		self.transaction_loop(options).run(|_| {
			let mut conn = self.open()?;
			let results = runner::run_job_in_all_sites(&mut conn, options.name(), &mut job)?;
			if options.side_effect_free {
				conn.abort();
			} else {
				conn.commit()?;
			}
			Ok(results)
		})
	}
}
