use std::fmt;
use std::time::Duration;

use crate::error::StoreError;

/// Errors that may succeed when the whole unit of work is run again.
pub trait Retryable {
	fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
	fn is_retryable(&self) -> bool {
		matches!(self, Self::Conflict { .. })
	}
}

/// Reruns a unit of work after retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionLoop {
	/// Attempts after the first one.
	pub retries: u32,
	/// Pause before each retry.
	pub sleep: Option<Duration>,
}

impl Default for TransactionLoop {
	fn default() -> Self {
		Self::new(3)
	}
}

impl TransactionLoop {
	pub fn new(retries: u32) -> Self {
		Self { retries, sleep: None }
	}

	pub fn with_sleep(mut self, sleep: Duration) -> Self {
		self.sleep = Some(sleep);
		self
	}

	/// Runs `job` with the attempt number, starting at 0, until it succeeds,
	/// fails with an error that is not retryable or runs out of retries.
	pub fn run<T, E>(&self, mut job: impl FnMut(u32) -> Result<T, E>) -> Result<T, E>
	where
		E: Retryable + fmt::Display,
	{
		let mut attempt = 0;
		loop {
			match job(attempt) {
				Err(error) if error.is_retryable() && attempt < self.retries => {
					attempt += 1;
					tracing::warn!(attempt, retries = self.retries, %error, "retrying transaction");
					if let Some(sleep) = self.sleep {
						std::thread::sleep(sleep);
					}
				}
				result => return result,
			}
		}
	}
}
