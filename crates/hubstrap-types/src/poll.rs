//! Bounded polling shared by bridge confirmation, receipt waits and indexer
//! sync.
//!
//! Every wait in the workspace goes through [`poll_until`] with an explicit
//! [`PollPolicy`]; there is no unbounded loop anywhere. Timeouts are checked
//! between probes, so a probe that is already in flight is allowed to finish.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Interval, attempt cap and wall-clock cap for one polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
	#[serde(with = "duration_ms")]
	pub interval: Duration,
	#[serde(with = "duration_ms")]
	pub timeout: Duration,
	pub max_attempts: u32,
}

impl PollPolicy {
	pub fn new(interval: Duration, timeout: Duration) -> Self {
		let intervals = timeout.as_millis() / interval.as_millis().max(1);
		Self {
			interval,
			timeout,
			max_attempts: u32::try_from(intervals)
				.unwrap_or(u32::MAX)
				.saturating_add(1),
		}
	}

	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts.max(1);
		self
	}
}

/// Result of a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
	Ready { value: T, attempts: u32 },
	TimedOut { attempts: u32, last_error: Option<String> },
}

impl<T> PollOutcome<T> {
	pub fn is_ready(&self) -> bool {
		matches!(self, Self::Ready { .. })
	}

	pub fn attempts(&self) -> u32 {
		match self {
			Self::Ready { attempts, .. } | Self::TimedOut { attempts, .. } => *attempts,
		}
	}

	pub fn into_value(self) -> Option<T> {
		match self {
			Self::Ready { value, .. } => Some(value),
			Self::TimedOut { .. } => None,
		}
	}
}

/// Calls `probe` until it yields `Some`, the attempt cap is hit, or the
/// timeout elapses.
///
/// Probe errors are not fatal: they are logged, remembered as `last_error`,
/// and the loop carries on until the policy is exhausted.
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, mut probe: F) -> PollOutcome<T>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<Option<T>, E>>,
	E: std::fmt::Display,
{
	let started = Instant::now();
	let mut last_error = None;
	let mut attempts = 0;

	loop {
		attempts += 1;
		match probe(attempts).await {
			Ok(Some(value)) => return PollOutcome::Ready { value, attempts },
			Ok(None) => {},
			Err(e) => {
				tracing::debug!(attempt = attempts, error = %e, "Poll probe failed");
				last_error = Some(e.to_string());
			},
		}

		if attempts >= policy.max_attempts || started.elapsed() + policy.interval > policy.timeout
		{
			return PollOutcome::TimedOut {
				attempts,
				last_error,
			};
		}

		tokio::time::sleep(policy.interval).await;
	}
}

mod duration_ms {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
