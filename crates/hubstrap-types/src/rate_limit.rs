//! Per-action rate limiting for application messages.
//!
//! The limiter is a plain value owned by whoever drives the actions (usually
//! the orchestrator or the CLI) and passed by `&mut` into each submission, so
//! two independent sessions never share hidden state.
//!
//! History lives in memory only. Spacing holds between actions driven through
//! the same limiter within one process; a new process, or a fresh clone of an
//! unused limiter, starts with no history and may act immediately.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Kinds of rate-limited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
	Post,
	Reply,
	Follow,
	Profile,
}

impl fmt::Display for ActionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Post => "post",
			Self::Reply => "reply",
			Self::Follow => "follow",
			Self::Profile => "profile",
		};
		f.write_str(name)
	}
}

/// Minimum spacing between two actions of the same kind, tracked in memory
/// for the lifetime of this value.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
	intervals: HashMap<ActionKind, Duration>,
	last: HashMap<ActionKind, Instant>,
}

impl RateLimiter {
	pub fn new(intervals: HashMap<ActionKind, Duration>) -> Self {
		Self {
			intervals,
			last: HashMap::new(),
		}
	}

	/// A limiter that never waits.
	pub fn unlimited() -> Self {
		Self::default()
	}

	/// Time left before `kind` may run again, if any.
	pub fn remaining(&self, kind: ActionKind) -> Option<Duration> {
		let interval = *self.intervals.get(&kind)?;
		let last = self.last.get(&kind)?;
		interval.checked_sub(last.elapsed()).filter(|d| !d.is_zero())
	}

	/// Records that `kind` just ran.
	pub fn record(&mut self, kind: ActionKind) {
		self.last.insert(kind, Instant::now());
	}

	/// Sleeps until `kind` is allowed, then records it.
	pub async fn acquire(&mut self, kind: ActionKind) {
		if let Some(wait) = self.remaining(kind) {
			tracing::debug!(action = %kind, wait_ms = wait.as_millis() as u64, "Rate limited");
			tokio::time::sleep(wait).await;
		}
		self.record(kind);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn limiter() -> RateLimiter {
		RateLimiter::new(HashMap::from([
			(ActionKind::Post, Duration::from_secs(60)),
			(ActionKind::Follow, Duration::from_secs(5)),
		]))
	}

	#[tokio::test(start_paused = true)]
	async fn test_first_action_is_free() {
		let limiter = limiter();
		assert_eq!(limiter.remaining(ActionKind::Post), None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_kinds_are_tracked_independently() {
		let mut limiter = limiter();
		limiter.record(ActionKind::Post);
		assert!(limiter.remaining(ActionKind::Post).is_some());
		assert_eq!(limiter.remaining(ActionKind::Follow), None);
		assert_eq!(limiter.remaining(ActionKind::Profile), None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_history_belongs_to_one_limiter() {
		let template = limiter();
		let mut first = template.clone();
		first.record(ActionKind::Post);

		assert!(first.remaining(ActionKind::Post).is_some());
		assert_eq!(template.clone().remaining(ActionKind::Post), None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_acquire_waits_out_the_interval() {
		let mut limiter = limiter();
		limiter.acquire(ActionKind::Follow).await;
		let before = Instant::now();
		limiter.acquire(ActionKind::Follow).await;
		assert!(before.elapsed() >= Duration::from_secs(5));
	}
}
