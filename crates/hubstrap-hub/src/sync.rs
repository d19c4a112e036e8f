//! Waiting for the hub to index a new identity and signer.

use hubstrap_types::{poll_until, Identity, PollOutcome, PollPolicy, SignerPublicKey};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{HubError, HubInterface};

/// Advisory result of [`SyncWaiter::wait_for_sync`]. A timeout does not mean
/// later hub calls will fail, only that the hub had not caught up yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
	Synced {
		attempts: u32,
	},
	TimedOut {
		attempts: u32,
		identity_seen: bool,
		last_error: Option<String>,
	},
}

impl SyncOutcome {
	pub fn is_synced(&self) -> bool {
		matches!(self, Self::Synced { .. })
	}
}

pub struct SyncWaiter {
	hub: Arc<dyn HubInterface>,
	policy: PollPolicy,
}

impl SyncWaiter {
	pub fn new(hub: Arc<dyn HubInterface>, policy: PollPolicy) -> Self {
		Self { hub, policy }
	}

	/// Polls until the hub maps the owner to `identity.fid` and lists
	/// `signer` as active, or the policy runs out.
	pub async fn wait_for_sync(&self, identity: &Identity, signer: &SignerPublicKey) -> SyncOutcome {
		let identity_seen = AtomicBool::new(false);
		let hub = &self.hub;
		let seen = &identity_seen;

		let outcome = poll_until(&self.policy, |attempt| async move {
			let indexed = hub.fid_by_address(identity.owner).await?;
			if indexed != Some(identity.fid) {
				tracing::debug!(attempt, fid = %identity.fid, ?indexed, "Identity not indexed yet");
				return Ok::<_, HubError>(None);
			}
			seen.store(true, Ordering::Relaxed);

			let signers = hub.signers_by_fid(identity.fid).await?;
			if !signers.contains(signer) {
				tracing::debug!(attempt, fid = %identity.fid, "Signer not indexed yet");
				return Ok(None);
			}
			Ok(Some(()))
		})
		.await;

		match outcome {
			PollOutcome::Ready { attempts, .. } => {
				tracing::info!(fid = %identity.fid, attempts, "Hub synced");
				SyncOutcome::Synced { attempts }
			},
			PollOutcome::TimedOut {
				attempts,
				last_error,
			} => {
				let identity_seen = identity_seen.load(Ordering::Relaxed);
				tracing::warn!(fid = %identity.fid, attempts, identity_seen, "Hub did not sync before the timeout");
				SyncOutcome::TimedOut {
					attempts,
					identity_seen,
					last_error,
				}
			},
		}
	}
}
