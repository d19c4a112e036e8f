//! Hub access for a bootstrapped identity.
//!
//! Reads and writes against the hub's HTTP API are protected requests, each
//! paid for with a fresh authorization by [`hubstrap_payment::ProtectedClient`].
//! This crate encodes and signs application messages, waits for the hub to
//! learn about a new identity and submits casts, links and profile data.

use hubstrap_payment::PaymentError;
use hubstrap_types::ValidationError;
use thiserror::Error;

pub mod cast;
pub mod client;
pub mod mentions;
pub mod message;
pub mod sync;

pub use cast::{CastDraft, CastSubmitter, Submission, Verification};
pub use client::{HubClient, HubInterface};
#[cfg(feature = "testing")]
pub use client::MockHubInterface;
pub use mentions::{parse_mentions, MentionSpan};
pub use message::{
	CastAddBody, CastId, CastParent, FarcasterNetwork, MessageBody, MessageData, MessageHash,
	MessageSigner, SignedMessage, UserDataKind,
};
pub use sync::{SyncOutcome, SyncWaiter};

/// Errors that can occur while talking to the hub.
#[derive(Debug, Error)]
pub enum HubError {
	/// The protected request could not be paid for, or the payment was
	/// rejected.
	#[error(transparent)]
	Payment(#[from] PaymentError),
	#[error("Hub returned {status}: {detail}")]
	Http { status: u16, detail: String },
	#[error("Failed to decode {0}")]
	Decode(String),
	#[error(transparent)]
	Invalid(#[from] ValidationError),
}
