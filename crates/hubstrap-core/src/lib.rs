//! End-to-end bootstrap of a funded identity with an active signer.
//!
//! [`BootstrapContext`] wires every component from a [`hubstrap_config::Config`]
//! and a custody account. [`BootstrapOrchestrator`] drives the components in
//! order (balances, funding, registration, delegation, username, sync and a
//! first post) and always hands back a [`BootstrapReport`], including the
//! steps that completed before a failure. [`CredentialStore`] persists what
//! the caller decides to keep; the orchestrator itself never writes secrets.

use hubstrap_config::ConfigError;
use hubstrap_delivery::DeliveryError;
use hubstrap_funding::FundingError;
use hubstrap_hub::HubError;
use hubstrap_identity::IdentityError;
use hubstrap_payment::PaymentError;
use thiserror::Error;

pub mod context;
pub mod orchestrator;
pub mod store;

pub use context::BootstrapContext;
pub use orchestrator::{
	BootstrapOptions, BootstrapOrchestrator, BootstrapReport, IdentityStatus, SignerStatus, Stage,
	StageFailure,
};
pub use store::{CredentialRecord, CredentialStore, FileCredentialStore, StoreError};

/// Errors raised while wiring components or running a single step.
#[derive(Debug, Error)]
pub enum BootstrapError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error(transparent)]
	Payment(#[from] PaymentError),
	#[error(transparent)]
	Funding(#[from] FundingError),
	#[error(transparent)]
	Identity(#[from] IdentityError),
	#[error(transparent)]
	Hub(#[from] HubError),
	#[error(transparent)]
	Store(#[from] StoreError),
}
