//! On-chain identity bootstrap.
//!
//! Three pieces live here: the [`IdentityRegistrar`] that claims an
//! identifier for the custody account, the [`SignerKeyIssuer`] that creates
//! an Ed25519 signer and authorizes it through a self-signed delegation, and
//! the name registry client used for usernames and mention resolution.

use alloy_primitives::Address;
use alloy_sol_types::Eip712Domain;
use hubstrap_account::AccountError;
use hubstrap_delivery::DeliveryError;
use hubstrap_types::{eip712, ValidationError};
use thiserror::Error;

pub mod attestation;
pub mod contracts;
pub mod names;
pub mod registrar;
pub mod signer;

/// In-memory identity contracts for tests in this and dependent crates.
#[cfg(any(test, feature = "testing"))]
pub mod test_support;

pub use attestation::DelegationAttestation;
pub use names::{
	validate_name, NameClaim, NameRecord, NameRegistryClient, NameRegistryInterface, UsernameService,
};
#[cfg(feature = "testing")]
pub use names::MockNameRegistryInterface;
pub use registrar::{IdentityRegistrar, Registration};
pub use signer::{Delegation, IssuedSigner, SignerKeyIssuer};

/// Errors that can occur while registering an identity or its signer.
#[derive(Debug, Error)]
pub enum IdentityError {
	#[error("Insufficient funds: {0}")]
	InsufficientFunds(String),
	#[error("Chain error: {0}")]
	Chain(#[from] DeliveryError),
	#[error("No identity registered for {0}")]
	NoIdentity(Address),
	/// The validator could not encode the delegation metadata.
	#[error("Metadata encoding failed: {0}")]
	Encoding(String),
	#[error("Signing failed: {0}")]
	Signing(#[from] AccountError),
	#[error(transparent)]
	Invalid(#[from] ValidationError),
	#[error("Name registry error: {0}")]
	NameRegistry(String),
	#[error("Name {0} is already taken")]
	NameTaken(String),
	#[error("Failed to decode {0}")]
	Decode(String),
}

/// Addresses of the identity contracts on the registration chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContracts {
	pub chain_id: u64,
	pub id_gateway: Address,
	pub id_registry: Address,
	pub key_gateway: Address,
	pub key_registry: Address,
	pub signed_key_request_validator: Address,
	pub validator_eip712_name: String,
	pub validator_eip712_version: String,
}

impl IdentityContracts {
	/// Domain the delegation attestation is signed under.
	pub fn validator_domain(&self) -> Eip712Domain {
		eip712::domain(
			self.validator_eip712_name.clone(),
			self.validator_eip712_version.clone(),
			self.chain_id,
			self.signed_key_request_validator,
		)
	}

	/// Mainnet deployment on Optimism.
	pub fn optimism() -> Self {
		Self {
			chain_id: 10,
			id_gateway: alloy_primitives::address!("00000000Fc25870C6eD6b6c7E41Fb078b7656f69"),
			id_registry: alloy_primitives::address!("00000000Fc6c5F01Fc30151999387Bb99A9f489b"),
			key_gateway: alloy_primitives::address!("00000000fC56947c7E7183f8Ca4B62398CaAdf0B"),
			key_registry: alloy_primitives::address!("00000000Fc1237824fb747aBDE0FF18990E59b7e"),
			signed_key_request_validator: alloy_primitives::address!(
				"00000000FC700472606ED4fA22623Acf62c60553"
			),
			validator_eip712_name: "Farcaster SignedKeyRequestValidator".into(),
			validator_eip712_version: "1".into(),
		}
	}
}
