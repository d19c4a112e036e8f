//! Signer key issuance.
//!
//! A signer is an Ed25519 key the hub accepts messages from. It is authorized
//! on-chain through the key gateway with a request the identity signs for
//! itself. The ABI encoding of that request is produced by the validator
//! contract's own `encodeMetadata`, never assembled locally: the struct holds
//! a dynamic `bytes` field and a hand-laid encoding without its offset word
//! is accepted as a transaction but rejected by the key registry.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use ed25519_dalek::SigningKey;
use hubstrap_account::AccountInterface;
use hubstrap_delivery::DeliveryService;
use hubstrap_types::{
	unix_now, Fid, Identity, SecretString, SignerKeyPair, SignerPublicKey, Transaction,
	TransactionHash,
};
use rand::rngs::OsRng;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::{
	attestation::DelegationAttestation,
	contracts::{
		fid_word, lookup_identity, IKeyGateway, IKeyRegistry, ISignedKeyRequestValidator,
		KEY_STATE_ADDED, KEY_TYPE_ED25519, METADATA_TYPE_SIGNED_KEY_REQUEST,
	},
	IdentityContracts, IdentityError,
};

/// A signer authorized by this run. Holds the only copy of the private key.
#[derive(Debug, Clone)]
pub struct IssuedSigner {
	pub identity: Identity,
	pub key_pair: SignerKeyPair,
	pub attestation: DelegationAttestation,
	pub tx_hash: TransactionHash,
}

#[derive(Debug, Clone)]
pub enum Delegation {
	Issued(IssuedSigner),
	/// The supplied signer is already active; nothing was sent.
	AlreadyDelegated {
		identity: Identity,
		public_key: SignerPublicKey,
	},
}

impl Delegation {
	pub fn identity(&self) -> Identity {
		match self {
			Self::Issued(issued) => issued.identity,
			Self::AlreadyDelegated { identity, .. } => *identity,
		}
	}

	pub fn public_key(&self) -> SignerPublicKey {
		match self {
			Self::Issued(issued) => issued.key_pair.public_key,
			Self::AlreadyDelegated { public_key, .. } => *public_key,
		}
	}
}

/// Generates a fresh Ed25519 key pair from the OS random source.
pub fn generate_key_pair() -> SignerKeyPair {
	let signing_key = SigningKey::generate(&mut OsRng);
	let seed = Zeroizing::new(signing_key.to_bytes());
	SignerKeyPair {
		public_key: SignerPublicKey(signing_key.verifying_key().to_bytes()),
		private_key: SecretString::new(format!("0x{}", hex::encode(*seed))),
	}
}

pub struct SignerKeyIssuer {
	delivery: Arc<DeliveryService>,
	account: Arc<dyn AccountInterface>,
	contracts: IdentityContracts,
}

impl SignerKeyIssuer {
	pub fn new(
		delivery: Arc<DeliveryService>,
		account: Arc<dyn AccountInterface>,
		contracts: IdentityContracts,
	) -> Self {
		Self {
			delivery,
			account,
			contracts,
		}
	}

	async fn require_identity(&self) -> Result<Identity, IdentityError> {
		let owner = self.account.address();
		lookup_identity(&self.delivery, &self.contracts, owner)
			.await?
			.ok_or(IdentityError::NoIdentity(owner))
	}

	/// Whether `key` is currently an active signer for `fid`.
	pub async fn is_active(&self, fid: Fid, key: &SignerPublicKey) -> Result<bool, IdentityError> {
		let call = IKeyRegistry::keyDataOfCall {
			fid: fid_word(fid),
			key: Bytes::copy_from_slice(key.as_bytes()),
		};
		let data = self
			.delivery
			.call(Transaction::call(
				self.contracts.chain_id,
				self.contracts.key_registry,
				call.abi_encode(),
			))
			.await?;
		let key_data = IKeyRegistry::keyDataOfCall::abi_decode_returns(&data)
			.map_err(|e| IdentityError::Decode(format!("keyDataOf response: {e}")))?;
		Ok(key_data.state == KEY_STATE_ADDED && key_data.keyType == KEY_TYPE_ED25519)
	}

	/// Issues a new signer unless `existing` is already active for the
	/// account's identity.
	pub async fn ensure(&self, existing: Option<SignerPublicKey>) -> Result<Delegation, IdentityError> {
		let identity = self.require_identity().await?;
		if let Some(public_key) = existing {
			if self.is_active(identity.fid, &public_key).await? {
				tracing::info!(fid = %identity.fid, %public_key, "Signer already active");
				return Ok(Delegation::AlreadyDelegated {
					identity,
					public_key,
				});
			}
			tracing::warn!(fid = %identity.fid, %public_key, "Stored signer is not active, issuing a new one");
		}
		self.issue_for(identity).await.map(Delegation::Issued)
	}

	/// Generates and authorizes a new signer for the account's identity.
	pub async fn issue(&self) -> Result<IssuedSigner, IdentityError> {
		let identity = self.require_identity().await?;
		self.issue_for(identity).await
	}

	async fn issue_for(&self, identity: Identity) -> Result<IssuedSigner, IdentityError> {
		let key_pair = generate_key_pair();
		let attestation = DelegationAttestation::sign(
			self.account.as_ref(),
			&self.contracts.validator_domain(),
			identity.fid,
			key_pair.public_key,
			unix_now(),
		)
		.await?;
		let metadata = self.encode_metadata(&attestation, identity.owner).await?;

		let call = IKeyGateway::addCall {
			keyType: KEY_TYPE_ED25519,
			key: Bytes::copy_from_slice(key_pair.public_key.as_bytes()),
			metadataType: METADATA_TYPE_SIGNED_KEY_REQUEST,
			metadata,
		};
		tracing::info!(fid = %identity.fid, public_key = %key_pair.public_key, "Authorizing signer key");
		let receipt = self
			.delivery
			.deliver(Transaction::call(
				self.contracts.chain_id,
				self.contracts.key_gateway,
				call.abi_encode(),
			))
			.await?;
		tracing::info!(fid = %identity.fid, tx_hash = %receipt.hash, "Signer key authorized");

		Ok(IssuedSigner {
			identity,
			key_pair,
			attestation,
			tx_hash: receipt.hash,
		})
	}

	async fn encode_metadata(
		&self,
		attestation: &DelegationAttestation,
		owner: Address,
	) -> Result<Bytes, IdentityError> {
		let call = ISignedKeyRequestValidator::encodeMetadataCall {
			metadata: ISignedKeyRequestValidator::SignedKeyRequestMetadata {
				requestFid: fid_word(attestation.fid),
				requestSigner: owner,
				signature: attestation.signature.clone(),
				deadline: U256::from(attestation.deadline),
			},
		};
		let data = self
			.delivery
			.call(Transaction::call(
				self.contracts.chain_id,
				self.contracts.signed_key_request_validator,
				call.abi_encode(),
			))
			.await
			.map_err(|e| IdentityError::Encoding(format!("validator call failed: {e}")))?;
		let metadata = ISignedKeyRequestValidator::encodeMetadataCall::abi_decode_returns(&data)
			.map_err(|e| IdentityError::Encoding(format!("validator response: {e}")))?;
		if metadata.is_empty() {
			return Err(IdentityError::Encoding("validator returned empty metadata".into()));
		}
		Ok(metadata)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{FakeChain, OWNER, TEST_PRIVATE_KEY};
	use alloy_sol_types::SolValue;
	use ed25519_dalek::{Signer, Verifier};
	use hubstrap_account::LocalWallet;

	fn issuer(chain: &Arc<FakeChain>) -> SignerKeyIssuer {
		let wallet = LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap();
		SignerKeyIssuer::new(chain.delivery(), Arc::new(wallet), chain.contracts.clone())
	}

	fn registered_chain() -> Arc<FakeChain> {
		let chain = FakeChain::new(U256::ZERO, U256::ZERO);
		chain.set_fid(77);
		chain
	}

	#[test]
	fn test_generated_key_pair_signs_for_its_public_key() {
		let pair = generate_key_pair();
		let seed = hex::decode(pair.private_key.expose_secret().trim_start_matches("0x")).unwrap();
		let seed: [u8; 32] = seed.try_into().unwrap();
		let signing_key = SigningKey::from_bytes(&seed);

		assert_eq!(signing_key.verifying_key().to_bytes(), pair.public_key.0);
		let signature = signing_key.sign(b"hello");
		assert!(signing_key.verifying_key().verify(b"hello", &signature).is_ok());
		assert_ne!(generate_key_pair().public_key, pair.public_key);
	}

	#[tokio::test]
	async fn test_issue_adds_key_with_validator_metadata() {
		let chain = registered_chain();
		let issuer = issuer(&chain);

		let issued = issuer.issue().await.unwrap();

		assert_eq!(issued.identity.fid, Fid(77));
		let sent = chain.sent();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].to, chain.contracts.key_gateway);
		assert_eq!(sent[0].chain_id, 10);

		let add = IKeyGateway::addCall::abi_decode(&sent[0].data).unwrap();
		assert_eq!(add.keyType, 1);
		assert_eq!(add.metadataType, 1);
		assert_eq!(add.key.as_ref(), issued.key_pair.public_key.as_bytes());

		let metadata =
			ISignedKeyRequestValidator::SignedKeyRequestMetadata::abi_decode(&add.metadata).unwrap();
		assert_eq!(metadata.requestFid, U256::from(77u64));
		assert_eq!(metadata.requestSigner, OWNER);
		assert_eq!(metadata.signature, issued.attestation.signature);
		issued
			.attestation
			.verify(&chain.contracts.validator_domain(), OWNER)
			.unwrap();

		assert!(issuer
			.is_active(Fid(77), &issued.key_pair.public_key)
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_issue_without_identity_fails_before_sending() {
		let chain = FakeChain::new(U256::ZERO, U256::ZERO);

		let err = issuer(&chain).issue().await.unwrap_err();

		assert!(matches!(err, IdentityError::NoIdentity(owner) if owner == OWNER));
		assert!(chain.sent().is_empty());
	}

	#[tokio::test]
	async fn test_validator_failure_is_an_encoding_error() {
		let chain = registered_chain();
		chain.fail_validator();

		let err = issuer(&chain).issue().await.unwrap_err();

		assert!(matches!(err, IdentityError::Encoding(_)));
		assert!(chain.sent().is_empty());
	}

	#[tokio::test]
	async fn test_active_existing_signer_is_kept() {
		let chain = registered_chain();
		let existing = SignerPublicKey([5u8; 32]);
		chain.add_key(existing.as_bytes());

		let delegation = issuer(&chain).ensure(Some(existing)).await.unwrap();

		assert!(matches!(delegation, Delegation::AlreadyDelegated { .. }));
		assert_eq!(delegation.public_key(), existing);
		assert!(chain.sent().is_empty());
	}

	#[tokio::test]
	async fn test_inactive_existing_signer_is_replaced() {
		let chain = registered_chain();
		let stale = SignerPublicKey([6u8; 32]);

		let delegation = issuer(&chain).ensure(Some(stale)).await.unwrap();

		assert!(matches!(delegation, Delegation::Issued(_)));
		assert_ne!(delegation.public_key(), stale);
		assert_eq!(chain.sent().len(), 1);
	}
}
