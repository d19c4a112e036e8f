//! Self-signed delegation of a signer key.
//!
//! The custody account signs a `SignedKeyRequest` naming its own identifier
//! as the requester. The signature is bound to the validator's EIP-712 domain,
//! so the same bytes do not verify under any other name, version, chain or
//! contract.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, Eip712Domain};
use hubstrap_account::{sign_typed_data, AccountInterface};
use hubstrap_types::{eip712, Fid, SignerPublicKey, ValidationError};

use crate::{contracts::fid_word, IdentityError};

sol! {
	struct SignedKeyRequest {
		uint256 requestFid;
		bytes key;
		uint256 deadline;
	}
}

/// Lifetime of a delegation signature.
pub const DELEGATION_VALIDITY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationAttestation {
	pub fid: Fid,
	pub public_key: SignerPublicKey,
	/// Unix seconds after which the validator refuses the request.
	pub deadline: u64,
	/// 65-byte signature by the identity owner.
	pub signature: Bytes,
}

impl DelegationAttestation {
	/// Signs a request for `public_key` on behalf of `fid`, valid until
	/// `now + 24h`.
	pub async fn sign(
		account: &dyn AccountInterface,
		domain: &Eip712Domain,
		fid: Fid,
		public_key: SignerPublicKey,
		now: u64,
	) -> Result<Self, IdentityError> {
		let deadline = now + DELEGATION_VALIDITY_SECS;
		let request = typed_request(fid, &public_key, deadline);
		let signature = sign_typed_data(account, &request, domain).await?;
		Ok(Self {
			fid,
			public_key,
			deadline,
			signature,
		})
	}

	/// Checks that `owner` signed this attestation under `domain`.
	pub fn verify(&self, domain: &Eip712Domain, owner: Address) -> Result<(), ValidationError> {
		let request = typed_request(self.fid, &self.public_key, self.deadline);
		let signer = eip712::recover_signer(&request, domain, &self.signature)?;
		if signer != owner {
			return Err(ValidationError::InvalidAuthorization(format!(
				"delegation signed by {signer}, expected {owner}"
			)));
		}
		Ok(())
	}

	pub fn is_expired(&self, now: u64) -> bool {
		now >= self.deadline
	}
}

fn typed_request(fid: Fid, public_key: &SignerPublicKey, deadline: u64) -> SignedKeyRequest {
	SignedKeyRequest {
		requestFid: fid_word(fid),
		key: Bytes::copy_from_slice(public_key.as_bytes()),
		deadline: U256::from(deadline),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{test_support::TEST_PRIVATE_KEY, IdentityContracts};
	use hubstrap_account::LocalWallet;
	use hubstrap_types::SecretString;

	fn wallet() -> LocalWallet {
		LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap()
	}

	#[tokio::test]
	async fn test_attestation_verifies_under_its_domain() {
		let wallet = wallet();
		let domain = IdentityContracts::optimism().validator_domain();

		let attestation = DelegationAttestation::sign(
			&wallet,
			&domain,
			Fid(1234),
			SignerPublicKey([9u8; 32]),
			1_700_000_000,
		)
		.await
		.unwrap();

		assert_eq!(attestation.deadline, 1_700_086_400);
		assert_eq!(attestation.signature.len(), 65);
		attestation.verify(&domain, wallet.address()).unwrap();
		assert!(!attestation.is_expired(1_700_000_001));
		assert!(attestation.is_expired(1_700_086_400));
	}

	#[tokio::test]
	async fn test_attestation_does_not_replay_across_domains() {
		let wallet = wallet();
		let contracts = IdentityContracts::optimism();
		let domain = contracts.validator_domain();
		let attestation = DelegationAttestation::sign(
			&wallet,
			&domain,
			Fid(1234),
			SignerPublicKey([9u8; 32]),
			1_700_000_000,
		)
		.await
		.unwrap();

		let other_chain = IdentityContracts {
			chain_id: 8453,
			..contracts.clone()
		};
		let other_version = IdentityContracts {
			validator_eip712_version: "2".into(),
			..contracts.clone()
		};
		let other_contract = IdentityContracts {
			signed_key_request_validator: Address::repeat_byte(0x11),
			..contracts
		};

		for replay in [other_chain, other_version, other_contract] {
			assert!(attestation
				.verify(&replay.validator_domain(), wallet.address())
				.is_err());
		}
	}

	#[tokio::test]
	async fn test_tampered_key_fails_verification() {
		let wallet = wallet();
		let domain = IdentityContracts::optimism().validator_domain();
		let mut attestation = DelegationAttestation::sign(
			&wallet,
			&domain,
			Fid(7),
			SignerPublicKey([1u8; 32]),
			1_700_000_000,
		)
		.await
		.unwrap();

		attestation.public_key = SignerPublicKey([2u8; 32]);
		assert!(attestation.verify(&domain, wallet.address()).is_err());
	}
}
