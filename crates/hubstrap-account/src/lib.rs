//! Custody account abstraction.
//!
//! The custody account is the one secp256k1 key that controls funds and the
//! identity on every chain. It is always supplied by the caller; nothing in
//! the workspace generates one. Signing is exposed at the digest level so the
//! payment, delegation and name-proof code can all reuse one EIP-712 path.

use alloy_primitives::{Address, Bytes, Signature, B256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolStruct};
use async_trait::async_trait;
use hubstrap_types::{eip712, SecretString};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

pub use implementations::local::LocalWallet;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Signing capability of the custody account.
#[async_trait]
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait AccountInterface: Send + Sync {
	/// Address that owns funds and the identity.
	fn address(&self) -> Address;

	/// Signs a 32-byte digest without any prefixing.
	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError>;

	/// Transaction signer handed to the delivery layer's wallet.
	fn signer(&self) -> PrivateKeySigner;

	/// Raw key material, for persisting credentials the caller asked to keep.
	fn export_private_key(&self) -> SecretString;
}

/// Signs `value` as EIP-712 typed data under `domain`.
///
/// Returns the 65-byte `r || s || v` encoding with `v` in {27, 28}, the form
/// accepted by token contracts and the key validator alike.
pub async fn sign_typed_data<T: SolStruct + Sync>(
	account: &dyn AccountInterface,
	value: &T,
	domain: &Eip712Domain,
) -> Result<Bytes, AccountError> {
	let digest = eip712::signing_hash(value, domain);
	let signature = account.sign_hash(&digest).await?;
	Ok(Bytes::from(signature.as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, U256};
	use alloy_sol_types::sol;

	sol! {
		struct Claim {
			string name;
			uint256 timestamp;
			address owner;
		}
	}

	const TEST_PRIVATE_KEY: &str =
		"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	#[tokio::test]
	async fn test_typed_data_signature_recovers_to_account() {
		let wallet = LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap();
		let domain = eip712::domain(
			"Test",
			"1",
			1,
			address!("e3be01d99baa8db9905b33a3ca391238234b79d1"),
		);
		let claim = Claim {
			name: "alice".into(),
			timestamp: U256::from(1_700_000_000u64),
			owner: wallet.address(),
		};

		let signature = sign_typed_data(&wallet, &claim, &domain).await.unwrap();
		assert_eq!(signature.len(), 65);
		assert!(signature[64] == 27 || signature[64] == 28);

		let recovered = eip712::recover_signer(&claim, &domain, &signature).unwrap();
		assert_eq!(recovered, wallet.address());
	}

	#[test]
	fn test_account_error_display() {
		let err = AccountError::InvalidKey("bad key".to_string());
		assert_eq!(err.to_string(), "Invalid key: bad key");
	}
}
