//! In-memory private key wallet.

use alloy_primitives::{Address, Signature, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use hubstrap_types::{with_0x_prefix, SecretString};

use crate::{AccountError, AccountInterface};

/// Wallet holding a secp256k1 key in memory.
#[derive(Debug, Clone)]
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a 32-byte hex private key, with or without `0x`.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key.with_exposed(|key| {
			let bare = key.trim().strip_prefix("0x").unwrap_or(key.trim());
			if bare.len() != 64 {
				return Err(AccountError::InvalidKey(
					"Private key must be 64 hex characters (32 bytes)".into(),
				));
			}
			bare.parse::<PrivateKeySigner>()
				.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {e}")))
		})?;

		tracing::debug!(address = %signer.address(), "Local wallet loaded");
		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
		self.signer
			.sign_hash(hash)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}

	fn signer(&self) -> PrivateKeySigner {
		self.signer.clone()
	}

	fn export_private_key(&self) -> SecretString {
		SecretString::new(with_0x_prefix(&hex::encode(self.signer.to_bytes())))
	}
}
