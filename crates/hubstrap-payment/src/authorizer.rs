//! EIP-3009 transfer authorizations signed by the custody account.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, Eip712Domain};
use hubstrap_account::{sign_typed_data, AccountInterface};
use hubstrap_types::{eip712, unix_now, Stablecoin, ValidationError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::{envelope::PaymentEnvelope, PaymentError, RejectionKind};

sol! {
	/// EIP-3009 typed-data struct. Field order and types are part of the type
	/// hash and must not change.
	#[derive(Debug)]
	struct TransferWithAuthorization {
		address from;
		address to;
		uint256 value;
		uint256 validAfter;
		uint256 validBefore;
		bytes32 nonce;
	}
}

/// Longest validity window ever signed.
pub const MAX_VALIDITY_SECS: u64 = 3_600;

/// Settings shared by every authorization one authorizer signs.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
	/// Chain the stablecoin lives on.
	pub chain_id: u64,
	pub token: Stablecoin,
	pub validity_secs: u64,
	/// Network label written into the envelope.
	pub network: String,
	pub version: u8,
}

/// A signed transfer authorization, before envelope packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAuthorization {
	pub from: Address,
	pub to: Address,
	pub value: U256,
	pub valid_after: U256,
	pub valid_before: U256,
	pub nonce: B256,
	pub signature: Bytes,
}

impl PaymentAuthorization {
	fn typed(&self) -> TransferWithAuthorization {
		TransferWithAuthorization {
			from: self.from,
			to: self.to,
			value: self.value,
			validAfter: self.valid_after,
			validBefore: self.valid_before,
			nonce: self.nonce,
		}
	}
}

/// Signs one authorization per protected request.
///
/// Nonces issued by an authorizer are remembered for its lifetime so a nonce
/// can never be handed out twice, even if the random source repeats.
pub struct PaymentAuthorizer {
	account: Arc<dyn AccountInterface>,
	settings: PaymentSettings,
	domain: Eip712Domain,
	issued: Mutex<HashSet<B256>>,
}

impl PaymentAuthorizer {
	pub fn new(
		account: Arc<dyn AccountInterface>,
		settings: PaymentSettings,
	) -> Result<Self, PaymentError> {
		if settings.validity_secs == 0 || settings.validity_secs > MAX_VALIDITY_SECS {
			return Err(ValidationError::InvalidAuthorization(format!(
				"validity must be between 1 and {MAX_VALIDITY_SECS} seconds"
			))
			.into());
		}
		let domain = token_domain(&settings.token, settings.chain_id);
		Ok(Self {
			account,
			settings,
			domain,
			issued: Mutex::new(HashSet::new()),
		})
	}

	pub fn payer(&self) -> Address {
		self.account.address()
	}

	pub fn settings(&self) -> &PaymentSettings {
		&self.settings
	}

	/// The token's EIP-712 domain.
	pub fn domain(&self) -> &Eip712Domain {
		&self.domain
	}

	/// Signs a fresh authorization valid from now for the configured window.
	pub async fn authorize(
		&self,
		payee: Address,
		amount: U256,
	) -> Result<PaymentAuthorization, PaymentError> {
		self.authorize_at(payee, amount, unix_now()).await
	}

	/// As [`Self::authorize`], with an explicit current time.
	pub async fn authorize_at(
		&self,
		payee: Address,
		amount: U256,
		now: u64,
	) -> Result<PaymentAuthorization, PaymentError> {
		let from = self.account.address();
		if payee == Address::ZERO {
			return Err(ValidationError::InvalidAuthorization("payee is the zero address".into()).into());
		}
		if payee == from {
			return Err(ValidationError::InvalidAuthorization("payee equals payer".into()).into());
		}
		if amount.is_zero() {
			return Err(ValidationError::InvalidAuthorization("amount must be positive".into()).into());
		}

		let mut authorization = PaymentAuthorization {
			from,
			to: payee,
			value: amount,
			valid_after: U256::ZERO,
			valid_before: U256::from(now + self.settings.validity_secs),
			nonce: self.fresh_nonce(),
			signature: Bytes::new(),
		};
		authorization.signature =
			sign_typed_data(self.account.as_ref(), &authorization.typed(), &self.domain).await?;

		tracing::debug!(
			payee = %payee,
			amount = %amount,
			valid_before = %authorization.valid_before,
			"Signed payment authorization"
		);
		Ok(authorization)
	}

	/// Signs an authorization and packages it as a header value.
	pub async fn authorize_header(&self, payee: Address, amount: U256) -> Result<String, PaymentError> {
		let authorization = self.authorize(payee, amount).await?;
		self.envelope(&authorization).encode()
	}

	pub fn envelope(&self, authorization: &PaymentAuthorization) -> PaymentEnvelope {
		PaymentEnvelope::new(self.settings.version, &self.settings.network, authorization)
	}

	fn fresh_nonce(&self) -> B256 {
		let mut issued = self.issued.lock().unwrap_or_else(|p| p.into_inner());
		loop {
			let nonce = B256::from(rand::random::<[u8; 32]>());
			if issued.insert(nonce) {
				return nonce;
			}
		}
	}

	#[cfg(test)]
	fn issued_count(&self) -> usize {
		self.issued.lock().map(|s| s.len()).unwrap_or(0)
	}
}

/// EIP-712 domain of a stablecoin deployment.
pub fn token_domain(token: &Stablecoin, chain_id: u64) -> Eip712Domain {
	eip712::domain(token.name.clone(), token.version.clone(), chain_id, token.address)
}

/// Checks an authorization the way a payment verifier does: time window
/// first, then the signature against `domain`.
pub fn verify_authorization(
	authorization: &PaymentAuthorization,
	domain: &Eip712Domain,
	now: u64,
) -> Result<(), PaymentError> {
	let now = U256::from(now);
	if authorization.valid_before <= now {
		return Err(PaymentError::Rejected {
			kind: RejectionKind::Expired,
			detail: "authorization validBefore is in the past".into(),
		});
	}
	if authorization.valid_after > now {
		return Err(PaymentError::Rejected {
			kind: RejectionKind::InvalidPayload,
			detail: "authorization is not yet valid".into(),
		});
	}

	let signer = eip712::recover_signer(&authorization.typed(), domain, &authorization.signature)
		.map_err(|e| PaymentError::Rejected {
			kind: RejectionKind::InvalidPayload,
			detail: e.to_string(),
		})?;
	if signer != authorization.from {
		return Err(PaymentError::Rejected {
			kind: RejectionKind::InvalidPayload,
			detail: format!("invalid signature: recovered {signer}"),
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;
	use hubstrap_account::{LocalWallet, MockAccountInterface};
	use hubstrap_types::SecretString;
	use proptest::prelude::*;

	const TEST_PRIVATE_KEY: &str =
		"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const PAYEE: Address = address!("00000000000000000000000000000000000000aa");

	fn usdc() -> Stablecoin {
		Stablecoin {
			address: address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
			name: "USD Coin".into(),
			version: "2".into(),
			decimals: 6,
		}
	}

	fn settings() -> PaymentSettings {
		PaymentSettings {
			chain_id: 8453,
			token: usdc(),
			validity_secs: 3_600,
			network: "base".into(),
			version: 1,
		}
	}

	fn authorizer() -> PaymentAuthorizer {
		let wallet = LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap();
		PaymentAuthorizer::new(Arc::new(wallet), settings()).unwrap()
	}

	#[tokio::test]
	async fn test_authorization_verifies_under_token_domain() {
		let authorizer = authorizer();
		let now = 1_700_000_000;
		let auth = authorizer
			.authorize_at(PAYEE, U256::from(1_000u64), now)
			.await
			.unwrap();

		assert_eq!(auth.valid_after, U256::ZERO);
		assert_eq!(auth.valid_before, U256::from(now + 3_600));
		assert_eq!(auth.signature.len(), 65);
		verify_authorization(&auth, authorizer.domain(), now).unwrap();
	}

	#[tokio::test]
	async fn test_wrong_token_version_is_rejected() {
		let authorizer = authorizer();
		let now = 1_700_000_000;
		let auth = authorizer
			.authorize_at(PAYEE, U256::from(1_000u64), now)
			.await
			.unwrap();

		let mut other = usdc();
		other.version = "1".into();
		let err = verify_authorization(&auth, &token_domain(&other, 8453), now).unwrap_err();
		assert!(matches!(
			err,
			PaymentError::Rejected {
				kind: RejectionKind::InvalidPayload,
				..
			}
		));
	}

	#[tokio::test]
	async fn test_expired_authorization_is_rejected() {
		let authorizer = authorizer();
		let signed_at = 1_700_000_000;
		let auth = authorizer
			.authorize_at(PAYEE, U256::from(1_000u64), signed_at)
			.await
			.unwrap();

		let err = verify_authorization(&auth, authorizer.domain(), signed_at + 3_600).unwrap_err();
		assert!(matches!(
			err,
			PaymentError::Rejected {
				kind: RejectionKind::Expired,
				..
			}
		));
	}

	#[tokio::test]
	async fn test_valid_before_is_always_in_the_future() {
		let authorizer = authorizer();
		let before = unix_now();
		let auth = authorizer.authorize(PAYEE, U256::from(1u64)).await.unwrap();
		assert!(auth.valid_before >= U256::from(before + 3_600));
	}

	#[tokio::test]
	async fn test_structural_errors_never_reach_the_signer() {
		let mut account = MockAccountInterface::new();
		account
			.expect_address()
			.returning(|| address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
		account.expect_sign_hash().never();
		let authorizer = PaymentAuthorizer::new(Arc::new(account), settings()).unwrap();

		for (payee, amount) in [
			(Address::ZERO, U256::from(1u64)),
			(PAYEE, U256::ZERO),
			(address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"), U256::from(1u64)),
		] {
			let err = authorizer.authorize(payee, amount).await.unwrap_err();
			assert!(matches!(
				err,
				PaymentError::Invalid(ValidationError::InvalidAuthorization(_))
			));
		}
	}

	#[test]
	fn test_rejects_validity_window_over_an_hour() {
		let wallet = LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap();
		let mut long = settings();
		long.validity_secs = 3_601;
		assert!(PaymentAuthorizer::new(Arc::new(wallet), long).is_err());
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(16))]

		#[test]
		fn prop_nonces_never_repeat(count in 2usize..24) {
			let runtime = tokio::runtime::Builder::new_current_thread()
				.build()
				.unwrap();
			let authorizer = authorizer();
			let nonces = runtime.block_on(async {
				let mut nonces = HashSet::new();
				for _ in 0..count {
					let auth = authorizer
						.authorize_at(PAYEE, U256::from(1_000u64), 1_700_000_000)
						.await
						.unwrap();
					nonces.insert(auth.nonce);
				}
				nonces
			});
			prop_assert_eq!(nonces.len(), count);
			prop_assert_eq!(authorizer.issued_count(), count);
		}
	}
}
