//! EIP-712 helpers shared by the payment, delegation and name-proof signers.
//!
//! Struct hashing itself is done by `alloy_sol_types::SolStruct`; this module
//! only builds domains and recovers signers so every crate constructs them the
//! same way.

use alloy_primitives::{Address, Signature, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use std::borrow::Cow;

use crate::utils::ValidationError;

/// Builds a full `(name, version, chainId, verifyingContract)` domain.
pub fn domain(
	name: impl Into<String>,
	version: impl Into<String>,
	chain_id: u64,
	verifying_contract: Address,
) -> Eip712Domain {
	Eip712Domain::new(
		Some(Cow::Owned(name.into())),
		Some(Cow::Owned(version.into())),
		Some(U256::from(chain_id)),
		Some(verifying_contract),
		None,
	)
}

/// Final `0x1901 || domainSeparator || structHash` digest for `value`.
pub fn signing_hash<T: SolStruct>(value: &T, domain: &Eip712Domain) -> B256 {
	value.eip712_signing_hash(domain)
}

/// Parses a 65-byte `r || s || v` signature.
pub fn parse_signature(bytes: &[u8]) -> Result<Signature, ValidationError> {
	if bytes.len() != 65 {
		return Err(ValidationError::InvalidAuthorization(format!(
			"signature must be 65 bytes, got {}",
			bytes.len()
		)));
	}
	Signature::try_from(bytes)
		.map_err(|e| ValidationError::InvalidAuthorization(format!("signature: {e}")))
}

/// Recovers the address that signed `value` under `domain`.
pub fn recover_signer<T: SolStruct>(
	value: &T,
	domain: &Eip712Domain,
	signature: &[u8],
) -> Result<Address, ValidationError> {
	let signature = parse_signature(signature)?;
	signature
		.recover_address_from_prehash(&signing_hash(value, domain))
		.map_err(|e| ValidationError::InvalidAuthorization(format!("recovery failed: {e}")))
}
