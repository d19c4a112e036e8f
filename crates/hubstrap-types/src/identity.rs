//! Network identity and signer key types.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{secret_string::SecretString, utils::ValidationError};

/// On-chain identity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fid(pub u64);

impl Fid {
	/// Parses an identifier, rejecting zero (the registry's "no identity" value).
	pub fn parse(value: &str) -> Result<Self, ValidationError> {
		let id = value
			.trim()
			.parse::<u64>()
			.map_err(|e| ValidationError::InvalidIdentifier(format!("{value}: {e}")))?;
		if id == 0 {
			return Err(ValidationError::InvalidIdentifier(
				"identifier 0 is reserved".into(),
			));
		}
		Ok(Self(id))
	}

	pub fn get(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for Fid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A registered identity and the address that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	pub fid: Fid,
	pub owner: Address,
}

/// 32-byte Ed25519 public key registered against an identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignerPublicKey(pub [u8; 32]);

impl SignerPublicKey {
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for SignerPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SignerPublicKey({})", self.to_hex())
	}
}

impl fmt::Display for SignerPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl FromStr for SignerPublicKey {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
			.map_err(|e| ValidationError::InvalidKey(format!("signer key: {e}")))?;
		let key: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
			ValidationError::InvalidKey(format!("signer key must be 32 bytes, got {}", v.len()))
		})?;
		Ok(Self(key))
	}
}

impl Serialize for SignerPublicKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for SignerPublicKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// Freshly issued signer key pair.
///
/// The private half is handed to the caller once and is never persisted or
/// logged by the crate that created it.
#[derive(Debug, Clone)]
pub struct SignerKeyPair {
	pub public_key: SignerPublicKey,
	/// Hex-encoded 32-byte Ed25519 seed.
	pub private_key: SecretString,
}
