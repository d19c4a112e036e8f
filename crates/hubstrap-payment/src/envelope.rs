//! Wire format of the payment header and of the server's 402 challenge.
//!
//! Every numeric authorization field travels as a decimal string; only the
//! protocol version is a JSON number. Getting this wrong still produces a
//! well-formed header, which the verifier then rejects.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{authorizer::PaymentAuthorization, PaymentError};

pub const EXACT_SCHEME: &str = "exact";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEnvelope {
	#[serde(rename = "x402Version")]
	pub version: u8,
	pub scheme: String,
	pub network: String,
	pub payload: ExactPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactPayload {
	/// 0x-prefixed 65-byte signature.
	pub signature: String,
	pub authorization: AuthorizationFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationFields {
	pub from: String,
	pub to: String,
	pub value: String,
	pub valid_after: String,
	pub valid_before: String,
	/// 0x-prefixed 32-byte nonce.
	pub nonce: String,
}

impl PaymentEnvelope {
	pub fn new(version: u8, network: &str, authorization: &PaymentAuthorization) -> Self {
		Self {
			version,
			scheme: EXACT_SCHEME.into(),
			network: network.into(),
			payload: ExactPayload {
				signature: format!("0x{}", hex::encode(&authorization.signature)),
				authorization: AuthorizationFields {
					from: authorization.from.to_checksum(None),
					to: authorization.to.to_checksum(None),
					value: authorization.value.to_string(),
					valid_after: authorization.valid_after.to_string(),
					valid_before: authorization.valid_before.to_string(),
					nonce: format!("0x{}", hex::encode(authorization.nonce)),
				},
			},
		}
	}

	/// Base64 of the JSON encoding; the header value.
	pub fn encode(&self) -> Result<String, PaymentError> {
		let json = serde_json::to_vec(self).map_err(|e| PaymentError::Encoding(e.to_string()))?;
		Ok(STANDARD.encode(json))
	}

	pub fn decode(header: &str) -> Result<Self, PaymentError> {
		let json = STANDARD
			.decode(header.trim())
			.map_err(|e| PaymentError::Encoding(format!("payment header is not base64: {e}")))?;
		serde_json::from_slice(&json).map_err(|e| PaymentError::Encoding(e.to_string()))
	}
}

/// Body of a 402 response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
	#[serde(default)]
	pub x402_version: Option<u8>,
	#[serde(default)]
	pub error: Option<String>,
	#[serde(default)]
	pub accepts: Vec<PaymentRequirements>,
}

/// One way of paying that a server accepts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
	pub scheme: String,
	pub network: String,
	pub max_amount_required: String,
	pub pay_to: String,
	#[serde(default)]
	pub asset: Option<String>,
	#[serde(default)]
	pub max_timeout_seconds: Option<u64>,
}
