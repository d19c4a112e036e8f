//! Per-request payment authorizations.
//!
//! Protected API calls carry no API key. Each one instead carries a freshly
//! signed EIP-3009 `TransferWithAuthorization` for a fixed stablecoin amount,
//! wrapped in a JSON envelope, base64-encoded and sent in a request header.
//! An authorization is single-use, valid for at most an hour, and never
//! stored.

use alloy_primitives::U256;
use hubstrap_account::AccountError;
use hubstrap_types::ValidationError;
use std::fmt;
use thiserror::Error;

pub mod authorizer;
pub mod client;
pub mod envelope;
pub mod transport;

pub use authorizer::{verify_authorization, PaymentAuthorization, PaymentAuthorizer, PaymentSettings};
pub use client::{PaidRequest, PaymentTerms, ProtectedClient, ProtectedResponse};
pub use envelope::{PaymentEnvelope, PaymentRequirements};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody, ReqwestTransport};

#[cfg(feature = "testing")]
pub use transport::MockHttpTransport;

/// Why a verifier refused a payment, as far as its detail text tells.
///
/// Format problems and balance problems look the same at the HTTP level;
/// only the detail distinguishes them, and they need different handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
	InsufficientFunds,
	Expired,
	InvalidPayload,
	Unknown,
}

impl RejectionKind {
	/// Classifies a verifier error string.
	pub fn classify(detail: &str) -> Self {
		let detail = detail.to_ascii_lowercase();
		if detail.contains("insufficient") {
			Self::InsufficientFunds
		} else if detail.contains("expired")
			|| detail.contains("valid_before")
			|| detail.contains("validbefore")
		{
			Self::Expired
		} else if detail.contains("invalid")
			|| detail.contains("signature")
			|| detail.contains("malformed")
			|| detail.contains("payload")
		{
			Self::InvalidPayload
		} else {
			Self::Unknown
		}
	}

	/// Whether signing a fresh authorization and retrying can help.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Expired)
	}
}

impl fmt::Display for RejectionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Self::InsufficientFunds => "insufficient funds",
			Self::Expired => "expired authorization",
			Self::InvalidPayload => "invalid payload",
			Self::Unknown => "unknown",
		};
		f.write_str(label)
	}
}

/// Errors that can occur while authorizing or sending a protected request.
#[derive(Debug, Error)]
pub enum PaymentError {
	#[error(transparent)]
	Invalid(#[from] ValidationError),
	#[error("Signing failed: {0}")]
	Signing(#[from] AccountError),
	#[error("Encoding failed: {0}")]
	Encoding(String),
	#[error("HTTP error: {0}")]
	Http(String),
	#[error("Payment rejected ({kind}): {detail}")]
	Rejected { kind: RejectionKind, detail: String },
	#[error("Server asks for {requested} units, limit is {limit}")]
	AmountExceedsLimit { requested: U256, limit: U256 },
	#[error("Unsupported payment requirements: {0}")]
	Unsupported(String),
}
