//! Small helpers shared by every crate: address parsing, unit formatting and
//! the structural validation error raised before any network call.

use alloy_primitives::{Address, U256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Structural errors detected locally, before anything touches the network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Invalid address: {0}")]
	InvalidAddress(String),
	#[error("Invalid identifier: {0}")]
	InvalidIdentifier(String),
	#[error("Invalid authorization: {0}")]
	InvalidAuthorization(String),
	#[error("Unknown chain: {0}")]
	UnknownChain(u64),
	#[error("Invalid chain registry: {0}")]
	InvalidRegistry(String),
	#[error("Invalid key material: {0}")]
	InvalidKey(String),
}

/// Parses a 0x-prefixed (or bare) hex address, rejecting anything that is not
/// exactly 20 bytes.
pub fn parse_address(value: &str) -> Result<Address, ValidationError> {
	let trimmed = value.trim();
	let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
	if hex_part.len() != 40 {
		return Err(ValidationError::InvalidAddress(format!(
			"{trimmed}: expected 40 hex characters, got {}",
			hex_part.len()
		)));
	}
	hex_part
		.parse::<Address>()
		.map_err(|e| ValidationError::InvalidAddress(format!("{trimmed}: {e}")))
}

/// Adds a `0x` prefix unless one is already present.
pub fn with_0x_prefix(value: &str) -> String {
	if value.starts_with("0x") {
		value.to_string()
	} else {
		format!("0x{value}")
	}
}

/// Renders an integer amount of minor units as a decimal string.
///
/// Display only. Never feed the result back into a comparison.
pub fn format_units(amount: U256, decimals: u8) -> String {
	let digits = amount.to_string();
	let decimals = decimals as usize;
	if decimals == 0 {
		return digits;
	}

	let padded = if digits.len() <= decimals {
		format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
	} else {
		digits
	};
	let (whole, fraction) = padded.split_at(padded.len() - decimals);
	let fraction = fraction.trim_end_matches('0');
	if fraction.is_empty() {
		whole.to_string()
	} else {
		format!("{whole}.{fraction}")
	}
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_secs()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_address_accepts_prefixed_and_bare() {
		let with = parse_address("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap();
		let without = parse_address("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap();
		assert_eq!(with, without);
	}

	#[test]
	fn test_parse_address_rejects_short_values() {
		assert!(matches!(
			parse_address("0x1234"),
			Err(ValidationError::InvalidAddress(_))
		));
		assert!(parse_address("0xzz3589fCD6eDb6E08f4c7C32D4f71b54bdA02913").is_err());
	}

	#[test]
	fn test_format_units() {
		assert_eq!(format_units(U256::from(2_000_000u64), 6), "2");
		assert_eq!(format_units(U256::from(10_000u64), 6), "0.01");
		assert_eq!(
			format_units(U256::from(2_000_000_000_000_000u64), 18),
			"0.002"
		);
		assert_eq!(format_units(U256::ZERO, 18), "0");
		assert_eq!(format_units(U256::from(15u64), 0), "15");
	}

	#[test]
	fn test_with_0x_prefix() {
		assert_eq!(with_0x_prefix("abcd"), "0xabcd");
		assert_eq!(with_0x_prefix("0xabcd"), "0xabcd");
	}
}
