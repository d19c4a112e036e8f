//! Chain-agnostic transaction request and receipt.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

pub type TransactionHash = B256;

/// Transaction to be signed and submitted by the delivery layer.
///
/// Nonce, fees and chain id filling are left to the delivery implementation,
/// which submits one transaction per chain at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub chain_id: u64,
	pub to: Address,
	pub data: Bytes,
	pub value: U256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_limit: Option<u64>,
}

impl Transaction {
	pub fn call(chain_id: u64, to: Address, data: impl Into<Bytes>) -> Self {
		Self {
			chain_id,
			to,
			data: data.into(),
			value: U256::ZERO,
			gas_limit: None,
		}
	}

	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}

	pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
		self.gas_limit = Some(gas_limit);
		self
	}
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	pub success: bool,
	#[serde(default)]
	pub gas_used: u64,
}
