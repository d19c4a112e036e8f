//! Point-in-time balance snapshots across the chain registry.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Native and stablecoin balance on one chain, in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBalance {
	pub native: U256,
	pub stable: U256,
}

impl ChainBalance {
	pub fn new(native: U256, stable: U256) -> Self {
		Self { native, stable }
	}
}

/// Balances of one account across every chain that answered.
///
/// Chains whose reads failed appear in `errors` instead of `balances`; the
/// planner treats them as empty. A snapshot is never reused across steps that
/// move funds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
	pub balances: BTreeMap<u64, ChainBalance>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub errors: BTreeMap<u64, String>,
	/// Unix seconds at which the reads were assembled.
	pub taken_at: u64,
}

impl BalanceSnapshot {
	pub fn new(taken_at: u64) -> Self {
		Self {
			taken_at,
			..Default::default()
		}
	}

	pub fn insert(&mut self, chain_id: u64, balance: ChainBalance) {
		self.errors.remove(&chain_id);
		self.balances.insert(chain_id, balance);
	}

	pub fn record_error(&mut self, chain_id: u64, error: impl Into<String>) {
		self.errors.insert(chain_id, error.into());
	}

	/// Balance on `chain_id`, zero when the chain is missing or failed.
	pub fn get(&self, chain_id: u64) -> ChainBalance {
		self.balances.get(&chain_id).copied().unwrap_or_default()
	}

	pub fn native(&self, chain_id: u64) -> U256 {
		self.get(chain_id).native
	}

	pub fn stable(&self, chain_id: u64) -> U256 {
		self.get(chain_id).stable
	}

	pub fn is_partial(&self) -> bool {
		!self.errors.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_missing_chain_reads_as_zero() {
		let mut snapshot = BalanceSnapshot::new(0);
		snapshot.record_error(10, "rpc timeout");
		assert_eq!(snapshot.get(10), ChainBalance::default());
		assert!(snapshot.is_partial());
	}

	#[test]
	fn test_insert_clears_previous_error() {
		let mut snapshot = BalanceSnapshot::new(0);
		snapshot.record_error(8453, "boom");
		snapshot.insert(8453, ChainBalance::new(U256::from(1u64), U256::from(2u64)));
		assert!(!snapshot.is_partial());
		assert_eq!(snapshot.stable(8453), U256::from(2u64));
	}
}
