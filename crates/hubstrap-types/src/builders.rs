//! Builders for tests across the workspace.
//!
//! Defaults describe an Optimism-like registration chain (id 10) and a
//! Base-like payment chain (id 8453); any other id gets placeholder
//! addresses derived from the id.

use alloy_primitives::{address, Address, U256};
use std::collections::BTreeMap;

use crate::{
	balance::{BalanceSnapshot, ChainBalance},
	chain::{Chain, ChainRegistry, Stablecoin},
	strategy::{FundingPolicy, FundingTargets},
};

pub const OPTIMISM: u64 = 10;
pub const BASE: u64 = 8453;

const WRAPPED_NATIVE_L2: Address = address!("4200000000000000000000000000000000000006");

fn placeholder(chain_id: u64, tag: u8) -> Address {
	let mut bytes = [0u8; 20];
	bytes[0] = tag;
	bytes[12..].copy_from_slice(&chain_id.to_be_bytes());
	Address::from(bytes)
}

/// Builder for [`Chain`].
pub struct ChainBuilder {
	chain: Chain,
}

impl ChainBuilder {
	pub fn new(id: u64) -> Self {
		let stablecoin_address = match id {
			OPTIMISM => address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
			BASE => address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
			_ => placeholder(id, 0xcc),
		};
		let name = match id {
			OPTIMISM => "optimism".to_string(),
			BASE => "base".to_string(),
			_ => format!("chain-{id}"),
		};

		Self {
			chain: Chain {
				id,
				name,
				native_symbol: "ETH".into(),
				rpc_url: format!("http://localhost:{}", 8545 + (id % 1000)),
				stablecoin: Stablecoin {
					address: stablecoin_address,
					name: "USD Coin".into(),
					version: "2".into(),
					decimals: 6,
				},
				wrapped_native: WRAPPED_NATIVE_L2,
				swap_router: Some(placeholder(id, 0xaa)),
				quoter: Some(placeholder(id, 0xab)),
				spoke_pool: Some(placeholder(id, 0xbb)),
			},
		}
	}

	pub fn name(mut self, name: &str) -> Self {
		self.chain.name = name.into();
		self
	}

	pub fn rpc_url(mut self, url: &str) -> Self {
		self.chain.rpc_url = url.into();
		self
	}

	pub fn without_swap_router(mut self) -> Self {
		self.chain.swap_router = None;
		self.chain.quoter = None;
		self
	}

	pub fn without_spoke_pool(mut self) -> Self {
		self.chain.spoke_pool = None;
		self
	}

	pub fn build(self) -> Chain {
		self.chain
	}
}

/// Two-chain registry: registration on 10, payment on 8453.
pub fn default_registry() -> ChainRegistry {
	registry_with_fallbacks(&[])
}

/// Registry with the two role chains followed by `fallbacks` in order.
pub fn registry_with_fallbacks(fallbacks: &[u64]) -> ChainRegistry {
	let mut chains = vec![ChainBuilder::new(OPTIMISM).build(), ChainBuilder::new(BASE).build()];
	chains.extend(fallbacks.iter().map(|id| ChainBuilder::new(*id).build()));
	match ChainRegistry::new(chains, OPTIMISM, BASE) {
		Ok(registry) => registry,
		Err(e) => panic!("invalid test registry: {e}"),
	}
}

/// Policy with the documented default thresholds.
pub fn default_policy() -> FundingPolicy {
	FundingPolicy {
		targets: FundingTargets {
			registration_native: U256::from(2_000_000_000_000_000u64),
			payment_stable: U256::from(10_000u64),
		},
		native_gas_reserve: U256::from(100_000_000_000_000u64),
		native_source_min: U256::from(500_000_000_000_000u64),
		stable_source_min: U256::from(1_000_000u64),
		stable_reserve: U256::from(100_000u64),
		native_swap_amount: U256::from(200_000_000_000_000u64),
		relayer_fee_bps: 50,
		fill_deadline_secs: 3_600,
		fee_tiers: vec![500, 3_000],
		max_slippage_bps: None,
	}
}

/// Builder for [`BalanceSnapshot`].
#[derive(Default)]
pub struct SnapshotBuilder {
	balances: BTreeMap<u64, ChainBalance>,
	errors: BTreeMap<u64, String>,
}

impl SnapshotBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn native(mut self, chain_id: u64, amount: u128) -> Self {
		self.balances.entry(chain_id).or_default().native = U256::from(amount);
		self
	}

	pub fn stable(mut self, chain_id: u64, amount: u128) -> Self {
		self.balances.entry(chain_id).or_default().stable = U256::from(amount);
		self
	}

	pub fn failed(mut self, chain_id: u64, error: &str) -> Self {
		self.errors.insert(chain_id, error.into());
		self
	}

	pub fn build(self) -> BalanceSnapshot {
		BalanceSnapshot {
			balances: self.balances,
			errors: self.errors,
			taken_at: 0,
		}
	}
}
