//! Built-in mainnet configuration.
//!
//! Optimism (10) is the registration chain, Base (8453) the payment chain and
//! Arbitrum (42161) a fallback funding source.

use alloy_primitives::{address, Address};
use std::collections::BTreeMap;

use crate::{
	ChainConfig, Config, ContractsConfig, FundingConfig, HubConfig, PaymentConfig,
	PollingConfig, RateLimitsConfig, RolesConfig, StablecoinConfig,
};

const WETH_L2: Address = address!("4200000000000000000000000000000000000006");
const SWAP_ROUTER_02: Address = address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45");
const QUOTER_V2: Address = address!("61fFE014bA17989E743c5F6cB21bF9697530B21e");

fn usdc(address: Address) -> StablecoinConfig {
	StablecoinConfig {
		address,
		name: "USD Coin".into(),
		version: "2".into(),
		decimals: 6,
	}
}

fn optimism() -> ChainConfig {
	ChainConfig {
		chain_id: 10,
		native_symbol: "ETH".into(),
		rpc_url: "https://mainnet.optimism.io".into(),
		stablecoin: usdc(address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85")),
		wrapped_native: WETH_L2,
		swap_router: Some(SWAP_ROUTER_02),
		quoter: Some(QUOTER_V2),
		spoke_pool: Some(address!("6f26Bf09B1C792e3228e5467807a900A503c0281")),
	}
}

fn base() -> ChainConfig {
	ChainConfig {
		chain_id: 8453,
		native_symbol: "ETH".into(),
		rpc_url: "https://mainnet.base.org".into(),
		// The token's EIP-712 domain on Base is ("USD Coin", "2").
		stablecoin: usdc(address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913")),
		wrapped_native: WETH_L2,
		swap_router: Some(address!("2626664c2603336E57B271c5C0b26F421741e481")),
		quoter: Some(address!("3d4e44Eb1374240CE5F1B871ab261CD16335B76a")),
		spoke_pool: Some(address!("09aea4b2242abC8bb4BB78D537A67a245A7bEC64")),
	}
}

fn arbitrum() -> ChainConfig {
	ChainConfig {
		chain_id: 42161,
		native_symbol: "ETH".into(),
		rpc_url: "https://arb1.arbitrum.io/rpc".into(),
		stablecoin: usdc(address!("af88d065e77c8cC2239327C5EDb3A432268e5831")),
		wrapped_native: address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
		swap_router: Some(SWAP_ROUTER_02),
		quoter: Some(QUOTER_V2),
		spoke_pool: Some(address!("e35e9842fceaCA96570B734083f4a58e8F7C5f2A")),
	}
}

/// Full mainnet configuration.
pub fn config() -> Config {
	let chains = BTreeMap::from([
		("optimism".to_string(), optimism()),
		("base".to_string(), base()),
		("arbitrum".to_string(), arbitrum()),
	]);

	Config {
		roles: RolesConfig {
			registration_chain: 10,
			payment_chain: 8453,
		},
		chains,
		contracts: ContractsConfig {
			id_gateway: address!("00000000Fc25870C6eD6b6c7E41Fb078b7656f69"),
			id_registry: address!("00000000Fc6c5F01Fc30151999387Bb99A9f489b"),
			key_gateway: address!("00000000fC56947c7E7183f8Ca4B62398CaAdf0B"),
			key_registry: address!("00000000Fc1237824fb747aBDE0FF18990E59b7e"),
			signed_key_request_validator: address!("00000000FC700472606ED4fA22623Acf62c60553"),
			validator_eip712_name: "Farcaster SignedKeyRequestValidator".into(),
			validator_eip712_version: "1".into(),
		},
		funding: FundingConfig::default(),
		payment: PaymentConfig::default(),
		hub: HubConfig::default(),
		polling: PollingConfig::default(),
		rate_limits: RateLimitsConfig::default(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_mainnet_roles_resolve() {
		let config = config();
		assert_eq!(config.chain_by_id(10).map(|(name, _)| name), Some("optimism"));
		assert_eq!(config.chain_by_id(8453).map(|(name, _)| name), Some("base"));
	}

	#[test]
	fn test_mainnet_chain_ids_are_unique() {
		let config = config();
		let mut ids: Vec<u64> = config.chains.values().map(|c| c.chain_id).collect();
		ids.sort_unstable();
		ids.dedup();
		assert_eq!(ids.len(), config.chains.len());
	}
}
