//! Chain descriptors and the fixed registry of chains the bootstrap operates on.
//!
//! A [`ChainRegistry`] holds between two and five chains. Two of them carry a
//! role: the registration chain (where the identity and signer live and where
//! native balance is required) and the payment chain (where the stablecoin
//! used for protected requests is held). Every other chain is a fallback
//! funding source.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::ValidationError;

/// Minimum number of chains a registry may hold.
pub const MIN_CHAINS: usize = 2;
/// Maximum number of chains a registry may hold.
pub const MAX_CHAINS: usize = 5;

/// Stablecoin deployment on one chain.
///
/// `name` and `version` must match the token's own EIP-712 domain exactly,
/// otherwise transfer authorizations are rejected by the payment verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stablecoin {
	pub address: Address,
	pub name: String,
	pub version: String,
	pub decimals: u8,
}

/// Network descriptor for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
	pub id: u64,
	pub name: String,
	pub native_symbol: String,
	pub rpc_url: String,
	pub stablecoin: Stablecoin,
	/// Wrapped native token used as the swap and bridge leg for native funds.
	pub wrapped_native: Address,
	/// Decentralized exchange router, if swaps are possible on this chain.
	#[serde(default)]
	pub swap_router: Option<Address>,
	/// On-chain quoter paired with `swap_router`.
	#[serde(default)]
	pub quoter: Option<Address>,
	/// Bridge deposit contract.
	#[serde(default)]
	pub spoke_pool: Option<Address>,
}

impl fmt::Display for Chain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.name, self.id)
	}
}

/// Immutable, ordered set of chains with the two role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRegistry {
	chains: Vec<Chain>,
	registration_index: usize,
	payment_index: usize,
}

impl ChainRegistry {
	/// Builds a registry, checking size, uniqueness and role assignment.
	pub fn new(
		chains: Vec<Chain>,
		registration_chain: u64,
		payment_chain: u64,
	) -> Result<Self, ValidationError> {
		if chains.len() < MIN_CHAINS || chains.len() > MAX_CHAINS {
			return Err(ValidationError::InvalidRegistry(format!(
				"expected {MIN_CHAINS}..={MAX_CHAINS} chains, got {}",
				chains.len()
			)));
		}

		for (i, chain) in chains.iter().enumerate() {
			if chains[..i].iter().any(|c| c.id == chain.id) {
				return Err(ValidationError::InvalidRegistry(format!(
					"duplicate chain id {}",
					chain.id
				)));
			}
		}

		if registration_chain == payment_chain {
			return Err(ValidationError::InvalidRegistry(
				"registration and payment chain must differ".into(),
			));
		}

		let position = |role: u64| {
			chains.iter().position(|c| c.id == role).ok_or_else(|| {
				ValidationError::InvalidRegistry(format!(
					"role chain {role} is not in the registry"
				))
			})
		};
		let registration_index = position(registration_chain)?;
		let payment_index = position(payment_chain)?;

		Ok(Self {
			chains,
			registration_index,
			payment_index,
		})
	}

	pub fn get(&self, chain_id: u64) -> Option<&Chain> {
		self.chains.iter().find(|c| c.id == chain_id)
	}

	/// Looks up a chain, turning a miss into a validation error.
	pub fn require(&self, chain_id: u64) -> Result<&Chain, ValidationError> {
		self.get(chain_id)
			.ok_or(ValidationError::UnknownChain(chain_id))
	}

	pub fn iter(&self) -> impl Iterator<Item = &Chain> {
		self.chains.iter()
	}

	pub fn ids(&self) -> Vec<u64> {
		self.chains.iter().map(|c| c.id).collect()
	}

	pub fn registration_chain_id(&self) -> u64 {
		self.registration_chain().id
	}

	pub fn payment_chain_id(&self) -> u64 {
		self.payment_chain().id
	}

	pub fn registration_chain(&self) -> &Chain {
		&self.chains[self.registration_index]
	}

	pub fn payment_chain(&self) -> &Chain {
		&self.chains[self.payment_index]
	}

	/// Chains with no role, in registry order.
	pub fn fallback_chains(&self) -> impl Iterator<Item = &Chain> {
		self.chains
			.iter()
			.enumerate()
			.filter(move |(i, _)| *i != self.registration_index && *i != self.payment_index)
			.map(|(_, c)| c)
	}

	pub fn len(&self) -> usize {
		self.chains.len()
	}

	pub fn is_empty(&self) -> bool {
		self.chains.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::builders::ChainBuilder;

	#[test]
	fn test_registry_rejects_single_chain() {
		let result = ChainRegistry::new(vec![ChainBuilder::new(10).build()], 10, 8453);
		assert!(matches!(result, Err(ValidationError::InvalidRegistry(_))));
	}

	#[test]
	fn test_registry_rejects_duplicates() {
		let result = ChainRegistry::new(
			vec![ChainBuilder::new(10).build(), ChainBuilder::new(10).build()],
			10,
			8453,
		);
		assert!(matches!(result, Err(ValidationError::InvalidRegistry(msg)) if msg.contains("duplicate")));
	}

	#[test]
	fn test_registry_rejects_missing_role() {
		let result = ChainRegistry::new(
			vec![ChainBuilder::new(10).build(), ChainBuilder::new(1).build()],
			10,
			8453,
		);
		assert!(result.is_err());
	}

	#[test]
	fn test_fallback_chains_exclude_roles() {
		let registry = ChainRegistry::new(
			vec![
				ChainBuilder::new(10).build(),
				ChainBuilder::new(8453).build(),
				ChainBuilder::new(42161).build(),
				ChainBuilder::new(1).build(),
			],
			10,
			8453,
		)
		.unwrap();

		let fallbacks: Vec<u64> = registry.fallback_chains().map(|c| c.id).collect();
		assert_eq!(fallbacks, vec![42161, 1]);
		assert_eq!(registry.registration_chain().id, 10);
		assert_eq!(registry.payment_chain().id, 8453);
	}
}
