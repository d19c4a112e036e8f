//! Moving funds to where the bootstrap needs them.
//!
//! Three pieces: [`ChainBalanceReader`] takes a snapshot across every
//! configured chain, [`FundingStrategyPlanner`] turns a snapshot into an
//! ordered list of swaps and bridges, and [`FundRouter`] executes that list
//! against a [`SwapInterface`] and a [`BridgeInterface`].

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use hubstrap_delivery::DeliveryError;
use hubstrap_types::{Asset, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod balances;
pub mod contracts;
pub mod planner;
pub mod router;

pub mod implementations {
	pub mod across;
	pub mod uniswap;
}

pub use balances::ChainBalanceReader;
pub use implementations::{across::AcrossBridge, uniswap::UniswapSwap};
pub use planner::FundingStrategyPlanner;
pub use router::{ExecutionReport, FundRouter, StepOutcome, StepStatus, TierAttempt};

/// Errors that can occur while planning or executing funding steps.
#[derive(Debug, Error)]
pub enum FundingError {
	/// No source can cover a step or the plan as a whole.
	#[error("Insufficient funds: {0}")]
	InsufficientFunds(String),
	#[error("Chain error: {0}")]
	Chain(#[from] DeliveryError),
	/// Every configured fee tier reverted.
	#[error("Swap failed on chain {chain_id}: all fee tiers {tiers:?} reverted")]
	SwapExhausted { chain_id: u64, tiers: Vec<u32> },
	#[error("Chain {chain_id} has no {component} configured")]
	Unsupported {
		chain_id: u64,
		component: &'static str,
	},
	#[error(transparent)]
	Invalid(#[from] ValidationError),
	#[error("Failed to decode {0}")]
	Decode(String),
}

impl FundingError {
	/// True when the underlying failure was contract execution, which makes
	/// it worth trying another fee tier.
	pub fn is_revert(&self) -> bool {
		matches!(self, Self::Chain(e) if e.is_revert())
	}
}

/// One swap attempt through a single pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRequest {
	pub chain_id: u64,
	pub from: Asset,
	pub to: Asset,
	pub amount_in: U256,
	/// Pool fee in hundredths of a basis point.
	pub fee_tier: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
	pub tx_hash: B256,
	/// Minimum output enforced on chain; zero when unprotected.
	pub min_amount_out: U256,
}

/// A cross-chain transfer of the native asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeRequest {
	pub from_chain: u64,
	pub to_chain: u64,
	pub input_amount: U256,
	/// Amount the relayer must deliver, after its fee.
	pub output_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeDeposit {
	pub tx_hash: B256,
	pub fill_deadline: u64,
}

/// Decentralized-exchange integration used by swap steps.
#[async_trait]
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait SwapInterface: Send + Sync {
	/// Swaps `amount_in` through the pool at `fee_tier` and waits for the
	/// receipt. A pool that does not exist or cannot fill surfaces as a
	/// revert.
	async fn swap(&self, request: SwapRequest) -> Result<SwapReceipt, FundingError>;
}

/// Bridge integration used by bridge steps.
#[async_trait]
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait BridgeInterface: Send + Sync {
	/// Submits the deposit on the source chain and waits for its receipt.
	/// Landing on the destination is observed separately.
	async fn deposit(&self, request: BridgeRequest) -> Result<BridgeDeposit, FundingError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_only_reverts_are_tier_recoverable() {
		assert!(FundingError::Chain(DeliveryError::Reverted("STF".into())).is_revert());
		assert!(!FundingError::Chain(DeliveryError::Network("timeout".into())).is_revert());
		assert!(!FundingError::InsufficientFunds("x".into()).is_revert());
	}
}
