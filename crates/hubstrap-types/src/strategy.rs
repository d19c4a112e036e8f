//! Funding strategy types: targets, policy knobs, and the closed set of steps
//! a plan can contain.
//!
//! All amounts are integer minor units (wei for native assets, 6-decimal
//! units for the stablecoin). Fee and slippage math stays in basis points on
//! `U256`; nothing here touches floating point.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Denominator for basis-point arithmetic.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Which of the two assets tracked per chain a step moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
	Native,
	Stable,
}

impl fmt::Display for Asset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Native => write!(f, "native"),
			Self::Stable => write!(f, "stable"),
		}
	}
}

/// How much a step moves.
///
/// `BalanceMinus` is resolved at execution time against a fresh balance read,
/// which lets a plan chain a swap into a bridge without guessing the swap
/// output up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Amount {
	Exact(U256),
	BalanceMinus(U256),
}

impl Amount {
	/// Resolves against the current balance of the source asset.
	///
	/// Returns `None` when nothing would be left to move.
	pub fn resolve(&self, balance: U256) -> Option<U256> {
		let amount = match self {
			Self::Exact(value) => {
				if *value > balance {
					return None;
				}
				*value
			},
			Self::BalanceMinus(reserve) => balance.checked_sub(*reserve)?,
		};
		(!amount.is_zero()).then_some(amount)
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Exact(value) => write!(f, "{value}"),
			Self::BalanceMinus(reserve) => write!(f, "balance - {reserve}"),
		}
	}
}

/// One step of a funding plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
	Swap {
		chain_id: u64,
		from: Asset,
		to: Asset,
		amount: Amount,
	},
	Bridge {
		from_chain: u64,
		to_chain: u64,
		amount: Amount,
	},
}

impl Step {
	/// Chain on which this step submits a transaction.
	pub fn source_chain(&self) -> u64 {
		match self {
			Self::Swap { chain_id, .. } => *chain_id,
			Self::Bridge { from_chain, .. } => *from_chain,
		}
	}
}

impl fmt::Display for Step {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Swap {
				chain_id,
				from,
				to,
				amount,
			} => write!(f, "swap {amount} {from} -> {to} on {chain_id}"),
			Self::Bridge {
				from_chain,
				to_chain,
				amount,
			} => write!(f, "bridge {amount} native {from_chain} -> {to_chain}"),
		}
	}
}

/// The two (chain, asset, minimum) requirements of the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingTargets {
	/// Minimum native balance on the registration chain (T1).
	pub registration_native: U256,
	/// Minimum stablecoin balance on the payment chain (T2).
	pub payment_stable: U256,
}

/// Thresholds and execution knobs used by the planner and the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPolicy {
	pub targets: FundingTargets,
	/// Native left behind on every source chain to pay for its own gas.
	pub native_gas_reserve: U256,
	/// Smallest spare native amount for a chain to count as a source.
	pub native_source_min: U256,
	/// Smallest stablecoin balance for a chain to count as a source.
	pub stable_source_min: U256,
	/// Stablecoin kept when converting a stablecoin source into native.
	pub stable_reserve: U256,
	/// Native amount converted into stablecoin when the payment chain lacks T2.
	pub native_swap_amount: U256,
	/// Relayer fee allowance applied to bridge output.
	pub relayer_fee_bps: u16,
	/// Seconds from submission until a bridge deposit may no longer be filled.
	pub fill_deadline_secs: u32,
	/// Exchange fee tiers, narrowest first.
	pub fee_tiers: Vec<u32>,
	/// Maximum accepted swap slippage. `None` submits swaps without any
	/// minimum-output protection.
	#[serde(default)]
	pub max_slippage_bps: Option<u16>,
}

impl FundingPolicy {
	/// Amount a bridge delivers for `input` after the relayer fee allowance.
	pub fn bridge_output(&self, input: U256) -> U256 {
		let keep = U256::from(BPS_DENOMINATOR - u64::from(self.relayer_fee_bps));
		input * keep / U256::from(BPS_DENOMINATOR)
	}

	/// Smallest bridge input that delivers at least `output`.
	pub fn bridge_input_for(&self, output: U256) -> U256 {
		let keep = U256::from(BPS_DENOMINATOR - u64::from(self.relayer_fee_bps));
		let numerator = output * U256::from(BPS_DENOMINATOR);
		(numerator + keep - U256::from(1u64)) / keep
	}

	/// Stablecoin a stablecoin source must keep: the larger of the configured
	/// reserve and T2.
	pub fn effective_stable_reserve(&self) -> U256 {
		self.stable_reserve.max(self.targets.payment_stable)
	}
}

/// Which decision rule produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "chain_id", rename_all = "snake_case")]
pub enum PlanRule {
	AlreadyFunded,
	SpareOnRegistration,
	NativeOnPayment,
	StableOnPayment,
	FallbackNative(u64),
	FallbackStable(u64),
	Insufficient,
}

/// Why no plan could be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insufficiency {
	pub needs_native: bool,
	pub needs_stable: bool,
	pub detail: String,
}

impl fmt::Display for Insufficiency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.detail)
	}
}

/// Ordered plan reaching both funding targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingStrategy {
	pub ready: bool,
	pub steps: Vec<Step>,
	pub rule: PlanRule,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub insufficiency: Option<Insufficiency>,
}

impl FundingStrategy {
	pub fn ready() -> Self {
		Self {
			ready: true,
			steps: Vec::new(),
			rule: PlanRule::AlreadyFunded,
			insufficiency: None,
		}
	}

	pub fn with_steps(rule: PlanRule, steps: Vec<Step>) -> Self {
		Self {
			ready: false,
			steps,
			rule,
			insufficiency: None,
		}
	}

	pub fn insufficient(insufficiency: Insufficiency) -> Self {
		Self {
			ready: false,
			steps: Vec::new(),
			rule: PlanRule::Insufficient,
			insufficiency: Some(insufficiency),
		}
	}

	pub fn is_insufficient(&self) -> bool {
		self.insufficiency.is_some()
	}
}
