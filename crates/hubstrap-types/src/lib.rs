//! Common types shared across the hubstrap workspace.
//!
//! This crate defines the data model used by every other crate: the chain
//! registry, balance snapshots, funding strategies, identities, signer keys,
//! transactions, polling policies and the per-action rate limiter. It has no
//! network dependencies so the planner and the message encoders can be tested
//! in isolation.

pub mod balance;
#[cfg(any(test, feature = "testing"))]
pub mod builders;
pub mod chain;
pub mod eip712;
pub mod identity;
pub mod poll;
pub mod rate_limit;
pub mod secret_string;
pub mod strategy;
pub mod transaction;
pub mod utils;

pub use balance::{BalanceSnapshot, ChainBalance};
pub use chain::{Chain, ChainRegistry, Stablecoin};
pub use identity::{Fid, Identity, SignerKeyPair, SignerPublicKey};
pub use poll::{poll_until, PollOutcome, PollPolicy};
pub use rate_limit::{ActionKind, RateLimiter};
pub use secret_string::SecretString;
pub use strategy::{
	Amount, Asset, FundingPolicy, FundingStrategy, FundingTargets, Insufficiency, PlanRule, Step,
	BPS_DENOMINATOR,
};
pub use transaction::{Transaction, TransactionHash, TransactionReceipt};
pub use utils::{format_units, parse_address, unix_now, with_0x_prefix, ValidationError};
