//! Configuration for the hubstrap workspace.
//!
//! Configuration is TOML. [`Config::mainnet`] returns the built-in defaults;
//! [`Config::from_file`] overlays a file on top of them, so a file only needs
//! the keys it changes. `${VAR}` and `${VAR:-default}` references are resolved
//! from the environment before parsing. Private keys are never read from
//! configuration.

pub mod mainnet;

use alloy_primitives::{Address, U256};
use hubstrap_types::{
	ActionKind, Chain, ChainRegistry, FundingPolicy, FundingTargets, PollPolicy, RateLimiter,
	Stablecoin,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Longest validity window a payment authorization may carry.
pub const MAX_PAYMENT_VALIDITY_SECS: u64 = 3_600;

/// Paid hub reads made by one sync attempt: identity lookup, then signers.
pub const PAID_READS_PER_SYNC_ATTEMPT: u64 = 2;

/// Paid hub requests the bootstrap still makes after the sync wait: the
/// username message, the first post and its read-back.
pub const PAID_CALLS_AFTER_SYNC: u64 = 3;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
	pub roles: RolesConfig,
	/// Chains keyed by a short name (`optimism`, `base`, ...).
	pub chains: BTreeMap<String, ChainConfig>,
	pub contracts: ContractsConfig,
	#[serde(default)]
	pub funding: FundingConfig,
	#[serde(default)]
	pub payment: PaymentConfig,
	#[serde(default)]
	pub hub: HubConfig,
	#[serde(default)]
	pub polling: PollingConfig,
	#[serde(default)]
	pub rate_limits: RateLimitsConfig,
}

/// Which configured chains play the registration and payment roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesConfig {
	pub registration_chain: u64,
	pub payment_chain: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StablecoinConfig {
	pub address: Address,
	/// EIP-712 domain name of the token contract.
	pub name: String,
	/// EIP-712 domain version of the token contract.
	pub version: String,
	#[serde(default = "default_stable_decimals")]
	pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
	pub chain_id: u64,
	#[serde(default = "default_native_symbol")]
	pub native_symbol: String,
	pub rpc_url: String,
	pub stablecoin: StablecoinConfig,
	pub wrapped_native: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub swap_router: Option<Address>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quoter: Option<Address>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub spoke_pool: Option<Address>,
}

impl ChainConfig {
	fn to_chain(&self, name: &str) -> Chain {
		Chain {
			id: self.chain_id,
			name: name.to_string(),
			native_symbol: self.native_symbol.clone(),
			rpc_url: self.rpc_url.clone(),
			stablecoin: Stablecoin {
				address: self.stablecoin.address,
				name: self.stablecoin.name.clone(),
				version: self.stablecoin.version.clone(),
				decimals: self.stablecoin.decimals,
			},
			wrapped_native: self.wrapped_native,
			swap_router: self.swap_router,
			quoter: self.quoter,
			spoke_pool: self.spoke_pool,
		}
	}
}

/// Identity protocol contracts, all deployed on the registration chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractsConfig {
	pub id_gateway: Address,
	pub id_registry: Address,
	pub key_gateway: Address,
	pub key_registry: Address,
	pub signed_key_request_validator: Address,
	#[serde(default = "default_validator_name")]
	pub validator_eip712_name: String,
	#[serde(default = "default_validator_version")]
	pub validator_eip712_version: String,
}

/// Funding targets and thresholds, in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
	/// T1: native balance required on the registration chain (wei).
	pub registration_native: u64,
	/// T2: stablecoin balance required on the payment chain.
	pub payment_stable: u64,
	pub native_gas_reserve: u64,
	pub native_source_min: u64,
	pub stable_source_min: u64,
	pub stable_reserve: u64,
	pub native_swap_amount: u64,
	pub relayer_fee_bps: u16,
	pub fill_deadline_secs: u32,
	/// Exchange fee tiers in hundredths of a basis point, narrowest first.
	pub fee_tiers: Vec<u32>,
	/// Leave unset to submit swaps without minimum-output protection.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_slippage_bps: Option<u16>,
	/// Extra wei on top of price and gas the registrar wants to see before
	/// registering.
	pub registration_buffer: u64,
}

impl Default for FundingConfig {
	fn default() -> Self {
		Self {
			registration_native: 2_000_000_000_000_000,
			payment_stable: 10_000,
			native_gas_reserve: 100_000_000_000_000,
			native_source_min: 500_000_000_000_000,
			stable_source_min: 1_000_000,
			stable_reserve: 100_000,
			native_swap_amount: 200_000_000_000_000,
			relayer_fee_bps: 50,
			fill_deadline_secs: 3_600,
			fee_tiers: vec![500, 3_000],
			max_slippage_bps: None,
			registration_buffer: 50_000_000_000_000,
		}
	}
}

/// Per-request payment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
	/// Recipient of every authorization. When unset it is taken from the
	/// server's payment challenge.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payee: Option<Address>,
	/// Stablecoin minor units authorized per protected request.
	pub amount: u64,
	pub validity_secs: u64,
	pub header: String,
	pub network: String,
	pub version: u8,
}

impl Default for PaymentConfig {
	fn default() -> Self {
		Self {
			payee: None,
			amount: 1_000,
			validity_secs: MAX_PAYMENT_VALIDITY_SECS,
			header: "X-PAYMENT".into(),
			network: "base".into(),
			version: 1,
		}
	}
}

/// Hub and name-registry endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
	pub base_url: String,
	pub name_registry_url: String,
	pub request_timeout_secs: u64,
	/// Delay before checking that a submitted post is readable.
	pub verify_delay_ms: u64,
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			base_url: "https://hub-api.neynar.com".into(),
			name_registry_url: "https://fnames.farcaster.xyz".into(),
			request_timeout_secs: 30,
			verify_delay_ms: 3_000,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
	pub interval_ms: u64,
	pub timeout_ms: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_attempts: Option<u32>,
}

impl PollConfig {
	const fn new(interval_ms: u64, timeout_ms: u64) -> Self {
		Self {
			interval_ms,
			timeout_ms,
			max_attempts: None,
		}
	}

	pub fn policy(&self) -> PollPolicy {
		let policy = PollPolicy::new(
			Duration::from_millis(self.interval_ms),
			Duration::from_millis(self.timeout_ms),
		);
		match self.max_attempts {
			Some(max) => policy.with_max_attempts(max),
			None => policy,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
	/// Destination balance checks after a bridge deposit.
	pub bridge: PollConfig,
	/// Indexer sync checks after registration.
	pub sync: PollConfig,
	/// Transaction receipt waits.
	pub receipt: PollConfig,
}

impl Default for PollingConfig {
	fn default() -> Self {
		Self {
			bridge: PollConfig::new(10_000, 300_000),
			sync: PollConfig::new(5_000, 120_000),
			receipt: PollConfig::new(2_000, 180_000),
		}
	}
}

/// Minimum seconds between two actions of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
	pub post_secs: u64,
	pub reply_secs: u64,
	pub follow_secs: u64,
	pub profile_secs: u64,
}

impl Default for RateLimitsConfig {
	fn default() -> Self {
		Self {
			post_secs: 30,
			reply_secs: 10,
			follow_secs: 2,
			profile_secs: 2,
		}
	}
}

impl RateLimitsConfig {
	pub fn limiter(&self) -> RateLimiter {
		let intervals = [
			(ActionKind::Post, self.post_secs),
			(ActionKind::Reply, self.reply_secs),
			(ActionKind::Follow, self.follow_secs),
			(ActionKind::Profile, self.profile_secs),
		]
		.into_iter()
		.filter(|(_, secs)| *secs > 0)
		.map(|(kind, secs)| (kind, Duration::from_secs(secs)))
		.collect::<HashMap<_, _>>();
		RateLimiter::new(intervals)
	}
}

fn default_stable_decimals() -> u8 {
	6
}

fn default_native_symbol() -> String {
	"ETH".into()
}

fn default_validator_name() -> String {
	"Farcaster SignedKeyRequestValidator".into()
}

fn default_validator_version() -> String {
	"1".into()
}

/// Resolves `${VAR}` and `${VAR:-default}` references from the environment.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {MAX_INPUT_SIZE} bytes)",
			input.len()
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {e}")))?;

	let mut resolved = String::with_capacity(input.len());
	let mut cursor = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						name.as_str()
					)))
				},
			},
		};
		resolved.push_str(&input[cursor..whole.start()]);
		resolved.push_str(&value);
		cursor = whole.end();
	}
	resolved.push_str(&input[cursor..]);

	Ok(resolved)
}

/// Deep-merges `overlay` into `base`; tables merge key by key, anything else
/// replaces.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
	match (base, overlay) {
		(toml::Value::Table(base), toml::Value::Table(overlay)) => {
			for (key, value) in overlay {
				match base.get_mut(&key) {
					Some(existing) => merge_values(existing, value),
					None => {
						base.insert(key, value);
					},
				}
			}
		},
		(slot, value) => *slot = value,
	}
}

impl Config {
	/// Built-in mainnet defaults.
	pub fn mainnet() -> Self {
		mainnet::config()
	}

	/// Loads a TOML file and overlays it on the mainnet defaults.
	///
	/// A top-level `inherit = false` disables the overlay, in which case the
	/// file must be complete.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&raw)?;
		let mut overlay: toml::Value = toml::from_str(&resolved)?;

		let inherit = match overlay.as_table_mut().and_then(|t| t.remove("inherit")) {
			Some(toml::Value::Boolean(flag)) => flag,
			Some(other) => {
				return Err(ConfigError::Parse(format!(
					"'inherit' must be a boolean, got {}",
					other.type_str()
				)))
			},
			None => true,
		};

		let merged = if inherit {
			let mut base = toml::Value::try_from(Self::mainnet())
				.map_err(|e| ConfigError::Parse(e.to_string()))?;
			merge_values(&mut base, overlay);
			base
		} else {
			overlay
		};

		let config: Config = merged.try_into()?;
		config.validate()?;
		tracing::debug!(path = %path.display(), chains = config.chains.len(), "Loaded configuration");
		Ok(config)
	}

	/// Checks cross-field constraints that serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain must be configured".into(),
			));
		}
		for (name, chain) in &self.chains {
			if chain.rpc_url.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain '{name}' must have an rpc_url"
				)));
			}
		}
		if self.roles.registration_chain == self.roles.payment_chain {
			return Err(ConfigError::Validation(
				"Registration and payment chain must differ".into(),
			));
		}
		for (role, id) in [
			("registration", self.roles.registration_chain),
			("payment", self.roles.payment_chain),
		] {
			if self.chain_by_id(id).is_none() {
				return Err(ConfigError::Validation(format!(
					"The {role} chain {id} is not configured"
				)));
			}
		}
		// Builds the registry once to reuse its size and duplicate checks.
		self.chain_registry()?;

		let funding = &self.funding;
		if funding.fee_tiers.is_empty() {
			return Err(ConfigError::Validation(
				"funding.fee_tiers cannot be empty".into(),
			));
		}
		if funding.fee_tiers.windows(2).any(|w| w[0] >= w[1]) {
			return Err(ConfigError::Validation(
				"funding.fee_tiers must be strictly increasing".into(),
			));
		}
		if funding.relayer_fee_bps >= 10_000 {
			return Err(ConfigError::Validation(
				"funding.relayer_fee_bps must be below 10000".into(),
			));
		}
		if funding.max_slippage_bps.is_some_and(|bps| bps > 10_000) {
			return Err(ConfigError::Validation(
				"funding.max_slippage_bps cannot exceed 10000".into(),
			));
		}
		if funding.fill_deadline_secs == 0 {
			return Err(ConfigError::Validation(
				"funding.fill_deadline_secs must be greater than 0".into(),
			));
		}

		let payment = &self.payment;
		if payment.amount == 0 {
			return Err(ConfigError::Validation(
				"payment.amount must be greater than 0".into(),
			));
		}
		if payment.validity_secs == 0 || payment.validity_secs > MAX_PAYMENT_VALIDITY_SECS {
			return Err(ConfigError::Validation(format!(
				"payment.validity_secs must be between 1 and {MAX_PAYMENT_VALIDITY_SECS}"
			)));
		}
		if payment.header.trim().is_empty() {
			return Err(ConfigError::Validation(
				"payment.header cannot be empty".into(),
			));
		}

		if self.hub.base_url.trim().is_empty() {
			return Err(ConfigError::Validation("hub.base_url cannot be empty".into()));
		}

		if self.sync_attempt_budget() == 0 {
			return Err(ConfigError::Validation(format!(
				"funding.payment_stable must pay for at least one sync attempt and {PAID_CALLS_AFTER_SYNC} \
				 later hub requests at payment.amount each"
			)));
		}

		for (name, poll) in [
			("bridge", &self.polling.bridge),
			("sync", &self.polling.sync),
			("receipt", &self.polling.receipt),
		] {
			if poll.interval_ms == 0 {
				return Err(ConfigError::Validation(format!(
					"polling.{name}.interval_ms must be greater than 0"
				)));
			}
			if poll.timeout_ms < poll.interval_ms {
				return Err(ConfigError::Validation(format!(
					"polling.{name}.timeout_ms must be at least interval_ms"
				)));
			}
		}

		Ok(())
	}

	/// Name and settings of the chain with `chain_id`.
	pub fn chain_by_id(&self, chain_id: u64) -> Option<(&str, &ChainConfig)> {
		self.chains
			.iter()
			.find(|(_, c)| c.chain_id == chain_id)
			.map(|(name, c)| (name.as_str(), c))
	}

	/// Chain registry ordered registration chain, payment chain, then the
	/// fallback chains by name.
	pub fn chain_registry(&self) -> Result<ChainRegistry, ConfigError> {
		let mut chains = Vec::with_capacity(self.chains.len());
		for role in [self.roles.registration_chain, self.roles.payment_chain] {
			if let Some((name, chain)) = self.chain_by_id(role) {
				chains.push(chain.to_chain(name));
			}
		}
		chains.extend(
			self.chains
				.iter()
				.filter(|(_, c)| {
					c.chain_id != self.roles.registration_chain
						&& c.chain_id != self.roles.payment_chain
				})
				.map(|(name, c)| c.to_chain(name)),
		);

		ChainRegistry::new(
			chains,
			self.roles.registration_chain,
			self.roles.payment_chain,
		)
		.map_err(|e| ConfigError::Validation(e.to_string()))
	}

	/// Sync attempts the payment-chain target can pay for while keeping
	/// [`PAID_CALLS_AFTER_SYNC`] requests in reserve.
	pub fn sync_attempt_budget(&self) -> u32 {
		let paid_calls = self.funding.payment_stable / self.payment.amount.max(1);
		let spare = paid_calls.saturating_sub(PAID_CALLS_AFTER_SYNC);
		u32::try_from(spare / PAID_READS_PER_SYNC_ATTEMPT).unwrap_or(u32::MAX)
	}

	/// `polling.sync` as a policy, with its attempts capped by
	/// [`Config::sync_attempt_budget`].
	pub fn sync_policy(&self) -> PollPolicy {
		let policy = self.polling.sync.policy();
		let budget = self.sync_attempt_budget();
		if policy.max_attempts > budget {
			tracing::debug!(
				configured = policy.max_attempts,
				budget,
				"Capping sync attempts to the payment budget"
			);
			return policy.with_max_attempts(budget);
		}
		policy
	}

	pub fn funding_policy(&self) -> FundingPolicy {
		let f = &self.funding;
		FundingPolicy {
			targets: FundingTargets {
				registration_native: U256::from(f.registration_native),
				payment_stable: U256::from(f.payment_stable),
			},
			native_gas_reserve: U256::from(f.native_gas_reserve),
			native_source_min: U256::from(f.native_source_min),
			stable_source_min: U256::from(f.stable_source_min),
			stable_reserve: U256::from(f.stable_reserve),
			native_swap_amount: U256::from(f.native_swap_amount),
			relayer_fee_bps: f.relayer_fee_bps,
			fill_deadline_secs: f.fill_deadline_secs,
			fee_tiers: f.fee_tiers.clone(),
			max_slippage_bps: f.max_slippage_bps,
		}
	}
}

/// Parses a complete configuration (no overlay), resolving environment
/// references and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
