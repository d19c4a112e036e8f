//! The composed bootstrap flow.

use alloy_primitives::{Address, B256, U256};
use hubstrap_funding::ExecutionReport;
use hubstrap_hub::{CastDraft, MessageSigner, Submission, SyncOutcome, UserDataKind};
use hubstrap_identity::{validate_name, Delegation, NameRecord, Registration};
use hubstrap_types::{
	BalanceSnapshot, Fid, FundingStrategy, Identity, RateLimiter, SignerKeyPair, SignerPublicKey,
};
use serde::Serialize;
use std::fmt;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::BootstrapContext;

/// Where a bootstrap run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Balances,
	Funding,
	Registration,
	Delegation,
	Username,
	Profile,
	Cast,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Balances => "balances",
			Self::Funding => "funding",
			Self::Registration => "registration",
			Self::Delegation => "delegation",
			Self::Username => "username",
			Self::Profile => "profile",
			Self::Cast => "cast",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
	pub stage: Stage,
	pub detail: String,
}

impl StageFailure {
	fn new(stage: Stage, detail: impl fmt::Display) -> Self {
		Self {
			stage,
			detail: detail.to_string(),
		}
	}
}

impl fmt::Display for StageFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} failed: {}", self.stage, self.detail)
	}
}

/// Knobs for one run.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
	/// Signer from an earlier run. Reused when still active on chain.
	pub existing_signer: Option<SignerKeyPair>,
	pub username: Option<String>,
	pub skip_funding: bool,
	pub wait_for_sync: bool,
	pub first_cast: Option<CastDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityStatus {
	pub fid: Fid,
	pub owner: Address,
	pub newly_registered: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tx_hash: Option<B256>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub price: Option<U256>,
}

impl From<&Registration> for IdentityStatus {
	fn from(registration: &Registration) -> Self {
		let identity = registration.identity();
		let (tx_hash, price) = match registration {
			Registration::Registered { tx_hash, price, .. } => (Some(*tx_hash), Some(*price)),
			Registration::AlreadyRegistered(_) => (None, None),
		};
		Self {
			fid: identity.fid,
			owner: identity.owner,
			newly_registered: registration.is_new(),
			tx_hash,
			price,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct SignerStatus {
	pub public_key: SignerPublicKey,
	pub newly_issued: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tx_hash: Option<B256>,
	/// Key material for the caller to persist. Never serialized.
	#[serde(skip)]
	pub key_pair: SignerKeyPair,
}

/// Everything a run did, including the stages completed before a failure.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
	pub owner: Address,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub balances: Option<BalanceSnapshot>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub strategy: Option<FundingStrategy>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub funding: Option<ExecutionReport>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub identity: Option<IdentityStatus>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signer: Option<SignerStatus>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sync: Option<SyncOutcome>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<NameRecord>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cast: Option<Submission>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<StageFailure>,
}

impl BootstrapReport {
	fn new(owner: Address) -> Self {
		Self {
			owner,
			balances: None,
			strategy: None,
			funding: None,
			identity: None,
			signer: None,
			sync: None,
			username: None,
			cast: None,
			failure: None,
		}
	}

	pub fn is_success(&self) -> bool {
		self.failure.is_none()
	}
}

/// Drives balances, funding, registration, delegation, username, sync and a
/// first post in that order, stopping at the first hard failure.
///
/// Sync is advisory: a timeout is recorded and the run continues.
pub struct BootstrapOrchestrator {
	context: BootstrapContext,
	limiter: Mutex<RateLimiter>,
}

impl BootstrapOrchestrator {
	pub fn new(context: BootstrapContext) -> Self {
		let limiter = Mutex::new(context.rate_limits.clone());
		Self { context, limiter }
	}

	pub fn context(&self) -> &BootstrapContext {
		&self.context
	}

	pub fn into_context(self) -> BootstrapContext {
		self.context
	}

	#[instrument(skip_all, fields(owner = %self.context.account.address()))]
	pub async fn run(&self, options: BootstrapOptions) -> BootstrapReport {
		let mut report = BootstrapReport::new(self.context.account.address());
		match self.drive(&options, &mut report).await {
			Ok(()) => tracing::info!("Bootstrap complete"),
			Err(failure) => {
				tracing::error!(stage = %failure.stage, detail = %failure.detail, "Bootstrap stopped");
				report.failure = Some(failure);
			},
		}
		report
	}

	async fn drive(
		&self,
		options: &BootstrapOptions,
		report: &mut BootstrapReport,
	) -> Result<(), StageFailure> {
		if let Some(name) = &options.username {
			validate_name(name).map_err(|e| StageFailure::new(Stage::Username, e))?;
		}

		let snapshot = self.context.reader.read_balances(report.owner).await;
		if snapshot.is_partial() {
			tracing::warn!(failed = ?snapshot.errors.keys().collect::<Vec<_>>(), "Some balance reads failed");
		}
		let unreachable = snapshot.balances.is_empty();
		report.balances = Some(snapshot.clone());
		if unreachable {
			return Err(StageFailure::new(Stage::Balances, "no chain answered a balance read"));
		}

		if options.skip_funding {
			tracing::info!("Funding skipped");
		} else {
			self.fund(&snapshot, report).await?;
		}

		let identity = self.register(report).await?;
		let key_pair = self
			.delegate(options.existing_signer.as_ref(), report)
			.await?;

		if let Some(name) = &options.username {
			let record = self
				.context
				.names
				.register_name(self.context.account.as_ref(), identity.fid, name)
				.await
				.map_err(|e| StageFailure::new(Stage::Username, e))?;
			report.username = Some(record);
		}

		if options.wait_for_sync {
			let outcome = self
				.context
				.sync_waiter()
				.wait_for_sync(&identity, &key_pair.public_key)
				.await;
			report.sync = Some(outcome);
		}

		if report.username.is_none() && options.first_cast.is_none() {
			return Ok(());
		}

		let signer = MessageSigner::from_secret(&key_pair.private_key)
			.map_err(|e| StageFailure::new(Stage::Delegation, e))?;
		let submitter = self.context.cast_submitter(identity.fid, signer);
		let mut limiter = self.limiter.lock().await;

		if let Some(record) = &report.username {
			submitter
				.set_user_data(&mut limiter, UserDataKind::Username, record.name.clone())
				.await
				.map_err(|e| StageFailure::new(Stage::Profile, e))?;
		}

		if let Some(draft) = &options.first_cast {
			let submission = submitter
				.post(&mut limiter, draft.clone())
				.await
				.map_err(|e| StageFailure::new(Stage::Cast, e))?;
			report.cast = Some(submission);
		}
		Ok(())
	}

	async fn fund(
		&self,
		snapshot: &BalanceSnapshot,
		report: &mut BootstrapReport,
	) -> Result<(), StageFailure> {
		let strategy = self.context.planner.plan(snapshot);
		report.strategy = Some(strategy.clone());

		if let Some(insufficiency) = &strategy.insufficiency {
			return Err(StageFailure::new(
				Stage::Funding,
				format!("insufficient funds: {insufficiency}"),
			));
		}
		if strategy.ready {
			tracing::info!("Already funded");
			return Ok(());
		}

		let execution = self
			.context
			.router
			.execute(&strategy)
			.await
			.map_err(|e| StageFailure::new(Stage::Funding, e))?;
		let failed = execution.failure().map(ToString::to_string);
		let pending = execution.is_pending();
		report.funding = Some(execution);

		if let Some(detail) = failed {
			return Err(StageFailure::new(Stage::Funding, detail));
		}
		if pending {
			return Err(StageFailure::new(
				Stage::Funding,
				"bridge deposit has not landed yet; run again once it arrives",
			));
		}
		Ok(())
	}

	async fn register(&self, report: &mut BootstrapReport) -> Result<Identity, StageFailure> {
		let registration = self
			.context
			.registrar
			.register()
			.await
			.map_err(|e| StageFailure::new(Stage::Registration, e))?;
		report.identity = Some(IdentityStatus::from(&registration));
		Ok(registration.identity())
	}

	async fn delegate(
		&self,
		existing: Option<&SignerKeyPair>,
		report: &mut BootstrapReport,
	) -> Result<SignerKeyPair, StageFailure> {
		let delegation = self
			.context
			.issuer
			.ensure(existing.map(|k| k.public_key))
			.await
			.map_err(|e| StageFailure::new(Stage::Delegation, e))?;

		let (key_pair, newly_issued, tx_hash) = match delegation {
			Delegation::Issued(issued) => (issued.key_pair, true, Some(issued.tx_hash)),
			Delegation::AlreadyDelegated { .. } => {
				let key_pair = existing.cloned().ok_or_else(|| {
					StageFailure::new(Stage::Delegation, "active signer without key material")
				})?;
				(key_pair, false, None)
			},
		};
		report.signer = Some(SignerStatus {
			public_key: key_pair.public_key,
			newly_issued,
			tx_hash,
			key_pair: key_pair.clone(),
		});
		Ok(key_pair)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use hubstrap_account::{AccountInterface, LocalWallet};
	use hubstrap_funding::{
		BridgeDeposit, ChainBalanceReader, FundRouter, FundingStrategyPlanner,
		MockBridgeInterface, MockSwapInterface, StepStatus, SwapReceipt,
	};
	use hubstrap_hub::{
		FarcasterNetwork, HubError, HubInterface, MessageHash, SignedMessage, Verification,
	};
	use hubstrap_identity::test_support::{FakeChain, OWNER, TEST_PRIVATE_KEY};
	use hubstrap_identity::{
		signer::generate_key_pair, IdentityError, IdentityRegistrar, NameClaim,
		NameRegistryInterface, SignerKeyIssuer, UsernameService,
	};
	use hubstrap_types::builders::{default_policy, default_registry, BASE, OPTIMISM};
	use hubstrap_types::{Asset, PlanRule, PollPolicy, SecretString};
	use std::collections::HashMap;
	use std::sync::{Arc, Mutex as StdMutex};
	use std::time::Duration;

	/// Hub that indexes whatever the fake chain holds, when `indexes` is set.
	struct LedgerHub {
		chain: Arc<FakeChain>,
		indexes: bool,
		submitted: StdMutex<Vec<SignedMessage>>,
	}

	impl LedgerHub {
		fn new(chain: &Arc<FakeChain>, indexes: bool) -> Arc<Self> {
			Arc::new(Self {
				chain: chain.clone(),
				indexes,
				submitted: StdMutex::default(),
			})
		}

		fn submitted(&self) -> usize {
			self.submitted.lock().unwrap().len()
		}
	}

	#[async_trait]
	impl HubInterface for LedgerHub {
		async fn fid_by_address(&self, _address: Address) -> Result<Option<Fid>, HubError> {
			let fid = self.chain.fid();
			Ok((self.indexes && fid != 0).then_some(Fid(fid)))
		}

		async fn signers_by_fid(&self, _fid: Fid) -> Result<Vec<SignerPublicKey>, HubError> {
			if !self.indexes {
				return Ok(Vec::new());
			}
			Ok(self
				.chain
				.keys()
				.iter()
				.filter_map(|key| <[u8; 32]>::try_from(key.as_ref()).ok())
				.map(SignerPublicKey)
				.collect())
		}

		async fn submit_message(&self, message: SignedMessage) -> Result<MessageHash, HubError> {
			let hash = message.hash;
			self.submitted.lock().unwrap().push(message);
			Ok(hash)
		}

		async fn cast_exists(&self, _fid: Fid, _hash: MessageHash) -> Result<bool, HubError> {
			Ok(true)
		}
	}

	#[derive(Default)]
	struct MemoryNames {
		records: StdMutex<HashMap<String, NameRecord>>,
	}

	impl MemoryNames {
		fn holding(name: &str, fid: u64) -> Arc<Self> {
			let names = Self::default();
			names.records.lock().unwrap().insert(
				name.to_string(),
				NameRecord {
					name: name.to_string(),
					fid: Fid(fid),
					owner: Address::ZERO,
					timestamp: 1,
				},
			);
			Arc::new(names)
		}
	}

	#[async_trait]
	impl NameRegistryInterface for MemoryNames {
		async fn lookup(&self, name: &str) -> Result<Option<NameRecord>, IdentityError> {
			Ok(self.records.lock().unwrap().get(name).cloned())
		}

		async fn submit_claim(&self, claim: NameClaim) -> Result<NameRecord, IdentityError> {
			let record = NameRecord {
				name: claim.name.clone(),
				fid: claim.fid,
				owner: claim.owner,
				timestamp: claim.timestamp,
			};
			self.records
				.lock()
				.unwrap()
				.insert(claim.name, record.clone());
			Ok(record)
		}
	}

	fn orchestrator(
		chain: &Arc<FakeChain>,
		hub: Arc<LedgerHub>,
		names: Arc<MemoryNames>,
	) -> BootstrapOrchestrator {
		orchestrator_with(
			chain,
			hub,
			names,
			MockSwapInterface::new(),
			MockBridgeInterface::new(),
		)
	}

	fn orchestrator_with(
		chain: &Arc<FakeChain>,
		hub: Arc<LedgerHub>,
		names: Arc<MemoryNames>,
		swap: MockSwapInterface,
		bridge: MockBridgeInterface,
	) -> BootstrapOrchestrator {
		let account: Arc<dyn AccountInterface> =
			Arc::new(LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap());
		let delivery = chain.delivery();
		let registry = default_registry();
		let policy = default_policy();
		let reader = Arc::new(ChainBalanceReader::new(delivery.clone(), registry.clone()));
		let router = FundRouter::new(
			reader.clone(),
			Arc::new(swap),
			Arc::new(bridge),
			policy.clone(),
			PollPolicy::new(Duration::from_secs(1), Duration::from_secs(10)),
			OWNER,
		);

		BootstrapOrchestrator::new(BootstrapContext {
			account: account.clone(),
			registry: registry.clone(),
			delivery: delivery.clone(),
			reader,
			planner: FundingStrategyPlanner::new(registry, policy),
			router,
			registrar: IdentityRegistrar::new(
				delivery.clone(),
				chain.contracts.clone(),
				U256::ZERO,
			),
			issuer: SignerKeyIssuer::new(delivery, account, chain.contracts.clone()),
			hub,
			names: Arc::new(UsernameService::new(names)),
			network: FarcasterNetwork::Mainnet,
			sync_policy: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(5)),
			verify_delay: Duration::from_secs(1),
			rate_limits: RateLimiter::unlimited(),
		})
	}

	fn funded_chain() -> Arc<FakeChain> {
		FakeChain::new(
			U256::from(1_000_000_000_000_000u64),
			U256::from(1_000_000_000_000_000_000u64),
		)
	}

	#[tokio::test(start_paused = true)]
	async fn test_funded_account_bootstraps_end_to_end() {
		let chain = funded_chain();
		let hub = LedgerHub::new(&chain, true);
		let orchestrator = orchestrator(&chain, hub.clone(), Arc::new(MemoryNames::default()));

		let report = orchestrator
			.run(BootstrapOptions {
				username: Some("alice".into()),
				wait_for_sync: true,
				first_cast: Some(CastDraft::new("gm")),
				..Default::default()
			})
			.await;

		assert!(report.is_success(), "failure: {:?}", report.failure);
		assert!(report.strategy.as_ref().unwrap().ready);
		assert!(report.funding.is_none());

		let identity = report.identity.as_ref().unwrap();
		assert_eq!(identity.fid, Fid(FakeChain::ASSIGNED_FID));
		assert!(identity.newly_registered);

		let signer = report.signer.as_ref().unwrap();
		assert!(signer.newly_issued);
		assert_eq!(signer.key_pair.public_key, signer.public_key);

		assert_eq!(report.sync, Some(SyncOutcome::Synced { attempts: 1 }));
		assert_eq!(report.username.as_ref().unwrap().fid, identity.fid);
		assert_eq!(
			report.cast.as_ref().unwrap().verification,
			Verification::Verified
		);

		// Registration and key add on chain; username and post on the hub.
		assert_eq!(chain.sent().len(), 2);
		assert_eq!(hub.submitted(), 2);
	}

	fn usdc(chain_id: u64) -> Option<Address> {
		default_registry()
			.get(chain_id)
			.map(|chain| chain.stablecoin.address)
	}

	#[tokio::test(start_paused = true)]
	async fn test_swap_and_bridge_then_register() {
		let chain = FakeChain::new(U256::from(1_000_000_000_000_000u64), U256::ZERO);
		chain.set_balance(BASE, usdc(BASE), U256::from(2_000_000u64));

		let mut swap = MockSwapInterface::new();
		let ledger = chain.clone();
		swap.expect_swap().times(1).returning(move |request| {
			assert_eq!((request.chain_id, request.from, request.to), (BASE, Asset::Stable, Asset::Native));
			let left = ledger.balance_of(BASE, usdc(BASE)) - request.amount_in;
			ledger.set_balance(BASE, usdc(BASE), left);
			ledger.set_balance(BASE, None, U256::from(3_000_000_000_000_000u64));
			Box::pin(async {
				Ok(SwapReceipt {
					tx_hash: B256::with_last_byte(0x51),
					min_amount_out: U256::ZERO,
				})
			})
		});

		let mut bridge = MockBridgeInterface::new();
		let ledger = chain.clone();
		bridge.expect_deposit().times(1).returning(move |request| {
			assert_eq!((request.from_chain, request.to_chain), (BASE, OPTIMISM));
			let left = ledger.balance_of(BASE, None) - request.input_amount;
			ledger.set_balance(BASE, None, left);
			let landed = ledger.balance_of(OPTIMISM, None) + request.output_amount;
			ledger.set_balance(OPTIMISM, None, landed);
			Box::pin(async {
				Ok(BridgeDeposit {
					tx_hash: B256::with_last_byte(0xbb),
					fill_deadline: 0,
				})
			})
		});

		let hub = LedgerHub::new(&chain, true);
		let orchestrator =
			orchestrator_with(&chain, hub, Arc::new(MemoryNames::default()), swap, bridge);

		let report = orchestrator.run(BootstrapOptions::default()).await;

		assert!(report.is_success(), "failure: {:?}", report.failure);
		assert_eq!(report.strategy.as_ref().unwrap().rule, PlanRule::StableOnPayment);
		let funding = report.funding.as_ref().unwrap();
		assert!(funding.is_complete());
		assert_eq!(funding.outcomes.len(), 2);
		assert_eq!(funding.outcomes[1].tx_hash, Some(B256::with_last_byte(0xbb)));

		// 2.9e15 wei bridged, less the 0.5% relayer fee.
		assert_eq!(
			chain.balance_of(OPTIMISM, None),
			U256::from(2_885_500_000_000_000u64)
		);
		assert!(report.identity.as_ref().unwrap().newly_registered);
		assert!(report.signer.as_ref().unwrap().newly_issued);
		assert_eq!(chain.sent().len(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_pending_bridge_stops_before_registration() {
		let chain = FakeChain::new(U256::from(1_000_000_000_000_000u64), U256::ZERO);
		chain.set_balance(BASE, None, U256::from(5_000_000_000_000_000u64));
		chain.set_balance(BASE, usdc(BASE), U256::from(20_000u64));

		let mut swap = MockSwapInterface::new();
		swap.expect_swap().never();
		let mut bridge = MockBridgeInterface::new();
		bridge.expect_deposit().times(1).returning(|_| {
			Box::pin(async {
				Ok(BridgeDeposit {
					tx_hash: B256::with_last_byte(0xbb),
					fill_deadline: 0,
				})
			})
		});

		let hub = LedgerHub::new(&chain, true);
		let orchestrator =
			orchestrator_with(&chain, hub, Arc::new(MemoryNames::default()), swap, bridge);

		let report = orchestrator.run(BootstrapOptions::default()).await;

		let failure = report.failure.as_ref().unwrap();
		assert_eq!(failure.stage, Stage::Funding);
		assert_eq!(report.strategy.as_ref().unwrap().rule, PlanRule::NativeOnPayment);

		let funding = report.funding.as_ref().unwrap();
		assert!(funding.is_pending());
		assert_eq!(funding.outcomes.len(), 1);
		assert_eq!(funding.outcomes[0].status, StepStatus::Pending);
		assert_eq!(funding.outcomes[0].tx_hash, Some(B256::with_last_byte(0xbb)));

		assert!(report.identity.is_none());
		assert!(report.signer.is_none());
		assert!(chain.sent().is_empty());
	}

	#[tokio::test]
	async fn test_insufficient_funds_stop_before_any_transaction() {
		let chain = FakeChain::new(U256::from(1u64), U256::ZERO);
		let hub = LedgerHub::new(&chain, true);
		let orchestrator = orchestrator(&chain, hub, Arc::new(MemoryNames::default()));

		let report = orchestrator.run(BootstrapOptions::default()).await;

		let failure = report.failure.as_ref().unwrap();
		assert_eq!(failure.stage, Stage::Funding);
		assert!(report.strategy.as_ref().unwrap().is_insufficient());
		assert!(report.identity.is_none());
		assert!(chain.sent().is_empty());
	}

	#[tokio::test]
	async fn test_rerun_reuses_identity_and_active_signer() {
		let chain = funded_chain();
		let existing = generate_key_pair();
		chain.set_fid(77);
		chain.add_key(existing.public_key.as_bytes());
		let hub = LedgerHub::new(&chain, true);
		let orchestrator = orchestrator(&chain, hub, Arc::new(MemoryNames::default()));

		let report = orchestrator
			.run(BootstrapOptions {
				existing_signer: Some(existing.clone()),
				skip_funding: true,
				..Default::default()
			})
			.await;

		assert!(report.is_success());
		assert!(report.strategy.is_none());
		let identity = report.identity.unwrap();
		assert_eq!(identity.fid, Fid(77));
		assert!(!identity.newly_registered);
		let signer = report.signer.unwrap();
		assert!(!signer.newly_issued);
		assert_eq!(signer.public_key, existing.public_key);
		assert!(chain.sent().is_empty());
	}

	#[tokio::test]
	async fn test_invalid_username_rejected_before_any_read() {
		let chain = funded_chain();
		let hub = LedgerHub::new(&chain, true);
		let orchestrator = orchestrator(&chain, hub, Arc::new(MemoryNames::default()));

		let report = orchestrator
			.run(BootstrapOptions {
				username: Some("Not_Valid".into()),
				..Default::default()
			})
			.await;

		assert_eq!(report.failure.unwrap().stage, Stage::Username);
		assert!(report.balances.is_none());
		assert!(chain.sent().is_empty());
	}

	#[tokio::test]
	async fn test_taken_username_keeps_earlier_progress() {
		let chain = funded_chain();
		let hub = LedgerHub::new(&chain, true);
		let orchestrator = orchestrator(&chain, hub.clone(), MemoryNames::holding("alice", 1));

		let report = orchestrator
			.run(BootstrapOptions {
				username: Some("alice".into()),
				first_cast: Some(CastDraft::new("gm")),
				..Default::default()
			})
			.await;

		let failure = report.failure.as_ref().unwrap();
		assert_eq!(failure.stage, Stage::Username);
		assert!(report.identity.is_some());
		assert!(report.signer.is_some());
		assert!(report.cast.is_none());
		assert_eq!(hub.submitted(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_sync_timeout_does_not_fail_the_run() {
		let chain = funded_chain();
		let hub = LedgerHub::new(&chain, false);
		let orchestrator = orchestrator(&chain, hub.clone(), Arc::new(MemoryNames::default()));

		let report = orchestrator
			.run(BootstrapOptions {
				wait_for_sync: true,
				first_cast: Some(CastDraft::new("hello")),
				..Default::default()
			})
			.await;

		assert!(report.is_success());
		assert!(matches!(
			report.sync,
			Some(SyncOutcome::TimedOut {
				identity_seen: false,
				..
			})
		));
		assert!(report.cast.is_some());
		assert_eq!(hub.submitted(), 1);
	}
}
