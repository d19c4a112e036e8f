//! Execution of funding plans.

use alloy_primitives::{Address, B256, U256};
use hubstrap_types::{
	poll_until, Amount, Asset, FundingPolicy, FundingStrategy, PollOutcome, PollPolicy, Step,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{
	balances::ChainBalanceReader, BridgeInterface, BridgeRequest, FundingError, SwapInterface,
	SwapRequest,
};

/// One fee tier tried by a swap step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAttempt {
	pub fee_tier: u32,
	/// Revert reason when the tier failed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl TierAttempt {
	pub fn succeeded(&self) -> bool {
		self.error.is_none()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
	Succeeded,
	/// The bridge deposit went through but the funds had not landed when the
	/// poll window closed. They may still arrive.
	Pending,
	Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
	pub index: usize,
	pub step: Step,
	pub status: StepStatus,
	/// Amount the step moved, once resolved against a fresh balance.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub amount: Option<U256>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tx_hash: Option<B256>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tiers: Vec<TierAttempt>,
}

impl fmt::Display for StepOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{} {}: ", self.index, self.step)?;
		match &self.status {
			StepStatus::Succeeded => write!(f, "ok"),
			StepStatus::Pending => write!(f, "pending"),
			StepStatus::Failed { reason } => write!(f, "failed ({reason})"),
		}
	}
}

/// Every step attempted, in order. Steps after a failed or pending one are
/// never attempted and do not appear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
	pub outcomes: Vec<StepOutcome>,
	pub planned_steps: usize,
}

impl ExecutionReport {
	pub fn is_complete(&self) -> bool {
		self.outcomes.len() == self.planned_steps
			&& self
				.outcomes
				.iter()
				.all(|o| o.status == StepStatus::Succeeded)
	}

	pub fn is_pending(&self) -> bool {
		self.outcomes
			.last()
			.is_some_and(|o| o.status == StepStatus::Pending)
	}

	pub fn failure(&self) -> Option<&StepOutcome> {
		self.outcomes
			.iter()
			.find(|o| matches!(o.status, StepStatus::Failed { .. }))
	}
}

/// What a step produced before it is turned into an outcome.
struct StepEffect {
	amount: U256,
	tx_hash: B256,
	pending: bool,
}

/// Runs plan steps strictly in order on behalf of one account.
pub struct FundRouter {
	reader: Arc<ChainBalanceReader>,
	swap: Arc<dyn SwapInterface>,
	bridge: Arc<dyn BridgeInterface>,
	policy: FundingPolicy,
	bridge_poll: PollPolicy,
	owner: Address,
}

impl FundRouter {
	pub fn new(
		reader: Arc<ChainBalanceReader>,
		swap: Arc<dyn SwapInterface>,
		bridge: Arc<dyn BridgeInterface>,
		policy: FundingPolicy,
		bridge_poll: PollPolicy,
		owner: Address,
	) -> Self {
		Self {
			reader,
			swap,
			bridge,
			policy,
			bridge_poll,
			owner,
		}
	}

	/// Executes `strategy`.
	///
	/// An insufficient plan is refused before anything is sent. Otherwise
	/// the first failed or pending step ends execution, and the report holds
	/// every step attempted up to and including it. The whole plan is never
	/// retried here; callers re-plan from fresh balances.
	pub async fn execute(&self, strategy: &FundingStrategy) -> Result<ExecutionReport, FundingError> {
		if let Some(insufficiency) = &strategy.insufficiency {
			return Err(FundingError::InsufficientFunds(insufficiency.detail.clone()));
		}

		let mut report = ExecutionReport {
			outcomes: Vec::with_capacity(strategy.steps.len()),
			planned_steps: strategy.steps.len(),
		};

		for (index, step) in strategy.steps.iter().enumerate() {
			tracing::info!(index, %step, "Executing funding step");
			let mut tiers = Vec::new();
			let result = match step {
				Step::Swap {
					chain_id,
					from,
					to,
					amount,
				} => self.run_swap(*chain_id, *from, *to, amount, &mut tiers).await,
				Step::Bridge {
					from_chain,
					to_chain,
					amount,
				} => self.run_bridge(*from_chain, *to_chain, amount).await,
			};

			let outcome = match result {
				Ok(effect) => StepOutcome {
					index,
					step: step.clone(),
					status: if effect.pending {
						StepStatus::Pending
					} else {
						StepStatus::Succeeded
					},
					amount: Some(effect.amount),
					tx_hash: Some(effect.tx_hash),
					tiers,
				},
				Err(e) => {
					tracing::error!(index, error = %e, "Funding step failed");
					StepOutcome {
						index,
						step: step.clone(),
						status: StepStatus::Failed {
							reason: e.to_string(),
						},
						amount: None,
						tx_hash: None,
						tiers,
					}
				},
			};

			let stop = outcome.status != StepStatus::Succeeded;
			report.outcomes.push(outcome);
			if stop {
				break;
			}
		}

		Ok(report)
	}

	async fn resolve(&self, chain_id: u64, asset: Asset, amount: &Amount) -> Result<U256, FundingError> {
		let balance = self.reader.balance(chain_id, asset, self.owner).await?;
		amount.resolve(balance).ok_or_else(|| {
			FundingError::InsufficientFunds(format!(
				"step needs {amount} {asset} on chain {chain_id}, balance is {balance}"
			))
		})
	}

	/// Tries each fee tier from narrowest to widest. A revert moves on to the
	/// next tier; any other error ends the step.
	async fn run_swap(
		&self,
		chain_id: u64,
		from: Asset,
		to: Asset,
		amount: &Amount,
		tiers: &mut Vec<TierAttempt>,
	) -> Result<StepEffect, FundingError> {
		let amount_in = self.resolve(chain_id, from, amount).await?;

		for &fee_tier in &self.policy.fee_tiers {
			let request = SwapRequest {
				chain_id,
				from,
				to,
				amount_in,
				fee_tier,
			};
			match self.swap.swap(request).await {
				Ok(receipt) => {
					tracing::info!(chain_id, fee_tier, tx_hash = %receipt.tx_hash, "Swap confirmed");
					tiers.push(TierAttempt {
						fee_tier,
						error: None,
					});
					return Ok(StepEffect {
						amount: amount_in,
						tx_hash: receipt.tx_hash,
						pending: false,
					});
				},
				Err(e) if e.is_revert() => {
					tracing::warn!(chain_id, fee_tier, error = %e, "Swap reverted, trying next fee tier");
					tiers.push(TierAttempt {
						fee_tier,
						error: Some(e.to_string()),
					});
				},
				Err(e) => {
					tiers.push(TierAttempt {
						fee_tier,
						error: Some(e.to_string()),
					});
					return Err(e);
				},
			}
		}

		Err(FundingError::SwapExhausted {
			chain_id,
			tiers: self.policy.fee_tiers.clone(),
		})
	}

	/// Deposits, then watches the destination balance until the relayer's
	/// fill shows up or the poll window closes.
	async fn run_bridge(
		&self,
		from_chain: u64,
		to_chain: u64,
		amount: &Amount,
	) -> Result<StepEffect, FundingError> {
		let input_amount = self.resolve(from_chain, Asset::Native, amount).await?;
		let output_amount = self.policy.bridge_output(input_amount);
		let baseline = self
			.reader
			.balance(to_chain, Asset::Native, self.owner)
			.await?;

		let deposit = self
			.bridge
			.deposit(BridgeRequest {
				from_chain,
				to_chain,
				input_amount,
				output_amount,
			})
			.await?;
		tracing::info!(
			from_chain,
			to_chain,
			tx_hash = %deposit.tx_hash,
			input = %input_amount,
			output = %output_amount,
			"Bridge deposit confirmed, waiting for fill"
		);

		let expected = baseline + output_amount;
		let outcome = poll_until(&self.bridge_poll, |_| async move {
			let balance = self
				.reader
				.balance(to_chain, Asset::Native, self.owner)
				.await?;
			Ok::<_, FundingError>((balance >= expected).then_some(balance))
		})
		.await;

		let pending = match outcome {
			PollOutcome::Ready { value, attempts } => {
				tracing::info!(to_chain, balance = %value, attempts, "Bridge fill landed");
				false
			},
			PollOutcome::TimedOut {
				attempts,
				last_error,
			} => {
				tracing::warn!(
					to_chain,
					attempts,
					last_error = last_error.as_deref().unwrap_or("none"),
					"Bridge fill not observed before timeout"
				);
				true
			},
		};

		Ok(StepEffect {
			amount: input_amount,
			tx_hash: deposit.tx_hash,
			pending,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{BridgeDeposit, SwapReceipt};
	use async_trait::async_trait;
	use hubstrap_delivery::{DeliveryError, DeliveryService, MockDeliveryInterface};
	use hubstrap_types::{
		builders::{default_policy, default_registry, BASE, OPTIMISM},
		Insufficiency, PlanRule,
	};
	use std::sync::Mutex;
	use std::time::Duration;

	/// Swap stub failing tiers listed in `revert_tiers`.
	struct TierSwap {
		revert_tiers: Vec<u32>,
		network_error: bool,
		calls: Mutex<Vec<u32>>,
	}

	#[async_trait]
	impl SwapInterface for TierSwap {
		async fn swap(&self, request: SwapRequest) -> Result<SwapReceipt, FundingError> {
			self.calls.lock().unwrap().push(request.fee_tier);
			if self.network_error {
				return Err(DeliveryError::Network("connection reset".into()).into());
			}
			if self.revert_tiers.contains(&request.fee_tier) {
				return Err(DeliveryError::Reverted("no pool".into()).into());
			}
			Ok(SwapReceipt {
				tx_hash: B256::with_last_byte(request.fee_tier as u8),
				min_amount_out: U256::ZERO,
			})
		}
	}

	struct NeverBridge;

	#[async_trait]
	impl BridgeInterface for NeverBridge {
		async fn deposit(&self, _request: BridgeRequest) -> Result<BridgeDeposit, FundingError> {
			Ok(BridgeDeposit {
				tx_hash: B256::with_last_byte(0xbb),
				fill_deadline: 0,
			})
		}
	}

	fn flat_balances(native: u64, stable: u64) -> Arc<ChainBalanceReader> {
		let mut mock = MockDeliveryInterface::new();
		mock.expect_get_balance().returning(move |_, token, _| {
			Box::pin(async move {
				Ok(U256::from(if token.is_some() { stable } else { native }))
			})
		});
		let delivery = Arc::new(DeliveryService::new(Arc::new(mock), Address::ZERO));
		Arc::new(ChainBalanceReader::new(delivery, default_registry()))
	}

	fn router(reader: Arc<ChainBalanceReader>, swap: Arc<dyn SwapInterface>) -> FundRouter {
		FundRouter::new(
			reader,
			swap,
			Arc::new(NeverBridge),
			default_policy(),
			PollPolicy::new(Duration::from_secs(10), Duration::from_secs(30)),
			Address::ZERO,
		)
	}

	fn swap_plan(amount: u64) -> FundingStrategy {
		FundingStrategy::with_steps(
			PlanRule::StableOnPayment,
			vec![
				Step::Swap {
					chain_id: BASE,
					from: Asset::Stable,
					to: Asset::Native,
					amount: Amount::Exact(U256::from(amount)),
				},
				Step::Bridge {
					from_chain: BASE,
					to_chain: OPTIMISM,
					amount: Amount::BalanceMinus(U256::ZERO),
				},
			],
		)
	}

	#[tokio::test]
	async fn test_swap_falls_back_to_wider_tier() {
		let swap = Arc::new(TierSwap {
			revert_tiers: vec![500],
			network_error: false,
			calls: Mutex::default(),
		});
		let router = router(flat_balances(0, 2_000_000), swap.clone());
		let plan = FundingStrategy::with_steps(PlanRule::StableOnPayment, swap_plan(1_000).steps[..1].to_vec());

		let report = router.execute(&plan).await.unwrap();

		assert!(report.is_complete());
		let outcome = &report.outcomes[0];
		assert_eq!(outcome.tx_hash, Some(B256::with_last_byte((3_000u32) as u8)));
		assert_eq!(outcome.tiers.len(), 2);
		assert_eq!(outcome.tiers[0].fee_tier, 500);
		assert!(!outcome.tiers[0].succeeded());
		assert!(outcome.tiers[1].succeeded());
		assert_eq!(*swap.calls.lock().unwrap(), vec![500, 3_000]);
	}

	#[tokio::test]
	async fn test_all_tiers_reverting_stops_the_plan() {
		let swap = Arc::new(TierSwap {
			revert_tiers: vec![500, 3_000],
			network_error: false,
			calls: Mutex::default(),
		});
		let router = router(flat_balances(0, 2_000_000), swap);

		let report = router.execute(&swap_plan(1_000)).await.unwrap();

		assert_eq!(report.outcomes.len(), 1);
		assert_eq!(report.planned_steps, 2);
		match &report.outcomes[0].status {
			StepStatus::Failed { reason } => assert!(reason.contains("all fee tiers")),
			other => panic!("unexpected status {other:?}"),
		}
		assert!(report.failure().is_some());
		assert!(!report.is_complete());
	}

	#[tokio::test]
	async fn test_network_error_is_not_retried_on_next_tier() {
		let swap = Arc::new(TierSwap {
			revert_tiers: vec![],
			network_error: true,
			calls: Mutex::default(),
		});
		let router = router(flat_balances(0, 2_000_000), swap.clone());

		let report = router.execute(&swap_plan(1_000)).await.unwrap();

		assert!(report.failure().is_some());
		assert_eq!(*swap.calls.lock().unwrap(), vec![500]);
	}

	#[tokio::test]
	async fn test_unresolvable_amount_fails_before_sending() {
		let swap = Arc::new(TierSwap {
			revert_tiers: vec![],
			network_error: false,
			calls: Mutex::default(),
		});
		let router = router(flat_balances(0, 500), swap.clone());

		let report = router.execute(&swap_plan(1_000)).await.unwrap();

		assert!(matches!(
			&report.outcomes[0].status,
			StepStatus::Failed { reason } if reason.contains("Insufficient funds")
		));
		assert!(swap.calls.lock().unwrap().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_bridge_without_fill_is_pending() {
		let swap = Arc::new(TierSwap {
			revert_tiers: vec![],
			network_error: false,
			calls: Mutex::default(),
		});
		// Balances never move, so the fill is never observed.
		let router = router(flat_balances(1_000_000_000_000_000, 0), swap);
		let plan = FundingStrategy::with_steps(
			PlanRule::NativeOnPayment,
			vec![Step::Bridge {
				from_chain: BASE,
				to_chain: OPTIMISM,
				amount: Amount::Exact(U256::from(500_000_000_000_000u64)),
			}],
		);

		let report = router.execute(&plan).await.unwrap();

		assert!(report.is_pending());
		assert!(report.failure().is_none());
		assert_eq!(report.outcomes[0].tx_hash, Some(B256::with_last_byte(0xbb)));
	}

	#[tokio::test]
	async fn test_insufficient_plan_is_refused() {
		let swap = Arc::new(TierSwap {
			revert_tiers: vec![],
			network_error: false,
			calls: Mutex::default(),
		});
		let router = router(flat_balances(0, 0), swap.clone());
		let plan = FundingStrategy::insufficient(Insufficiency {
			needs_native: true,
			needs_stable: true,
			detail: "nothing anywhere".into(),
		});

		let err = router.execute(&plan).await.unwrap_err();
		assert!(matches!(err, FundingError::InsufficientFunds(_)));
		assert!(swap.calls.lock().unwrap().is_empty());
	}
}
