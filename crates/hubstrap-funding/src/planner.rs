//! Funding plans from a balance snapshot.
//!
//! Rules are evaluated in a fixed order and the first one that applies wins.
//! Earlier rules need fewer bridge hops:
//!
//! 1. both targets met: nothing to do;
//! 2. registration chain has native to spare: bridge the spare to the
//!    payment chain and swap it into stablecoin;
//! 3. payment chain holds native: bridge to the registration chain and swap
//!    a fixed slice into stablecoin;
//! 4. payment chain holds stablecoin: swap to native, bridge the proceeds;
//! 5. any fallback chain, native sources before stablecoin sources;
//! 6. otherwise the plan is an explicit insufficiency.
//!
//! Amounts are integer minor units throughout. Where a rule's native outcome
//! can be computed (bridges of native only), the rule only applies if it
//! actually reaches the registration target after relayer fees.

use alloy_primitives::U256;
use hubstrap_types::{
	Amount, Asset, BalanceSnapshot, Chain, ChainRegistry, FundingPolicy, FundingStrategy,
	Insufficiency, PlanRule, Step,
};

/// Pure planner over a fixed chain registry and policy.
#[derive(Debug, Clone)]
pub struct FundingStrategyPlanner {
	registry: ChainRegistry,
	policy: FundingPolicy,
}

/// What is missing, computed once per plan.
struct Needs {
	native: bool,
	stable: bool,
}

impl FundingStrategyPlanner {
	pub fn new(registry: ChainRegistry, policy: FundingPolicy) -> Self {
		Self { registry, policy }
	}

	pub fn policy(&self) -> &FundingPolicy {
		&self.policy
	}

	/// Plans the steps that bring both targets within reach. Chains missing
	/// from the snapshot count as empty.
	pub fn plan(&self, snapshot: &BalanceSnapshot) -> FundingStrategy {
		let reg = self.registry.registration_chain_id();
		let pay = self.registry.payment_chain_id();
		let targets = &self.policy.targets;

		let needs = Needs {
			native: snapshot.native(reg) < targets.registration_native,
			stable: snapshot.stable(pay) < targets.payment_stable,
		};
		if !needs.native && !needs.stable {
			return FundingStrategy::ready();
		}

		let strategy = self
			.spare_on_registration(snapshot, &needs)
			.or_else(|| self.native_on_payment(snapshot, &needs))
			.or_else(|| self.stable_on_payment(snapshot, &needs))
			.or_else(|| self.fallback_native(snapshot, &needs))
			.or_else(|| self.fallback_stable(snapshot, &needs));

		match strategy {
			Some(strategy) => {
				tracing::debug!(rule = ?strategy.rule, steps = strategy.steps.len(), "Funding plan");
				strategy
			},
			None => FundingStrategy::insufficient(self.insufficiency(snapshot, &needs)),
		}
	}

	fn spare_on_registration(&self, snapshot: &BalanceSnapshot, needs: &Needs) -> Option<FundingStrategy> {
		if needs.native || !needs.stable {
			return None;
		}
		let reg = self.registry.registration_chain_id();
		let pay = self.registry.payment_chain_id();
		let spare = snapshot
			.native(reg)
			.checked_sub(self.policy.targets.registration_native)?
			.checked_sub(self.policy.native_gas_reserve)?;
		if spare < self.policy.native_source_min {
			return None;
		}

		Some(FundingStrategy::with_steps(
			PlanRule::SpareOnRegistration,
			vec![
				bridge(reg, pay, Amount::Exact(spare)),
				swap(pay, Asset::Native, Asset::Stable, Amount::BalanceMinus(self.policy.native_gas_reserve)),
			],
		))
	}

	fn native_on_payment(&self, snapshot: &BalanceSnapshot, needs: &Needs) -> Option<FundingStrategy> {
		let reg = self.registry.registration_chain_id();
		let pay = self.registry.payment_chain_id();
		let pay_native = snapshot.native(pay);
		if pay_native < self.policy.native_source_min {
			return None;
		}
		let available = pay_native.checked_sub(self.policy.native_gas_reserve)?;
		let swap_amount = if needs.stable {
			self.policy.native_swap_amount.min(available)
		} else {
			U256::ZERO
		};

		let mut steps = Vec::new();
		if needs.native {
			let bridged = available - swap_amount;
			if !self.reaches_native_target(snapshot.native(reg), self.policy.bridge_output(bridged)) {
				return None;
			}
			steps.push(bridge(pay, reg, Amount::Exact(bridged)));
		}
		if !swap_amount.is_zero() {
			steps.push(swap(pay, Asset::Native, Asset::Stable, Amount::Exact(swap_amount)));
		}
		if steps.is_empty() {
			return None;
		}
		Some(FundingStrategy::with_steps(PlanRule::NativeOnPayment, steps))
	}

	fn stable_on_payment(&self, snapshot: &BalanceSnapshot, needs: &Needs) -> Option<FundingStrategy> {
		if !needs.native {
			return None;
		}
		let reg = self.registry.registration_chain_id();
		let pay = self.registry.payment_chain_id();
		let pay_stable = snapshot.stable(pay);
		if pay_stable <= self.policy.stable_source_min {
			return None;
		}
		let swap_amount = pay_stable.checked_sub(self.policy.effective_stable_reserve())?;
		if swap_amount.is_zero() {
			return None;
		}

		Some(FundingStrategy::with_steps(
			PlanRule::StableOnPayment,
			vec![
				swap(pay, Asset::Stable, Asset::Native, Amount::Exact(swap_amount)),
				bridge(pay, reg, Amount::BalanceMinus(self.policy.native_gas_reserve)),
			],
		))
	}

	fn fallback_native(&self, snapshot: &BalanceSnapshot, needs: &Needs) -> Option<FundingStrategy> {
		let reg = self.registry.registration_chain_id();
		let pay = self.registry.payment_chain_id();
		let reserve = self.policy.native_gas_reserve;

		self.registry
			.fallback_chains()
			.filter(|chain| chain.spoke_pool.is_some())
			.find_map(|chain| {
				let native = snapshot.native(chain.id);
				if native < self.policy.native_source_min {
					return None;
				}
				let available = native.checked_sub(reserve)?;

				let steps = match (needs.native, needs.stable) {
					(true, false) => {
						let landed = self.policy.bridge_output(available);
						if !self.reaches_native_target(snapshot.native(reg), landed) {
							return None;
						}
						vec![bridge(chain.id, reg, Amount::Exact(available))]
					},
					(false, _) => vec![
						bridge(chain.id, pay, Amount::Exact(available)),
						swap(pay, Asset::Native, Asset::Stable, Amount::BalanceMinus(reserve)),
					],
					(true, true) => {
						let on_payment = snapshot.native(pay) + self.policy.bridge_output(available);
						let swap_amount = self.policy.native_swap_amount;
						let onward = on_payment.checked_sub(swap_amount)?.checked_sub(reserve)?;
						if !self.reaches_native_target(snapshot.native(reg), self.policy.bridge_output(onward)) {
							return None;
						}
						vec![
							bridge(chain.id, pay, Amount::Exact(available)),
							swap(pay, Asset::Native, Asset::Stable, Amount::Exact(swap_amount)),
							bridge(pay, reg, Amount::BalanceMinus(reserve)),
						]
					},
				};
				Some(FundingStrategy::with_steps(PlanRule::FallbackNative(chain.id), steps))
			})
	}

	fn fallback_stable(&self, snapshot: &BalanceSnapshot, needs: &Needs) -> Option<FundingStrategy> {
		let reg = self.registry.registration_chain_id();
		let pay = self.registry.payment_chain_id();
		let reserve = self.policy.native_gas_reserve;

		self.registry
			.fallback_chains()
			.filter(|chain| can_swap_and_bridge(chain))
			.find_map(|chain| {
				if snapshot.stable(chain.id) <= self.policy.stable_source_min {
					return None;
				}
				let mut steps = vec![swap(
					chain.id,
					Asset::Stable,
					Asset::Native,
					Amount::BalanceMinus(U256::ZERO),
				)];
				if needs.stable {
					steps.push(bridge(chain.id, pay, Amount::BalanceMinus(reserve)));
					if needs.native {
						steps.push(swap(
							pay,
							Asset::Native,
							Asset::Stable,
							Amount::Exact(self.policy.native_swap_amount),
						));
						steps.push(bridge(pay, reg, Amount::BalanceMinus(reserve)));
					} else {
						steps.push(swap(pay, Asset::Native, Asset::Stable, Amount::BalanceMinus(reserve)));
					}
				} else {
					steps.push(bridge(chain.id, reg, Amount::BalanceMinus(reserve)));
				}
				Some(FundingStrategy::with_steps(PlanRule::FallbackStable(chain.id), steps))
			})
	}

	fn reaches_native_target(&self, current: U256, landed: U256) -> bool {
		current.saturating_add(landed) >= self.policy.targets.registration_native
	}

	fn insufficiency(&self, snapshot: &BalanceSnapshot, needs: &Needs) -> Insufficiency {
		let reg = self.registry.registration_chain_id();
		let pay = self.registry.payment_chain_id();
		let mut missing = Vec::new();
		if needs.native {
			missing.push(format!(
				"native on chain {reg}: have {}, need {}",
				snapshot.native(reg),
				self.policy.targets.registration_native
			));
		}
		if needs.stable {
			missing.push(format!(
				"stablecoin on chain {pay}: have {}, need {}",
				snapshot.stable(pay),
				self.policy.targets.payment_stable
			));
		}
		let mut detail = format!("no funding source found ({})", missing.join("; "));
		if snapshot.is_partial() {
			let unread: Vec<String> = snapshot.errors.keys().map(|id| id.to_string()).collect();
			detail.push_str(&format!("; balances unavailable on chains {}", unread.join(", ")));
		}

		Insufficiency {
			needs_native: needs.native,
			needs_stable: needs.stable,
			detail,
		}
	}
}

fn can_swap_and_bridge(chain: &Chain) -> bool {
	chain.swap_router.is_some() && chain.spoke_pool.is_some()
}

fn swap(chain_id: u64, from: Asset, to: Asset, amount: Amount) -> Step {
	Step::Swap {
		chain_id,
		from,
		to,
		amount,
	}
}

fn bridge(from_chain: u64, to_chain: u64, amount: Amount) -> Step {
	Step::Bridge {
		from_chain,
		to_chain,
		amount,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hubstrap_types::builders::{
		default_policy, default_registry, registry_with_fallbacks, SnapshotBuilder, BASE, OPTIMISM,
	};
	use proptest::prelude::*;
	use std::collections::HashMap;

	const T1: u128 = 2_000_000_000_000_000;
	const T2: u128 = 10_000;
	const RESERVE: u128 = 100_000_000_000_000;
	const ARBITRUM: u64 = 42161;

	fn planner() -> FundingStrategyPlanner {
		FundingStrategyPlanner::new(default_registry(), default_policy())
	}

	fn planner_with(fallbacks: &[u64]) -> FundingStrategyPlanner {
		FundingStrategyPlanner::new(registry_with_fallbacks(fallbacks), default_policy())
	}

	#[test]
	fn test_ready_when_both_targets_met() {
		let snapshot = SnapshotBuilder::new()
			.native(OPTIMISM, T1)
			.stable(BASE, T2)
			.build();
		let plan = planner().plan(&snapshot);
		assert!(plan.ready);
		assert!(plan.steps.is_empty());
		assert_eq!(plan.rule, PlanRule::AlreadyFunded);
	}

	#[test]
	fn test_stable_on_payment_swaps_then_bridges() {
		let snapshot = SnapshotBuilder::new()
			.native(OPTIMISM, 0)
			.native(BASE, 0)
			.stable(BASE, 2_000_000)
			.build();
		let plan = planner().plan(&snapshot);

		assert_eq!(plan.rule, PlanRule::StableOnPayment);
		assert_eq!(
			plan.steps,
			vec![
				Step::Swap {
					chain_id: BASE,
					from: Asset::Stable,
					to: Asset::Native,
					amount: Amount::Exact(U256::from(1_900_000u64)),
				},
				Step::Bridge {
					from_chain: BASE,
					to_chain: OPTIMISM,
					amount: Amount::BalanceMinus(U256::from(RESERVE)),
				},
			]
		);
	}

	#[test]
	fn test_spare_registration_native_funds_payment_chain() {
		let snapshot = SnapshotBuilder::new()
			.native(OPTIMISM, T1 + RESERVE + 1_000_000_000_000_000)
			.build();
		let plan = planner().plan(&snapshot);

		assert_eq!(plan.rule, PlanRule::SpareOnRegistration);
		assert_eq!(
			plan.steps[0],
			Step::Bridge {
				from_chain: OPTIMISM,
				to_chain: BASE,
				amount: Amount::Exact(U256::from(1_000_000_000_000_000u128)),
			}
		);
		assert!(matches!(
			plan.steps[1],
			Step::Swap {
				chain_id: BASE,
				from: Asset::Native,
				to: Asset::Stable,
				..
			}
		));
	}

	#[test]
	fn test_native_on_payment_bridges_and_keeps_swap_slice() {
		let pay_native = 3_000_000_000_000_000u128;
		let snapshot = SnapshotBuilder::new().native(BASE, pay_native).build();
		let plan = planner().plan(&snapshot);

		let swap_amount = 200_000_000_000_000u128;
		assert_eq!(plan.rule, PlanRule::NativeOnPayment);
		assert_eq!(
			plan.steps,
			vec![
				Step::Bridge {
					from_chain: BASE,
					to_chain: OPTIMISM,
					amount: Amount::Exact(U256::from(pay_native - RESERVE - swap_amount)),
				},
				Step::Swap {
					chain_id: BASE,
					from: Asset::Native,
					to: Asset::Stable,
					amount: Amount::Exact(U256::from(swap_amount)),
				},
			]
		);
	}

	#[test]
	fn test_native_on_payment_too_small_for_target_falls_through() {
		// Above the source minimum, but the bridge cannot reach T1.
		let snapshot = SnapshotBuilder::new()
			.native(BASE, 1_000_000_000_000_000)
			.stable(BASE, T2)
			.build();
		let plan = planner().plan(&snapshot);
		assert!(plan.is_insufficient());
		assert!(plan.steps.is_empty());
	}

	#[test]
	fn test_fallback_prefers_native_over_stable() {
		let snapshot = SnapshotBuilder::new()
			.stable(1, 50_000_000)
			.native(ARBITRUM, 5_000_000_000_000_000)
			.stable(BASE, T2)
			.build();
		let plan = planner_with(&[1, ARBITRUM]).plan(&snapshot);

		assert_eq!(plan.rule, PlanRule::FallbackNative(ARBITRUM));
		assert_eq!(
			plan.steps,
			vec![Step::Bridge {
				from_chain: ARBITRUM,
				to_chain: OPTIMISM,
				amount: Amount::Exact(U256::from(5_000_000_000_000_000u128 - RESERVE)),
			}]
		);
	}

	#[test]
	fn test_fallback_stable_routes_through_payment_chain() {
		let snapshot = SnapshotBuilder::new().stable(ARBITRUM, 50_000_000).build();
		let plan = planner_with(&[ARBITRUM]).plan(&snapshot);

		assert_eq!(plan.rule, PlanRule::FallbackStable(ARBITRUM));
		let sources: Vec<u64> = plan.steps.iter().map(Step::source_chain).collect();
		assert_eq!(sources, vec![ARBITRUM, ARBITRUM, BASE, BASE]);
		assert!(matches!(
			plan.steps.last(),
			Some(Step::Bridge {
				to_chain: OPTIMISM,
				..
			})
		));
	}

	#[test]
	fn test_fallback_without_swap_router_is_skipped() {
		let registry = ChainRegistry::new(
			vec![
				hubstrap_types::builders::ChainBuilder::new(OPTIMISM).build(),
				hubstrap_types::builders::ChainBuilder::new(BASE).build(),
				hubstrap_types::builders::ChainBuilder::new(ARBITRUM)
					.without_swap_router()
					.build(),
			],
			OPTIMISM,
			BASE,
		)
		.unwrap();
		let planner = FundingStrategyPlanner::new(registry, default_policy());
		let snapshot = SnapshotBuilder::new().stable(ARBITRUM, 50_000_000).build();
		assert!(planner.plan(&snapshot).is_insufficient());
	}

	#[test]
	fn test_insufficiency_names_unread_chains() {
		let snapshot = SnapshotBuilder::new().failed(BASE, "timeout").build();
		let plan = planner().plan(&snapshot);
		let insufficiency = plan.insufficiency.unwrap();
		assert!(insufficiency.needs_native && insufficiency.needs_stable);
		assert!(insufficiency.detail.contains("8453"));
	}

	/// Applies steps to a balance book: bridges pay the relayer fee, swaps
	/// use a fixed price of `wei_per_unit`.
	fn simulate(
		policy: &FundingPolicy,
		snapshot: &BalanceSnapshot,
		steps: &[Step],
		wei_per_unit: u64,
	) -> Option<HashMap<(u64, Asset), U256>> {
		let mut book: HashMap<(u64, Asset), U256> = HashMap::new();
		for (chain, balance) in &snapshot.balances {
			book.insert((*chain, Asset::Native), balance.native);
			book.insert((*chain, Asset::Stable), balance.stable);
		}
		let rate = U256::from(wei_per_unit);
		for step in steps {
			match step {
				Step::Swap {
					chain_id,
					from,
					to,
					amount,
				} => {
					let source = book.entry((*chain_id, *from)).or_default();
					let input = amount.resolve(*source)?;
					*source -= input;
					let output = match from {
						Asset::Stable => input * rate,
						Asset::Native => input / rate,
					};
					*book.entry((*chain_id, *to)).or_default() += output;
				},
				Step::Bridge {
					from_chain,
					to_chain,
					amount,
				} => {
					let source = book.entry((*from_chain, Asset::Native)).or_default();
					let input = amount.resolve(*source)?;
					*source -= input;
					*book.entry((*to_chain, Asset::Native)).or_default() += policy.bridge_output(input);
				},
			}
		}
		Some(book)
	}

	fn below_every_threshold() -> impl Strategy<Value = BalanceSnapshot> {
		(
			0u128..500_000_000_000_000,
			0u128..500_000_000_000_000,
			0u128..=1_000_000,
			0u128..500_000_000_000_000,
			0u128..=1_000_000,
		)
			.prop_map(|(reg_native, pay_native, pay_stable, arb_native, arb_stable)| {
				SnapshotBuilder::new()
					.native(OPTIMISM, reg_native)
					.native(BASE, pay_native)
					.stable(BASE, pay_stable)
					.native(ARBITRUM, arb_native)
					.stable(ARBITRUM, arb_stable)
					.build()
			})
	}

	proptest! {
		#[test]
		fn prop_targets_met_means_empty_plan(
			reg_native in T1..T1 * 100,
			pay_stable in T2..T2 * 1_000,
			pay_native in 0u128..T1 * 10,
		) {
			let snapshot = SnapshotBuilder::new()
				.native(OPTIMISM, reg_native)
				.native(BASE, pay_native)
				.stable(BASE, pay_stable)
				.build();
			let plan = planner_with(&[ARBITRUM]).plan(&snapshot);
			prop_assert!(plan.ready);
			prop_assert!(plan.steps.is_empty());
		}

		#[test]
		fn prop_below_thresholds_is_insufficient(snapshot in below_every_threshold()) {
			let plan = planner_with(&[ARBITRUM]).plan(&snapshot);
			prop_assert!(!plan.ready);
			prop_assert!(plan.is_insufficient());
			prop_assert!(plan.steps.is_empty());
		}

		#[test]
		fn prop_planned_steps_are_executable_and_reach_targets(
			reg_native in 0u128..T1 * 3,
			pay_native in 0u128..T1 * 3,
			pay_stable in 0u128..5_000_000,
			arb_native in 0u128..T1 * 3,
		) {
			let planner = planner_with(&[ARBITRUM]);
			let snapshot = SnapshotBuilder::new()
				.native(OPTIMISM, reg_native)
				.native(BASE, pay_native)
				.stable(BASE, pay_stable)
				.native(ARBITRUM, arb_native)
				.build();
			let plan = planner.plan(&snapshot);
			prop_assume!(!plan.ready && !plan.is_insufficient());

			// A generous price keeps every swap large enough; the property
			// under test is that plans never overdraw and bridges land enough.
			let book = simulate(planner.policy(), &snapshot, &plan.steps, 10_000_000_000);
			prop_assert!(book.is_some(), "plan overdraws: {:?}", plan.steps);
			let book = book.unwrap();
			prop_assert!(book.get(&(OPTIMISM, Asset::Native)).copied().unwrap_or_default() >= U256::from(T1));
		}
	}
}
