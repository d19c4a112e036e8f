//! Balance snapshots across the chain registry.

use alloy_primitives::{Address, U256};
use futures::future::join_all;
use hubstrap_delivery::{DeliveryError, DeliveryService};
use hubstrap_types::{unix_now, Asset, BalanceSnapshot, ChainBalance, ChainRegistry};
use std::sync::Arc;

use crate::FundingError;

/// Reads native and stablecoin balances of one account.
pub struct ChainBalanceReader {
	delivery: Arc<DeliveryService>,
	registry: ChainRegistry,
}

impl ChainBalanceReader {
	pub fn new(delivery: Arc<DeliveryService>, registry: ChainRegistry) -> Self {
		Self { delivery, registry }
	}

	pub fn registry(&self) -> &ChainRegistry {
		&self.registry
	}

	/// Reads every chain concurrently and assembles one snapshot.
	///
	/// A chain whose reads fail is recorded in `errors` and reads as zero;
	/// the other chains are unaffected.
	pub async fn read_balances(&self, owner: Address) -> BalanceSnapshot {
		let reads = self.registry.iter().map(|chain| async move {
			let balance = self.read_chain(chain.id, owner).await;
			(chain.id, balance)
		});
		let results = join_all(reads).await;

		let mut snapshot = BalanceSnapshot::new(unix_now());
		for (chain_id, result) in results {
			match result {
				Ok(balance) => {
					tracing::debug!(
						chain_id,
						native = %balance.native,
						stable = %balance.stable,
						"Balance read"
					);
					snapshot.insert(chain_id, balance);
				},
				Err(e) => {
					tracing::warn!(chain_id, error = %e, "Balance read failed, continuing without chain");
					snapshot.record_error(chain_id, e.to_string());
				},
			}
		}
		snapshot
	}

	async fn read_chain(&self, chain_id: u64, owner: Address) -> Result<ChainBalance, FundingError> {
		let (native, stable) = tokio::try_join!(
			self.balance(chain_id, Asset::Native, owner),
			self.balance(chain_id, Asset::Stable, owner),
		)?;
		Ok(ChainBalance::new(native, stable))
	}

	/// Fresh single-asset read on one chain.
	pub async fn balance(
		&self,
		chain_id: u64,
		asset: Asset,
		owner: Address,
	) -> Result<U256, FundingError> {
		let result: Result<U256, DeliveryError> = match asset {
			Asset::Native => self.delivery.native_balance(chain_id, owner).await,
			Asset::Stable => {
				let token = self.registry.require(chain_id)?.stablecoin.address;
				self.delivery.token_balance(chain_id, token, owner).await
			},
		};
		Ok(result?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hubstrap_delivery::MockDeliveryInterface;
	use hubstrap_types::builders::{registry_with_fallbacks, BASE, OPTIMISM};

	#[tokio::test]
	async fn test_failed_chain_is_recorded_and_others_survive() {
		let mut mock = MockDeliveryInterface::new();
		mock.expect_get_balance()
			.returning(|_, token, chain_id| {
				Box::pin(async move {
					match (chain_id, token.is_some()) {
						(OPTIMISM, false) => Ok(U256::from(3u64)),
						(OPTIMISM, true) => Ok(U256::from(4u64)),
						(BASE, _) => Err(DeliveryError::Network("connection refused".into())),
						(_, false) => Ok(U256::from(7u64)),
						(_, true) => Ok(U256::ZERO),
					}
				})
			});
		let delivery = Arc::new(DeliveryService::new(Arc::new(mock), Address::ZERO));
		let reader = ChainBalanceReader::new(delivery, registry_with_fallbacks(&[42161]));

		let snapshot = reader.read_balances(Address::ZERO).await;

		assert_eq!(snapshot.native(OPTIMISM), U256::from(3u64));
		assert_eq!(snapshot.stable(OPTIMISM), U256::from(4u64));
		assert_eq!(snapshot.native(42161), U256::from(7u64));
		assert!(snapshot.errors.contains_key(&BASE));
		assert_eq!(snapshot.get(BASE), ChainBalance::default());
		assert!(snapshot.is_partial());
	}

	#[tokio::test]
	async fn test_stable_read_uses_registry_token() {
		let registry = registry_with_fallbacks(&[]);
		let usdc = registry.payment_chain().stablecoin.address;
		let mut mock = MockDeliveryInterface::new();
		mock.expect_get_balance()
			.withf(move |_, token, chain_id| *token == Some(usdc) && *chain_id == BASE)
			.times(1)
			.returning(|_, _, _| Box::pin(async { Ok(U256::from(2_000_000u64)) }));
		let delivery = Arc::new(DeliveryService::new(Arc::new(mock), Address::ZERO));
		let reader = ChainBalanceReader::new(delivery, registry);

		let stable = reader
			.balance(BASE, Asset::Stable, Address::ZERO)
			.await
			.unwrap();
		assert_eq!(stable, U256::from(2_000_000u64));
	}
}
