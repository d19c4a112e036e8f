//! Component wiring from configuration.

use alloy_primitives::U256;
use hubstrap_account::AccountInterface;
use hubstrap_config::Config;
use hubstrap_delivery::{AlloyDelivery, DeliveryService};
use hubstrap_funding::{
	AcrossBridge, ChainBalanceReader, FundRouter, FundingStrategyPlanner, UniswapSwap,
};
use hubstrap_hub::{
	CastSubmitter, FarcasterNetwork, HubClient, HubInterface, MessageSigner, SyncWaiter,
};
use hubstrap_identity::{
	IdentityContracts, IdentityRegistrar, NameRegistryClient, SignerKeyIssuer, UsernameService,
};
use hubstrap_payment::{PaymentAuthorizer, PaymentSettings, ProtectedClient, ReqwestTransport};
use hubstrap_types::{ChainRegistry, Fid, PollPolicy, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

use crate::BootstrapError;

/// Every component the bootstrap uses, built for one custody account.
///
/// The per-step CLI commands use the components directly; the composed
/// flow hands the whole context to [`crate::BootstrapOrchestrator`].
pub struct BootstrapContext {
	pub account: Arc<dyn AccountInterface>,
	pub registry: ChainRegistry,
	pub delivery: Arc<DeliveryService>,
	pub reader: Arc<ChainBalanceReader>,
	pub planner: FundingStrategyPlanner,
	pub router: FundRouter,
	pub registrar: IdentityRegistrar,
	pub issuer: SignerKeyIssuer,
	pub hub: Arc<dyn HubInterface>,
	pub names: Arc<UsernameService>,
	pub network: FarcasterNetwork,
	pub sync_policy: PollPolicy,
	pub verify_delay: Duration,
	/// Intervals for a fresh limiter. Each command clones its own, so spacing
	/// does not carry over between invocations.
	pub rate_limits: RateLimiter,
}

impl BootstrapContext {
	/// Builds providers, payment client and protocol components.
	///
	/// No network traffic happens here.
	pub fn from_config(
		config: &Config,
		account: Arc<dyn AccountInterface>,
	) -> Result<Self, BootstrapError> {
		let registry = config.chain_registry()?;
		let policy = config.funding_policy();
		let owner = account.address();

		let alloy = AlloyDelivery::new(
			&registry,
			account.signer(),
			Duration::from_millis(config.polling.receipt.timeout_ms),
		)?;
		let delivery = Arc::new(DeliveryService::new(Arc::new(alloy), owner));

		let reader = Arc::new(ChainBalanceReader::new(delivery.clone(), registry.clone()));
		let swap = Arc::new(UniswapSwap::new(
			delivery.clone(),
			registry.clone(),
			policy.max_slippage_bps,
		));
		let bridge = Arc::new(AcrossBridge::new(
			delivery.clone(),
			registry.clone(),
			policy.fill_deadline_secs,
		));
		let router = FundRouter::new(
			reader.clone(),
			swap,
			bridge,
			policy.clone(),
			config.polling.bridge.policy(),
			owner,
		);
		let planner = FundingStrategyPlanner::new(registry.clone(), policy);

		let contracts = identity_contracts(config);
		let registrar = IdentityRegistrar::new(
			delivery.clone(),
			contracts.clone(),
			U256::from(config.funding.registration_buffer),
		);
		let issuer = SignerKeyIssuer::new(delivery.clone(), account.clone(), contracts);

		let payment_chain = registry.payment_chain();
		let authorizer = PaymentAuthorizer::new(
			account.clone(),
			PaymentSettings {
				chain_id: payment_chain.id,
				token: payment_chain.stablecoin.clone(),
				validity_secs: config.payment.validity_secs,
				network: config.payment.network.clone(),
				version: config.payment.version,
			},
		)?;
		let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
			config.hub.request_timeout_secs,
		))?);
		let protected = ProtectedClient::new(
			Arc::new(authorizer),
			transport.clone(),
			config.payment.header.clone(),
			U256::from(config.payment.amount),
			config.payment.payee,
		);
		let hub = Arc::new(HubClient::new(config.hub.base_url.clone(), Arc::new(protected)));
		let names = Arc::new(UsernameService::new(Arc::new(NameRegistryClient::new(
			config.hub.name_registry_url.clone(),
			transport,
		))));

		tracing::debug!(
			%owner,
			chains = registry.len(),
			registration_chain = registry.registration_chain_id(),
			payment_chain = payment_chain.id,
			"Bootstrap context ready"
		);

		Ok(Self {
			account,
			registry,
			delivery,
			reader,
			planner,
			router,
			registrar,
			issuer,
			hub,
			names,
			network: FarcasterNetwork::Mainnet,
			sync_policy: config.sync_policy(),
			verify_delay: Duration::from_millis(config.hub.verify_delay_ms),
			rate_limits: config.rate_limits.limiter(),
		})
	}

	pub fn sync_waiter(&self) -> SyncWaiter {
		SyncWaiter::new(self.hub.clone(), self.sync_policy)
	}

	/// Submitter acting as `fid` through `signer`, resolving mentions
	/// through the name registry.
	pub fn cast_submitter(&self, fid: Fid, signer: MessageSigner) -> CastSubmitter {
		CastSubmitter::new(
			self.hub.clone(),
			Some(self.names.clone()),
			signer,
			fid,
			self.network,
			self.verify_delay,
		)
	}
}

fn identity_contracts(config: &Config) -> IdentityContracts {
	let c = &config.contracts;
	IdentityContracts {
		chain_id: config.roles.registration_chain,
		id_gateway: c.id_gateway,
		id_registry: c.id_registry,
		key_gateway: c.key_gateway,
		key_registry: c.key_registry,
		signed_key_request_validator: c.signed_key_request_validator,
		validator_eip712_name: c.validator_eip712_name.clone(),
		validator_eip712_version: c.validator_eip712_version.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identity_contracts_follow_config() {
		let config = Config::mainnet();
		let contracts = identity_contracts(&config);

		assert_eq!(contracts, IdentityContracts::optimism());
	}
}
