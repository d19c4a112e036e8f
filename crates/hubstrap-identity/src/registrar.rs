//! Identity registration on the registration chain.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use hubstrap_delivery::DeliveryService;
use hubstrap_types::{format_units, Identity, Transaction, TransactionHash};
use std::sync::Arc;

use crate::{
	contracts::{lookup_identity, IIdGateway},
	IdentityContracts, IdentityError,
};

/// Result of [`IdentityRegistrar::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
	Registered {
		identity: Identity,
		tx_hash: TransactionHash,
		price: U256,
	},
	/// The account already owned an identifier; nothing was sent.
	AlreadyRegistered(Identity),
}

impl Registration {
	pub fn identity(&self) -> Identity {
		match self {
			Self::Registered { identity, .. } | Self::AlreadyRegistered(identity) => *identity,
		}
	}

	pub fn is_new(&self) -> bool {
		matches!(self, Self::Registered { .. })
	}
}

pub struct IdentityRegistrar {
	delivery: Arc<DeliveryService>,
	contracts: IdentityContracts,
	/// Extra native balance required on top of price and estimated gas.
	buffer: U256,
}

impl IdentityRegistrar {
	pub fn new(delivery: Arc<DeliveryService>, contracts: IdentityContracts, buffer: U256) -> Self {
		Self {
			delivery,
			contracts,
			buffer,
		}
	}

	pub async fn lookup(&self, owner: Address) -> Result<Option<Identity>, IdentityError> {
		lookup_identity(&self.delivery, &self.contracts, owner).await
	}

	/// Current registration price in wei.
	pub async fn price(&self) -> Result<U256, IdentityError> {
		let data = self
			.delivery
			.call(Transaction::call(
				self.contracts.chain_id,
				self.contracts.id_gateway,
				IIdGateway::priceCall {}.abi_encode(),
			))
			.await?;
		IIdGateway::priceCall::abi_decode_returns(&data)
			.map_err(|e| IdentityError::Decode(format!("price response: {e}")))
	}

	/// Registers an identity for the delivery account, which is also named
	/// as the recovery address. Returns the existing identity unchanged when
	/// the account already has one.
	pub async fn register(&self) -> Result<Registration, IdentityError> {
		let owner = self.delivery.sender();
		let chain_id = self.contracts.chain_id;

		if let Some(identity) = self.lookup(owner).await? {
			tracing::info!(fid = %identity.fid, %owner, "Identity already registered");
			return Ok(Registration::AlreadyRegistered(identity));
		}

		let price = self.price().await?;
		let balance = self.delivery.native_balance(chain_id, owner).await?;
		if balance < price {
			return Err(IdentityError::InsufficientFunds(format!(
				"balance {} ETH is below the registration price {} ETH",
				format_units(balance, 18),
				format_units(price, 18)
			)));
		}

		let call = IIdGateway::registerCall { recovery: owner };
		let tx = Transaction::call(chain_id, self.contracts.id_gateway, call.abi_encode())
			.with_value(price);
		let gas = self.delivery.estimate_gas(tx.clone()).await?;
		let gas_price = self.delivery.gas_price(chain_id).await?;
		let required = price + U256::from(gas) * U256::from(gas_price) + self.buffer;
		if balance < required {
			return Err(IdentityError::InsufficientFunds(format!(
				"balance {} ETH does not cover price, gas and buffer ({} ETH)",
				format_units(balance, 18),
				format_units(required, 18)
			)));
		}

		tracing::info!(%owner, price = %price, gas, "Registering identity");
		let receipt = self.delivery.deliver(tx.with_gas_limit(gas)).await?;

		let identity = self.lookup(owner).await?.ok_or_else(|| {
			IdentityError::Decode(format!(
				"registration {} confirmed but no identifier maps to {owner}",
				receipt.hash
			))
		})?;
		tracing::info!(fid = %identity.fid, tx_hash = %receipt.hash, "Identity registered");

		Ok(Registration::Registered {
			identity,
			tx_hash: receipt.hash,
			price,
		})
	}
}
