//! Alloy-backed delivery over HTTP JSON-RPC.
//!
//! One provider per chain, each with nonce, gas and chain-id fillers and the
//! custody signer as its wallet. Transport errors are retried with backoff by
//! the RPC client layer; execution reverts are not.

use crate::{contracts::IERC20, DeliveryError, DeliveryInterface};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{
	fillers::{ChainIdFiller, GasFiller, NonceFiller, SimpleNonceManager},
	DynProvider, PendingTransactionConfig, Provider, ProviderBuilder,
};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use alloy_transport::layers::RetryBackoffLayer;
use async_trait::async_trait;
use hubstrap_types::{ChainRegistry, Transaction, TransactionHash, TransactionReceipt};
use std::collections::HashMap;
use std::time::Duration;

/// Multi-chain EVM delivery for a single account.
pub struct AlloyDelivery {
	providers: HashMap<u64, DynProvider>,
	sender: Address,
	confirmation_timeout: Duration,
}

impl AlloyDelivery {
	/// Builds one provider per chain in `chains`.
	///
	/// No network traffic happens here; a bad endpoint surfaces on first use.
	pub fn new(
		chains: &ChainRegistry,
		signer: PrivateKeySigner,
		confirmation_timeout: Duration,
	) -> Result<Self, DeliveryError> {
		let sender = signer.address();
		let mut providers = HashMap::new();

		for chain in chains.iter() {
			let url = chain.rpc_url.parse().map_err(|e| {
				DeliveryError::Network(format!("Invalid RPC URL for chain {}: {e}", chain.id))
			})?;

			let wallet = EthereumWallet::from(signer.clone().with_chain_id(Some(chain.id)));

			// 5 retries, 1s initial backoff, 10 compute units per second.
			let retry_layer = RetryBackoffLayer::new(5, 1000, 10);
			let client = RpcClient::builder().layer(retry_layer).http(url);

			let provider = ProviderBuilder::new()
				.filler(NonceFiller::new(SimpleNonceManager::default()))
				.filler(GasFiller)
				.filler(ChainIdFiller::default())
				.wallet(wallet)
				.connect_client(client);
			provider.client().set_poll_interval(Duration::from_secs(2));

			providers.insert(chain.id, provider.erased());
		}

		tracing::debug!(chains = providers.len(), sender = %sender, "Delivery providers ready");
		Ok(Self {
			providers,
			sender,
			confirmation_timeout,
		})
	}

	fn get_provider(&self, chain_id: u64) -> Result<&DynProvider, DeliveryError> {
		self.providers
			.get(&chain_id)
			.ok_or(DeliveryError::NoImplementationAvailable(chain_id))
	}

	fn request(&self, tx: Transaction) -> TransactionRequest {
		let mut request = TransactionRequest::default()
			.from(self.sender)
			.to(tx.to)
			.value(tx.value)
			.input(tx.data.into());
		if let Some(gas) = tx.gas_limit {
			request = request.gas_limit(gas);
		}
		request
	}

	async fn call_u256(
		&self,
		chain_id: u64,
		to: Address,
		data: Vec<u8>,
		what: &str,
	) -> Result<U256, DeliveryError> {
		let provider = self.get_provider(chain_id)?;
		let output = provider
			.call(TransactionRequest::default().to(to).input(Bytes::from(data).into()))
			.await
			.map_err(|e| DeliveryError::from_rpc(what, e))?;
		if output.len() < 32 {
			return Err(DeliveryError::Network(format!(
				"Invalid {what} response on chain {chain_id}"
			)));
		}
		Ok(U256::from_be_slice(&output[..32]))
	}
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	async fn submit(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError> {
		let chain_id = tx.chain_id;
		let provider = self.get_provider(chain_id)?;

		tracing::debug!(
			chain_id,
			to = %tx.to,
			value = %tx.value,
			data_len = tx.data.len(),
			gas_limit = ?tx.gas_limit,
			"Sending transaction"
		);

		let pending = provider
			.send_transaction(self.request(tx))
			.await
			.map_err(|e| {
				tracing::error!(chain_id, error = %e, "Transaction submission failed");
				DeliveryError::from_rpc("send transaction", e)
			})?;

		Ok(*pending.tx_hash())
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<TransactionReceipt, DeliveryError> {
		let provider = self.get_provider(chain_id)?;

		let config = PendingTransactionConfig::new(*hash)
			.with_required_confirmations(1)
			.with_timeout(Some(self.confirmation_timeout));
		let confirmed = provider
			.watch_pending_transaction(config)
			.await
			.map_err(|e| DeliveryError::Network(format!("Transaction watch failed: {e}")))?
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to confirm transaction: {e}")))?;

		let receipt = provider
			.get_transaction_receipt(confirmed)
			.await
			.map_err(|e| {
				DeliveryError::Network(format!("Failed to get receipt on chain {chain_id}: {e}"))
			})?
			.ok_or_else(|| {
				DeliveryError::Network(format!("Transaction not found on chain {chain_id}"))
			})?;

		Ok(TransactionReceipt {
			hash: receipt.transaction_hash,
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
			gas_used: receipt.gas_used,
		})
	}

	async fn get_balance(
		&self,
		address: Address,
		token: Option<Address>,
		chain_id: u64,
	) -> Result<U256, DeliveryError> {
		match token {
			None => self
				.get_provider(chain_id)?
				.get_balance(address)
				.await
				.map_err(|e| DeliveryError::Network(format!("Failed to get balance: {e}"))),
			Some(token) => {
				let data = IERC20::balanceOfCall { owner: address }.abi_encode();
				self.call_u256(chain_id, token, data, "balanceOf").await
			},
		}
	}

	async fn get_allowance(
		&self,
		owner: Address,
		spender: Address,
		token: Address,
		chain_id: u64,
	) -> Result<U256, DeliveryError> {
		let data = IERC20::allowanceCall { owner, spender }.abi_encode();
		self.call_u256(chain_id, token, data, "allowance").await
	}

	async fn gas_price(&self, chain_id: u64) -> Result<u128, DeliveryError> {
		self.get_provider(chain_id)?
			.get_gas_price()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get gas price: {e}")))
	}

	async fn estimate_gas(&self, tx: Transaction) -> Result<u64, DeliveryError> {
		let provider = self.get_provider(tx.chain_id)?;
		provider
			.estimate_gas(self.request(tx))
			.await
			.map_err(|e| DeliveryError::from_rpc("estimate gas", e))
	}

	async fn eth_call(&self, tx: Transaction) -> Result<Bytes, DeliveryError> {
		let provider = self.get_provider(tx.chain_id)?;
		provider
			.call(self.request(tx))
			.await
			.map_err(|e| DeliveryError::from_rpc("eth_call", e))
	}
}
