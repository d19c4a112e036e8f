//! Transaction delivery and ledger reads.
//!
//! [`DeliveryInterface`] is the only way the rest of the workspace touches a
//! chain: it submits transactions signed by the custody account, waits for
//! receipts and performs read-only calls. [`DeliveryService`] sits on top and
//! enforces that mutating transactions on one chain never overlap, since the
//! account nonce on each ledger is sequential.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use hubstrap_types::{Transaction, TransactionHash, TransactionReceipt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub mod contracts;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

pub use implementations::evm::alloy::AlloyDelivery;

/// Errors that can occur during delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// RPC or transport failure; nothing is known about execution.
	#[error("Network error: {0}")]
	Network(String),
	/// The node rejected the call or the gas estimate because execution
	/// reverted.
	#[error("Execution reverted: {0}")]
	Reverted(String),
	/// The transaction was mined but its status is failure.
	#[error("Transaction {hash} failed on chain {chain_id}")]
	TransactionFailed {
		hash: TransactionHash,
		chain_id: u64,
	},
	#[error("No provider configured for chain {0}")]
	NoImplementationAvailable(u64),
}

impl DeliveryError {
	/// True when the failure came from contract execution rather than from
	/// the transport.
	pub fn is_revert(&self) -> bool {
		matches!(self, Self::Reverted(_) | Self::TransactionFailed { .. })
	}

	/// Maps an RPC error message, recognising execution reverts.
	pub(crate) fn from_rpc(context: &str, message: impl std::fmt::Display) -> Self {
		let message = message.to_string();
		if message.to_ascii_lowercase().contains("revert") {
			Self::Reverted(format!("{context}: {message}"))
		} else {
			Self::Network(format!("{context}: {message}"))
		}
	}
}

/// Ledger access for one account across every configured chain.
#[async_trait]
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait DeliveryInterface: Send + Sync {
	/// Signs and broadcasts `tx`, returning once the node accepted it.
	async fn submit(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError>;

	/// Waits until `hash` is mined and returns its receipt.
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		chain_id: u64,
	) -> Result<TransactionReceipt, DeliveryError>;

	/// Native balance when `token` is `None`, otherwise the ERC-20 balance.
	async fn get_balance(
		&self,
		address: Address,
		token: Option<Address>,
		chain_id: u64,
	) -> Result<U256, DeliveryError>;

	async fn get_allowance(
		&self,
		owner: Address,
		spender: Address,
		token: Address,
		chain_id: u64,
	) -> Result<U256, DeliveryError>;

	/// Current gas price in wei.
	async fn gas_price(&self, chain_id: u64) -> Result<u128, DeliveryError>;

	async fn estimate_gas(&self, tx: Transaction) -> Result<u64, DeliveryError>;

	/// Executes `tx` as a read-only call and returns the raw return data.
	async fn eth_call(&self, tx: Transaction) -> Result<Bytes, DeliveryError>;
}

/// Serializes mutating transactions per chain and checks receipts.
pub struct DeliveryService {
	implementation: Arc<dyn DeliveryInterface>,
	sender: Address,
	chain_locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl DeliveryService {
	pub fn new(implementation: Arc<dyn DeliveryInterface>, sender: Address) -> Self {
		Self {
			implementation,
			sender,
			chain_locks: Mutex::new(HashMap::new()),
		}
	}

	/// Address whose nonce this service sequences.
	pub fn sender(&self) -> Address {
		self.sender
	}

	fn chain_lock(&self, chain_id: u64) -> Arc<tokio::sync::Mutex<()>> {
		let mut locks = self
			.chain_locks
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		locks.entry(chain_id).or_default().clone()
	}

	/// Submits `tx` and waits for a successful receipt.
	///
	/// A second call for the same chain waits until the first one's receipt
	/// is in, so nonces are never raced.
	pub async fn deliver(&self, tx: Transaction) -> Result<TransactionReceipt, DeliveryError> {
		let chain_id = tx.chain_id;
		let lock = self.chain_lock(chain_id);
		let _guard = lock.lock().await;

		let hash = self.implementation.submit(tx).await?;
		tracing::info!(chain_id, tx_hash = %hash, "Transaction submitted");

		let receipt = self
			.implementation
			.wait_for_confirmation(&hash, chain_id)
			.await?;
		if !receipt.success {
			tracing::warn!(chain_id, tx_hash = %hash, "Transaction reverted");
			return Err(DeliveryError::TransactionFailed { hash, chain_id });
		}

		tracing::info!(
			chain_id,
			tx_hash = %hash,
			block = receipt.block_number,
			gas_used = receipt.gas_used,
			"Transaction confirmed"
		);
		Ok(receipt)
	}

	pub async fn native_balance(&self, chain_id: u64, owner: Address) -> Result<U256, DeliveryError> {
		self.implementation.get_balance(owner, None, chain_id).await
	}

	pub async fn token_balance(
		&self,
		chain_id: u64,
		token: Address,
		owner: Address,
	) -> Result<U256, DeliveryError> {
		self.implementation
			.get_balance(owner, Some(token), chain_id)
			.await
	}

	pub async fn allowance(
		&self,
		chain_id: u64,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, DeliveryError> {
		self.implementation
			.get_allowance(owner, spender, token, chain_id)
			.await
	}

	pub async fn gas_price(&self, chain_id: u64) -> Result<u128, DeliveryError> {
		self.implementation.gas_price(chain_id).await
	}

	pub async fn estimate_gas(&self, tx: Transaction) -> Result<u64, DeliveryError> {
		self.implementation.estimate_gas(tx).await
	}

	pub async fn call(&self, tx: Transaction) -> Result<Bytes, DeliveryError> {
		self.implementation.eth_call(tx).await
	}
}
