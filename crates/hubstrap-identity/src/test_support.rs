//! In-memory identity contracts for unit tests.

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use hubstrap_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use hubstrap_types::{Transaction, TransactionHash, TransactionReceipt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::contracts::{
	IIdGateway, IIdRegistry, IKeyGateway, IKeyRegistry, ISignedKeyRequestValidator, KEY_STATE_ADDED,
	KEY_TYPE_ED25519,
};
use crate::IdentityContracts;

/// Address of the test key `0xac09...ff80`.
pub const OWNER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

pub const TEST_PRIVATE_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Registry, gateways and validator backed by plain state.
pub struct FakeChain {
	pub contracts: IdentityContracts,
	price: U256,
	balance: U256,
	/// Per chain and token balances; anything unset reads as `balance`.
	balances: Mutex<HashMap<(u64, Option<Address>), U256>>,
	fid: Mutex<u64>,
	keys: Mutex<Vec<Bytes>>,
	sent: Mutex<Vec<Transaction>>,
	validator_reverts: Mutex<bool>,
}

impl FakeChain {
	pub const ASSIGNED_FID: u64 = 4242;
	pub const GAS: u64 = 150_000;

	pub fn new(price: U256, balance: U256) -> Arc<Self> {
		Arc::new(Self {
			contracts: IdentityContracts::optimism(),
			price,
			balance,
			balances: Mutex::default(),
			fid: Mutex::new(0),
			keys: Mutex::default(),
			sent: Mutex::default(),
			validator_reverts: Mutex::new(false),
		})
	}

	pub fn delivery(self: &Arc<Self>) -> Arc<DeliveryService> {
		Arc::new(DeliveryService::new(self.clone(), OWNER))
	}

	/// Sets the balance of `token` (native when `None`) on `chain_id`.
	pub fn set_balance(&self, chain_id: u64, token: Option<Address>, amount: U256) {
		self.balances
			.lock()
			.unwrap()
			.insert((chain_id, token), amount);
	}

	pub fn balance_of(&self, chain_id: u64, token: Option<Address>) -> U256 {
		self.balances
			.lock()
			.unwrap()
			.get(&(chain_id, token))
			.copied()
			.unwrap_or(self.balance)
	}

	pub fn set_fid(&self, fid: u64) {
		*self.fid.lock().unwrap() = fid;
	}

	/// Identifier currently assigned to the owner, zero when none.
	pub fn fid(&self) -> u64 {
		*self.fid.lock().unwrap()
	}

	/// Keys added through the key gateway, oldest first.
	pub fn keys(&self) -> Vec<Bytes> {
		self.keys.lock().unwrap().clone()
	}

	pub fn add_key(&self, key: &[u8]) {
		self.keys.lock().unwrap().push(Bytes::copy_from_slice(key));
	}

	pub fn fail_validator(&self) {
		*self.validator_reverts.lock().unwrap() = true;
	}

	pub fn sent(&self) -> Vec<Transaction> {
		self.sent.lock().unwrap().clone()
	}

	fn word(value: U256) -> Bytes {
		Bytes::from(value.to_be_bytes::<32>().to_vec())
	}
}

#[async_trait]
impl DeliveryInterface for FakeChain {
	async fn submit(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError> {
		if tx.to == self.contracts.id_gateway {
			self.set_fid(Self::ASSIGNED_FID);
		} else if tx.to == self.contracts.key_gateway {
			let call = IKeyGateway::addCall::abi_decode(&tx.data)
				.map_err(|e| DeliveryError::Reverted(e.to_string()))?;
			self.keys.lock().unwrap().push(call.key);
		}
		let mut sent = self.sent.lock().unwrap();
		sent.push(tx);
		Ok(B256::with_last_byte(sent.len() as u8))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		_chain_id: u64,
	) -> Result<TransactionReceipt, DeliveryError> {
		Ok(TransactionReceipt {
			hash: *hash,
			block_number: 1,
			success: true,
			gas_used: Self::GAS,
		})
	}

	async fn get_balance(
		&self,
		_address: Address,
		token: Option<Address>,
		chain_id: u64,
	) -> Result<U256, DeliveryError> {
		Ok(self.balance_of(chain_id, token))
	}

	async fn get_allowance(
		&self,
		_owner: Address,
		_spender: Address,
		_token: Address,
		_chain_id: u64,
	) -> Result<U256, DeliveryError> {
		Ok(U256::ZERO)
	}

	async fn gas_price(&self, _chain_id: u64) -> Result<u128, DeliveryError> {
		Ok(1_000_000)
	}

	async fn estimate_gas(&self, _tx: Transaction) -> Result<u64, DeliveryError> {
		Ok(Self::GAS)
	}

	async fn eth_call(&self, tx: Transaction) -> Result<Bytes, DeliveryError> {
		let selector: [u8; 4] = tx
			.data
			.get(..4)
			.and_then(|s| s.try_into().ok())
			.ok_or_else(|| DeliveryError::Reverted("short calldata".into()))?;
		if selector == IIdRegistry::idOfCall::SELECTOR {
			return Ok(Self::word(U256::from(*self.fid.lock().unwrap())));
		}
		if selector == IIdGateway::priceCall::SELECTOR {
			return Ok(Self::word(self.price));
		}
		if selector == ISignedKeyRequestValidator::encodeMetadataCall::SELECTOR {
			if *self.validator_reverts.lock().unwrap() {
				return Err(DeliveryError::Reverted("validator unavailable".into()));
			}
			let call = ISignedKeyRequestValidator::encodeMetadataCall::abi_decode(&tx.data)
				.map_err(|e| DeliveryError::Reverted(e.to_string()))?;
			let encoded = Bytes::from(call.metadata.abi_encode());
			return Ok(Bytes::from((encoded,).abi_encode_params()));
		}
		if selector == IKeyRegistry::keyDataOfCall::SELECTOR {
			let call = IKeyRegistry::keyDataOfCall::abi_decode(&tx.data)
				.map_err(|e| DeliveryError::Reverted(e.to_string()))?;
			let known = self.keys.lock().unwrap().contains(&call.key);
			let (state, key_type) = if known {
				(KEY_STATE_ADDED, KEY_TYPE_ED25519)
			} else {
				(0, 0)
			};
			let mut words = Self::word(U256::from(state)).to_vec();
			words.extend_from_slice(&Self::word(U256::from(key_type)));
			return Ok(Bytes::from(words));
		}
		Err(DeliveryError::Reverted("unknown selector".into()))
	}
}
