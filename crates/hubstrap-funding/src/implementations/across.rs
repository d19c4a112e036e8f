//! Across V3 deposits of native ETH.
//!
//! The deposit names WETH on both sides; the spoke pool wraps the `msg.value`
//! on the way in and the relayer's fill unwraps it for an EOA recipient, so
//! the account sees native ETH arrive on the destination chain.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use hubstrap_delivery::DeliveryService;
use hubstrap_types::{unix_now, ChainRegistry, Transaction, ValidationError};
use std::sync::Arc;

use crate::{contracts::ISpokePool, BridgeDeposit, BridgeInterface, BridgeRequest, FundingError};

pub struct AcrossBridge {
	delivery: Arc<DeliveryService>,
	registry: ChainRegistry,
	fill_deadline_secs: u32,
}

impl AcrossBridge {
	pub fn new(
		delivery: Arc<DeliveryService>,
		registry: ChainRegistry,
		fill_deadline_secs: u32,
	) -> Self {
		Self {
			delivery,
			registry,
			fill_deadline_secs,
		}
	}

	fn deposit_call(
		&self,
		request: &BridgeRequest,
		now: u64,
	) -> Result<(Address, ISpokePool::depositV3Call), FundingError> {
		let source = self.registry.require(request.from_chain)?;
		let destination = self.registry.require(request.to_chain)?;
		let spoke_pool = source.spoke_pool.ok_or(FundingError::Unsupported {
			chain_id: source.id,
			component: "bridge spoke pool",
		})?;
		let quote_timestamp = u32::try_from(now).map_err(|_| {
			ValidationError::InvalidIdentifier(format!("timestamp {now} overflows uint32"))
		})?;
		let fill_deadline = quote_timestamp
			.checked_add(self.fill_deadline_secs)
			.ok_or_else(|| {
				ValidationError::InvalidIdentifier("fill deadline overflows uint32".into())
			})?;
		let account = self.delivery.sender();

		let call = ISpokePool::depositV3Call {
			depositor: account,
			recipient: account,
			inputToken: source.wrapped_native,
			outputToken: destination.wrapped_native,
			inputAmount: request.input_amount,
			outputAmount: request.output_amount,
			destinationChainId: U256::from(request.to_chain),
			exclusiveRelayer: Address::ZERO,
			quoteTimestamp: quote_timestamp,
			fillDeadline: fill_deadline,
			exclusivityDeadline: 0,
			message: Bytes::new(),
		};
		Ok((spoke_pool, call))
	}
}

#[async_trait]
impl BridgeInterface for AcrossBridge {
	async fn deposit(&self, request: BridgeRequest) -> Result<BridgeDeposit, FundingError> {
		if request.from_chain == request.to_chain {
			return Err(ValidationError::InvalidIdentifier(format!(
				"bridge source and destination are both chain {}",
				request.from_chain
			))
			.into());
		}
		let (spoke_pool, call) = self.deposit_call(&request, unix_now())?;
		let fill_deadline = u64::from(call.fillDeadline);

		let tx = Transaction::call(request.from_chain, spoke_pool, call.abi_encode())
			.with_value(request.input_amount);
		let receipt = self.delivery.deliver(tx).await?;

		Ok(BridgeDeposit {
			tx_hash: receipt.hash,
			fill_deadline,
		})
	}
}
