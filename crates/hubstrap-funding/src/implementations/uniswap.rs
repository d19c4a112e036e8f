//! Uniswap V3 single-hop swaps through SwapRouter02.
//!
//! Stablecoin to native goes through the router's multicall: the swap leaves
//! WETH in the router and `unwrapWETH9` pays native ETH out to the account.
//! Native to stablecoin sends ETH as value and the router wraps it.

use alloy_primitives::{
	aliases::{U160, U24},
	Address, U256,
};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use hubstrap_delivery::{contracts::IERC20, DeliveryService};
use hubstrap_types::{Asset, Chain, ChainRegistry, Transaction, ValidationError, BPS_DENOMINATOR};
use std::sync::Arc;

use crate::{
	contracts::{IQuoterV2, ISwapRouter02, ROUTER_SELF},
	FundingError, SwapInterface, SwapReceipt, SwapRequest,
};

/// Largest value a `uint24` fee can hold.
const MAX_FEE_TIER: u32 = (1 << 24) - 1;

pub struct UniswapSwap {
	delivery: Arc<DeliveryService>,
	registry: ChainRegistry,
	/// When set, each swap is quoted first and the output floor is the quote
	/// minus this tolerance. When unset, swaps accept any output.
	max_slippage_bps: Option<u16>,
}

impl UniswapSwap {
	pub fn new(
		delivery: Arc<DeliveryService>,
		registry: ChainRegistry,
		max_slippage_bps: Option<u16>,
	) -> Self {
		Self {
			delivery,
			registry,
			max_slippage_bps,
		}
	}

	async fn min_amount_out(
		&self,
		chain: &Chain,
		token_in: Address,
		token_out: Address,
		amount_in: U256,
		fee: U24,
	) -> Result<U256, FundingError> {
		let Some(slippage_bps) = self.max_slippage_bps else {
			tracing::warn!(
				chain_id = chain.id,
				"Swapping without a minimum output; the trade is not protected against slippage"
			);
			return Ok(U256::ZERO);
		};
		let quoter = chain.quoter.ok_or(FundingError::Unsupported {
			chain_id: chain.id,
			component: "quoter",
		})?;

		let call = IQuoterV2::quoteExactInputSingleCall {
			params: IQuoterV2::QuoteExactInputSingleParams {
				tokenIn: token_in,
				tokenOut: token_out,
				amountIn: amount_in,
				fee,
				sqrtPriceLimitX96: U160::ZERO,
			},
		};
		let data = self
			.delivery
			.call(Transaction::call(chain.id, quoter, call.abi_encode()))
			.await?;
		let quote = IQuoterV2::quoteExactInputSingleCall::abi_decode_returns(&data)
			.map_err(|e| FundingError::Decode(format!("quoter response: {e}")))?;

		let keep = U256::from(BPS_DENOMINATOR.saturating_sub(u64::from(slippage_bps)));
		let min_out = quote.amountOut * keep / U256::from(BPS_DENOMINATOR);
		tracing::debug!(chain_id = chain.id, quoted = %quote.amountOut, min_out = %min_out, "Swap quoted");
		Ok(min_out)
	}

	async fn ensure_allowance(
		&self,
		chain_id: u64,
		token: Address,
		spender: Address,
		amount: U256,
	) -> Result<(), FundingError> {
		let owner = self.delivery.sender();
		let current = self
			.delivery
			.allowance(chain_id, token, owner, spender)
			.await?;
		if current >= amount {
			return Ok(());
		}

		tracing::info!(chain_id, %token, %spender, %amount, "Approving swap router");
		let approve = IERC20::approveCall { spender, amount };
		self.delivery
			.deliver(Transaction::call(chain_id, token, approve.abi_encode()))
			.await?;
		Ok(())
	}
}

#[async_trait]
impl SwapInterface for UniswapSwap {
	async fn swap(&self, request: SwapRequest) -> Result<SwapReceipt, FundingError> {
		let chain = self.registry.require(request.chain_id)?;
		let router = chain.swap_router.ok_or(FundingError::Unsupported {
			chain_id: chain.id,
			component: "swap router",
		})?;
		if request.fee_tier > MAX_FEE_TIER {
			return Err(ValidationError::InvalidIdentifier(format!(
				"fee tier {} does not fit in uint24",
				request.fee_tier
			))
			.into());
		}
		let fee = U24::from_limbs([u64::from(request.fee_tier)]);
		let usdc = chain.stablecoin.address;
		let weth = chain.wrapped_native;
		let owner = self.delivery.sender();

		let (token_in, token_out) = match (request.from, request.to) {
			(Asset::Stable, Asset::Native) => (usdc, weth),
			(Asset::Native, Asset::Stable) => (weth, usdc),
			(from, to) => {
				return Err(ValidationError::InvalidIdentifier(format!(
					"cannot swap {from} into {to}"
				))
				.into())
			},
		};
		let min_out = self
			.min_amount_out(chain, token_in, token_out, request.amount_in, fee)
			.await?;

		let params = |recipient| ISwapRouter02::ExactInputSingleParams {
			tokenIn: token_in,
			tokenOut: token_out,
			fee,
			recipient,
			amountIn: request.amount_in,
			amountOutMinimum: min_out,
			sqrtPriceLimitX96: U160::ZERO,
		};

		let tx = match request.from {
			Asset::Stable => {
				self.ensure_allowance(chain.id, usdc, router, request.amount_in)
					.await?;
				let swap = ISwapRouter02::exactInputSingleCall {
					params: params(ROUTER_SELF),
				};
				let unwrap = ISwapRouter02::unwrapWETH9Call {
					amountMinimum: min_out,
					recipient: owner,
				};
				let multicall = ISwapRouter02::multicallCall {
					data: vec![swap.abi_encode().into(), unwrap.abi_encode().into()],
				};
				Transaction::call(chain.id, router, multicall.abi_encode())
			},
			Asset::Native => {
				let swap = ISwapRouter02::exactInputSingleCall {
					params: params(owner),
				};
				Transaction::call(chain.id, router, swap.abi_encode()).with_value(request.amount_in)
			},
		};

		let receipt = self.delivery.deliver(tx).await?;
		Ok(SwapReceipt {
			tx_hash: receipt.hash,
			min_amount_out: min_out,
		})
	}
}
