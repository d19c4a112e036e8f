//! Bindings for the exchange and bridge contracts.

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

/// Router recipient meaning "keep the output in the router", used before
/// unwrapping WETH in the same multicall.
pub const ROUTER_SELF: Address = address!("0000000000000000000000000000000000000002");

sol! {
	interface ISwapRouter02 {
		struct ExactInputSingleParams {
			address tokenIn;
			address tokenOut;
			uint24 fee;
			address recipient;
			uint256 amountIn;
			uint256 amountOutMinimum;
			uint160 sqrtPriceLimitX96;
		}

		function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
		function unwrapWETH9(uint256 amountMinimum, address recipient) external payable;
		function multicall(bytes[] calldata data) external payable returns (bytes[] memory results);
	}

	interface IQuoterV2 {
		struct QuoteExactInputSingleParams {
			address tokenIn;
			address tokenOut;
			uint256 amountIn;
			uint24 fee;
			uint160 sqrtPriceLimitX96;
		}

		function quoteExactInputSingle(QuoteExactInputSingleParams memory params)
			external
			returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);
	}

	interface ISpokePool {
		function depositV3(
			address depositor,
			address recipient,
			address inputToken,
			address outputToken,
			uint256 inputAmount,
			uint256 outputAmount,
			uint256 destinationChainId,
			address exclusiveRelayer,
			uint32 quoteTimestamp,
			uint32 fillDeadline,
			uint32 exclusivityDeadline,
			bytes calldata message
		) external payable;
	}
}
