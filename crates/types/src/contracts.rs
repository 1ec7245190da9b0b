//! Minimal contract interfaces.
//!
//! Only the functions the deployer actually invokes are declared; calldata is
//! produced with `SolCall::abi_encode` and sent through a [`crate::Ledger`].

use alloy_sol_types::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
    }
}

sol! {
    /// Test tokens expose an owner-only mint
    interface IMintableToken {
        function mint(address to, uint256 amount) external;
    }
}

// ── Uniswap V3 core ───────────────────────────────────────────────────

sol! {
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }
}

// ── Uniswap V3 periphery ──────────────────────────────────────────────

sol! {
    interface INonfungiblePositionManager {
        struct MintParams {
            address token0;
            address token1;
            uint24 fee;
            int24 tickLower;
            int24 tickUpper;
            uint256 amount0Desired;
            uint256 amount1Desired;
            uint256 amount0Min;
            uint256 amount1Min;
            address recipient;
            uint256 deadline;
        }

        function createAndInitializePoolIfNecessary(address token0, address token1, uint24 fee, uint160 sqrtPriceX96) external payable returns (address pool);
        function mint(MintParams calldata params) external payable returns (uint256 tokenId, uint128 liquidity, uint256 amount0, uint256 amount1);
    }
}

sol! {
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use alloy_sol_types::SolCall;

    #[test]
    fn test_selectors_match_deployed_abi() {
        // Selectors from the canonical OpenZeppelin / Uniswap ABIs
        assert_eq!(IERC20::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(IERC20::allowanceCall::SELECTOR, [0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(IERC20::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(IUniswapV3Factory::getPoolCall::SELECTOR, [0x16, 0x98, 0xee, 0x82]);
    }

    #[test]
    fn test_approve_calldata_layout() {
        let spender = Address::repeat_byte(0x11);
        let data = IERC20::approveCall {
            spender,
            amount: U256::from(20u64),
        }
        .abi_encode();

        assert_eq!(data.len(), 4 + 32 * 2);
        assert_eq!(&data[16..36], spender.as_slice());
        assert_eq!(data[67], 20);
    }
}
