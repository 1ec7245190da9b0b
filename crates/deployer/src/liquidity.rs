//! Ensure-allowance-then-act flows: minting a position and swapping.
//!
//! Both flows pre-flight the state-changing call with a read-only `call` to
//! obtain its return values and to surface reverts before paying gas, then
//! submit it once. A reverted submission is reported, never retried.

use std::sync::Arc;

use alloy::primitives::aliases::{I24, U160, U24};
use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::{Address, TxHash, U256};
use alloy::sol_types::SolCall;
use chrono::Utc;
use tracing::{info, warn};
use v3_deployer_math::{validate_tick_range, PoolKey};
use v3_deployer_types::contracts::{INonfungiblePositionManager, ISwapRouter, IERC20};
use v3_deployer_types::{CallRequest, Ledger, LedgerError, DEADLINE_WINDOW_SECS};

use crate::error::{DeployerError, DeployerResult};
use crate::pipeline::ConfirmationPolicy;
use crate::submit::send_and_confirm;

// ============================================================================
// ERC20 helpers
// ============================================================================

/// Whether an approval was needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceOutcome {
    Sufficient { current: U256 },
    Approved { tx_hash: TxHash },
}

impl AllowanceOutcome {
    pub fn approved(&self) -> bool {
        matches!(self, AllowanceOutcome::Approved { .. })
    }
}

/// Approve `spender` for `amount` unless the current allowance covers it
pub async fn ensure_allowance(
    ledger: &dyn Ledger,
    confirmation: ConfirmationPolicy,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
) -> DeployerResult<AllowanceOutcome> {
    let current = allowance(ledger, token, owner, spender).await?;
    if current >= amount {
        info!("Allowance of {} for {} is sufficient ({})", token, spender, current);
        return Ok(AllowanceOutcome::Sufficient { current });
    }

    info!("Approving {} of {} for {}", amount, token, spender);
    let data = IERC20::approveCall { spender, amount }.abi_encode();
    let receipt = send_and_confirm(
        ledger,
        confirmation,
        &format!("approve {}", token),
        CallRequest::new(token, data),
    )
    .await?;

    Ok(AllowanceOutcome::Approved {
        tx_hash: receipt.tx_hash,
    })
}

pub async fn allowance(
    ledger: &dyn Ledger,
    token: Address,
    owner: Address,
    spender: Address,
) -> DeployerResult<U256> {
    let output = ledger
        .call(token, IERC20::allowanceCall { owner, spender }.abi_encode().into())
        .await?;
    Ok(IERC20::allowanceCall::abi_decode_returns(&output).map_err(LedgerError::from)?)
}

pub async fn token_decimals(ledger: &dyn Ledger, token: Address) -> DeployerResult<u8> {
    let output = ledger
        .call(token, IERC20::decimalsCall {}.abi_encode().into())
        .await?;
    Ok(IERC20::decimalsCall::abi_decode_returns(&output).map_err(LedgerError::from)?)
}

pub async fn token_balance(ledger: &dyn Ledger, token: Address, owner: Address) -> DeployerResult<U256> {
    let output = ledger
        .call(token, IERC20::balanceOfCall { account: owner }.abi_encode().into())
        .await?;
    Ok(IERC20::balanceOfCall::abi_decode_returns(&output).map_err(LedgerError::from)?)
}

/// Scale a decimal string by the token's decimals
pub fn parse_amount(value: &str, decimals: u8) -> DeployerResult<U256> {
    parse_units(value, decimals)
        .map(|parsed| parsed.get_absolute())
        .map_err(|e| DeployerError::config(format!("invalid amount '{}': {}", value, e)))
}

/// Render a raw amount with the token's decimals
pub fn format_amount(amount: U256, decimals: u8) -> String {
    format_units(amount, decimals).unwrap_or_else(|_| amount.to_string())
}

/// Unix timestamp `DEADLINE_WINDOW_SECS` from now
pub fn deadline_from_now() -> U256 {
    U256::from(Utc::now().timestamp().max(0) as u64 + DEADLINE_WINDOW_SECS)
}

fn to_tick(tick: i32) -> DeployerResult<I24> {
    I24::try_from(tick).map_err(|_| DeployerError::config(format!("tick {} does not fit in int24", tick)))
}

// ============================================================================
// Position minting
// ============================================================================

/// Liquidity to add, in raw token units, for an unordered pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRequest {
    pub token_a: Address,
    pub token_b: Address,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount_a: U256,
    pub amount_b: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub recipient: Address,
    pub deadline: U256,
}

/// A mined mint. Every value except the hashes and counts comes from the
/// read-only call made just before sending, not from the receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedPosition {
    pub token_id: U256,
    pub liquidity: u128,
    pub amount0: U256,
    pub amount1: U256,
    pub tx_hash: TxHash,
    pub approvals: usize,
}

pub struct PositionMinter {
    ledger: Arc<dyn Ledger>,
    position_manager: Address,
    gas_limit: u64,
    confirmation: ConfirmationPolicy,
}

impl PositionMinter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        position_manager: Address,
        gas_limit: u64,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            ledger,
            position_manager,
            gas_limit,
            confirmation,
        }
    }

    pub async fn mint_position(&self, request: &PositionRequest) -> DeployerResult<MintedPosition> {
        let key = PoolKey::new(request.token_a, request.token_b, request.fee)?;
        validate_tick_range(request.tick_lower, request.tick_upper, request.fee)?;

        let (amount0, amount1, amount0_min, amount1_min) = if key.is_token0(request.token_a) {
            (request.amount_a, request.amount_b, request.amount_a_min, request.amount_b_min)
        } else {
            info!("Swapped token order for the pool: {} / {}", key.token0, key.token1);
            (request.amount_b, request.amount_a, request.amount_b_min, request.amount_a_min)
        };

        if amount0_min.is_zero() || amount1_min.is_zero() {
            warn!("Minting with a zero minimum amount accepts unlimited slippage");
        }

        let owner = self.ledger.signer();
        let mut approvals = 0;
        for (token, amount) in [(key.token0, amount0), (key.token1, amount1)] {
            let outcome = ensure_allowance(
                self.ledger.as_ref(),
                self.confirmation,
                token,
                owner,
                self.position_manager,
                amount,
            )
            .await?;
            if outcome.approved() {
                approvals += 1;
            }
        }

        let data = INonfungiblePositionManager::mintCall {
            params: INonfungiblePositionManager::MintParams {
                token0: key.token0,
                token1: key.token1,
                fee: U24::from(key.fee),
                tickLower: to_tick(request.tick_lower)?,
                tickUpper: to_tick(request.tick_upper)?,
                amount0Desired: amount0,
                amount1Desired: amount1,
                amount0Min: amount0_min,
                amount1Min: amount1_min,
                recipient: request.recipient,
                deadline: request.deadline,
            },
        }
        .abi_encode();

        info!(
            "Minting position on {} ticks [{}, {}] with {} / {}",
            key, request.tick_lower, request.tick_upper, amount0, amount1
        );
        let preview = self
            .ledger
            .call(self.position_manager, data.clone().into())
            .await?;
        let minted = INonfungiblePositionManager::mintCall::abi_decode_returns(&preview)
            .map_err(LedgerError::from)?;

        let receipt = send_and_confirm(
            self.ledger.as_ref(),
            self.confirmation,
            "mint position",
            CallRequest::new(self.position_manager, data).with_gas_limit(self.gas_limit),
        )
        .await?;

        info!(
            "Minted position {} with liquidity {} (tx {})",
            minted.tokenId, minted.liquidity, receipt.tx_hash
        );
        Ok(MintedPosition {
            token_id: minted.tokenId,
            liquidity: minted.liquidity,
            amount0: minted.amount0,
            amount1: minted.amount1,
            tx_hash: receipt.tx_hash,
            approvals,
        })
    }
}

// ============================================================================
// Swapping
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
    /// Zero for no limit
    pub sqrt_price_limit_x96: U160,
    pub recipient: Address,
    pub deadline: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapResult {
    /// Output quoted by the read-only call made just before sending
    pub amount_out: U256,
    pub tx_hash: TxHash,
    pub approvals: usize,
}

pub struct Swapper {
    ledger: Arc<dyn Ledger>,
    router: Address,
    gas_limit: u64,
    confirmation: ConfirmationPolicy,
}

impl Swapper {
    pub fn new(ledger: Arc<dyn Ledger>, router: Address, gas_limit: u64, confirmation: ConfirmationPolicy) -> Self {
        Self {
            ledger,
            router,
            gas_limit,
            confirmation,
        }
    }

    /// Swap an exact input amount through a single pool
    pub async fn swap_exact_in(&self, request: &SwapRequest) -> DeployerResult<SwapResult> {
        // Validates the pair and fee tier
        PoolKey::new(request.token_in, request.token_out, request.fee)?;

        if request.amount_out_minimum.is_zero() {
            warn!("Swapping with amountOutMinimum = 0 accepts unlimited slippage");
        }

        let outcome = ensure_allowance(
            self.ledger.as_ref(),
            self.confirmation,
            request.token_in,
            self.ledger.signer(),
            self.router,
            request.amount_in,
        )
        .await?;

        let data = ISwapRouter::exactInputSingleCall {
            params: ISwapRouter::ExactInputSingleParams {
                tokenIn: request.token_in,
                tokenOut: request.token_out,
                fee: U24::from(request.fee),
                recipient: request.recipient,
                deadline: request.deadline,
                amountIn: request.amount_in,
                amountOutMinimum: request.amount_out_minimum,
                sqrtPriceLimitX96: request.sqrt_price_limit_x96,
            },
        }
        .abi_encode();

        info!(
            "Swapping {} of {} for {} (fee {})",
            request.amount_in, request.token_in, request.token_out, request.fee
        );
        let preview = self.ledger.call(self.router, data.clone().into()).await?;
        let amount_out = ISwapRouter::exactInputSingleCall::abi_decode_returns(&preview)
            .map_err(LedgerError::from)?;

        let receipt = send_and_confirm(
            self.ledger.as_ref(),
            self.confirmation,
            "swap exact input",
            CallRequest::new(self.router, data).with_gas_limit(self.gas_limit),
        )
        .await?;

        info!("Swap complete: received {} (tx {})", amount_out, receipt.tx_hash);
        Ok(SwapResult {
            amount_out,
            tx_hash: receipt.tx_hash,
            approvals: usize::from(outcome.approved()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_scales_by_decimals() {
        assert_eq!(parse_amount("20", 6).unwrap(), U256::from(20_000_000u64));
        assert_eq!(
            parse_amount("1.5", 18).unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert!(parse_amount("abc", 18).is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(U256::from(10_500_000u64), 6), "10.500000");
    }

    #[test]
    fn test_deadline_is_ten_minutes_ahead() {
        let now = U256::from(Utc::now().timestamp() as u64);
        let deadline = deadline_from_now();
        assert!(deadline >= now + U256::from(DEADLINE_WINDOW_SECS));
        assert!(deadline <= now + U256::from(DEADLINE_WINDOW_SECS + 5));
    }

    #[test]
    fn test_tick_conversion() {
        assert_eq!(to_tick(-60).unwrap(), I24::try_from(-60i32).unwrap());
        assert!(to_tick(1 << 23).is_err());
    }
}
