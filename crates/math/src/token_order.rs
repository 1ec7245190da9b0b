/// Canonical token ordering for pool identity

use alloy_primitives::Address;

use crate::error::{MathError, MathResult};
use crate::fee_tier::tick_spacing;

/// Order two token addresses so that `token0 < token1`.
///
/// Addresses compare by their 20 raw bytes, which is the same order as the
/// lower-case hex strings compared lexicographically.
pub fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Unique identity of a pool: canonically ordered pair plus fee tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
}

impl PoolKey {
    /// Build a key from an unordered pair, rejecting identical tokens and
    /// fee tiers without a tick spacing
    pub fn new(token_a: Address, token_b: Address, fee: u32) -> MathResult<Self> {
        if token_a == token_b {
            return Err(MathError::IdenticalTokens(token_a.to_string()));
        }
        tick_spacing(fee)?;

        let (token0, token1) = sort_tokens(token_a, token_b);
        Ok(Self {
            token0,
            token1,
            fee,
        })
    }

    /// Whether `token` is this pool's token0
    pub fn is_token0(&self, token: Address) -> bool {
        self.token0 == token
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.token0, self.token1, self.fee)
    }
}
