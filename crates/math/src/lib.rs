/// Mathematical utilities for pool bootstrapping
///
/// This crate provides canonical token ordering, exact `sqrtPriceX96`
/// encoding from decimal reserves, and the fee-tier and tick rules the
/// deployer checks before submitting position requests.

pub mod error;
pub mod fee_tier;
pub mod sqrt_price;
pub mod token_order;

// Re-export commonly used functions
pub use error::*;
pub use fee_tier::*;
pub use sqrt_price::*;
pub use token_order::*;
