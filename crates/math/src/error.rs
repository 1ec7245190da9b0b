use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Reserve must be positive, got {0}")]
    NonPositiveReserve(String),

    #[error("sqrtPriceX96 {value} outside [{min}, {max})")]
    SqrtPriceOutOfRange {
        value: String,
        min: String,
        max: String,
    },

    #[error("Identical token addresses: {0}")]
    IdenticalTokens(String),

    #[error("Unsupported fee tier: {0}")]
    UnsupportedFeeTier(u32),

    #[error("Invalid tick range [{lower}, {upper}]: {reason}")]
    InvalidTickRange {
        lower: i32,
        upper: i32,
        reason: String,
    },
}

pub type MathResult<T> = std::result::Result<T, MathError>;
