/// Fixed-point square-root price encoding (Q64.96)

use alloy_primitives::aliases::U160;
use bigdecimal::num_bigint::{BigInt, BigUint, Sign};
use bigdecimal::BigDecimal;

use crate::error::{MathError, MathResult};

// ============================================================================
// Constants
// ============================================================================

/// Fractional bits of a `sqrtPriceX96` value
pub const Q96_RESOLUTION: u32 = 96;

/// 2^96, the encoding of a 1:1 price
pub const Q96: U160 = U160::from_limbs([0, 1 << 32, 0]);

/// Smallest value a pool accepts (sqrt price at MIN_TICK)
pub const MIN_SQRT_RATIO: U160 = U160::from_limbs([4_295_128_739, 0, 0]);

/// Exclusive upper bound a pool accepts (sqrt price at MAX_TICK)
pub const MAX_SQRT_RATIO: U160 =
    U160::from_limbs([0x5d95_1d52_6398_8d26, 0xefd1_fc6a_5064_8849, 0xfffd_8963]);

/// Reserve ratios beyond 10^±40 lie outside the sqrt ratio bounds (about 2^±128)
const MAX_RATIO_MAGNITUDE: i128 = 40;

/// Significant digits kept when decoding a price for display
pub const PRICE_DISPLAY_PRECISION: u64 = 40;

// ============================================================================
// Encoding
// ============================================================================

/// Encode `sqrt(reserve1 / reserve0)` as a Q64.96 fixed-point number,
/// truncating toward zero.
///
/// The value is computed exactly as `isqrt(floor(reserve1 * 2^192 / reserve0))`
/// on big integers, which equals `floor(sqrt(reserve1 / reserve0) * 2^96)`
/// for any positive decimal reserves. No floating point is involved.
pub fn encode_sqrt_price_x96(reserve1: &BigDecimal, reserve0: &BigDecimal) -> MathResult<U160> {
    let (digits1, scale1) = positive_parts(reserve1)?;
    let (digits0, scale0) = positive_parts(reserve0)?;

    // reserve1 / reserve0 = digits1 * 10^scale0 / (digits0 * 10^scale1)
    let shift = i128::from(scale0) - i128::from(scale1);

    // Reject hopeless ratios before materializing 10^shift
    let magnitude = decimal_digits(&digits1) - decimal_digits(&digits0) + shift;
    if magnitude.abs() > MAX_RATIO_MAGNITUDE {
        return Err(out_of_range(format!("for a reserve ratio near 1e{}", magnitude)));
    }

    let mut numerator = digits1 << (2 * Q96_RESOLUTION as usize);
    let mut denominator = digits0;
    if shift >= 0 {
        numerator *= pow10(shift)?;
    } else {
        denominator *= pow10(shift)?;
    }

    let root = (numerator / denominator).sqrt();
    let value = U160::try_from_be_slice(&root.to_bytes_be())
        .ok_or_else(|| out_of_range(root.to_string()))?;

    if value < MIN_SQRT_RATIO || value >= MAX_SQRT_RATIO {
        return Err(out_of_range(value.to_string()));
    }

    Ok(value)
}

/// Convenience wrapper for integer reserves
pub fn encode_sqrt_price_x96_from_u128(reserve1: u128, reserve0: u128) -> MathResult<U160> {
    encode_sqrt_price_x96(&BigDecimal::from(reserve1), &BigDecimal::from(reserve0))
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a `sqrtPriceX96` back into the token1/token0 price
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U160) -> BigDecimal {
    let root = BigUint::from_bytes_be(&sqrt_price_x96.to_be_bytes_vec());
    let numerator = BigInt::from(&root * &root);
    let denominator = BigInt::from(BigUint::from(1u32) << (2 * Q96_RESOLUTION as usize));

    (BigDecimal::new(numerator, 0) / BigDecimal::new(denominator, 0))
        .with_prec(PRICE_DISPLAY_PRECISION)
}

// ============================================================================
// Helpers
// ============================================================================

/// Split a positive decimal into its unsigned digits and decimal scale
fn positive_parts(value: &BigDecimal) -> MathResult<(BigUint, i64)> {
    let (digits, scale) = value.as_bigint_and_exponent();
    if digits.sign() != Sign::Plus {
        return Err(MathError::NonPositiveReserve(value.to_string()));
    }
    let (_, magnitude) = digits.into_parts();
    Ok((magnitude, scale))
}

fn decimal_digits(value: &BigUint) -> i128 {
    value.to_str_radix(10).len() as i128
}

/// `10^|exponent|`
fn pow10(exponent: i128) -> MathResult<BigUint> {
    let exponent = u32::try_from(exponent.unsigned_abs())
        .map_err(|_| out_of_range(format!("for a decimal scale of {}", exponent)))?;
    Ok(BigUint::from(10u32).pow(exponent))
}

fn out_of_range(value: String) -> MathError {
    MathError::SqrtPriceOutOfRange {
        value,
        min: MIN_SQRT_RATIO.to_string(),
        max: MAX_SQRT_RATIO.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_unit_price_is_exactly_q96() {
        let encoded = encode_sqrt_price_x96_from_u128(1, 1).unwrap();
        assert_eq!(encoded, Q96);
        assert_eq!(encoded.to_string(), "79228162514264337593543950336");
    }

    #[test]
    fn test_perfect_square_ratio_is_exact() {
        let encoded = encode_sqrt_price_x96_from_u128(4, 1).unwrap();
        assert_eq!(encoded, Q96 * U160::from(2u8));

        let encoded = encode_sqrt_price_x96_from_u128(1, 4).unwrap();
        assert_eq!(encoded, Q96 / U160::from(2u8));
    }

    #[test]
    fn test_decimal_reserves_match_integer_reserves() {
        let from_decimals = encode_sqrt_price_x96(&dec("2.5"), &dec("0.625")).unwrap();
        let from_integers = encode_sqrt_price_x96_from_u128(4, 1).unwrap();
        assert_eq!(from_decimals, from_integers);

        let scaled = encode_sqrt_price_x96(&dec("1e3"), &dec("10")).unwrap();
        assert_eq!(scaled, Q96 * U160::from(10u8));
    }

    #[test]
    fn test_irrational_ratio_truncates() {
        // sqrt(2) * 2^96 = 112045541949572279837463876454.39...
        let encoded = encode_sqrt_price_x96_from_u128(2, 1).unwrap();
        assert_eq!(encoded.to_string(), "112045541949572279837463876454");
    }

    #[test]
    fn test_non_positive_reserves_rejected() {
        assert!(matches!(
            encode_sqrt_price_x96(&dec("0"), &dec("1")),
            Err(MathError::NonPositiveReserve(_))
        ));
        assert!(matches!(
            encode_sqrt_price_x96(&dec("1"), &dec("-3")),
            Err(MathError::NonPositiveReserve(_))
        ));
    }

    #[test]
    fn test_extreme_ratio_out_of_range() {
        let result = encode_sqrt_price_x96(&dec("1"), &dec("1e80"));
        assert!(matches!(result, Err(MathError::SqrtPriceOutOfRange { .. })));

        let result = encode_sqrt_price_x96(&dec("1e80"), &dec("1"));
        assert!(matches!(result, Err(MathError::SqrtPriceOutOfRange { .. })));
    }

    #[test]
    fn test_huge_decimal_exponents_are_rejected_quickly() {
        for (reserve1, reserve0) in [
            ("1e-4294967296", "1"),
            ("1e4294967296", "1"),
            ("1", "1e4294967296"),
        ] {
            let result = encode_sqrt_price_x96(&dec(reserve1), &dec(reserve0));
            assert!(
                matches!(result, Err(MathError::SqrtPriceOutOfRange { .. })),
                "{} / {}",
                reserve1,
                reserve0
            );
        }
    }

    #[test]
    fn test_offsetting_scales_stay_in_range() {
        // Large but cancelling exponents still encode the plain ratio
        let encoded = encode_sqrt_price_x96(&dec("4e1000"), &dec("1e1000")).unwrap();
        assert_eq!(encoded, Q96 * U160::from(2u8));
    }

    #[test]
    fn test_bounds_constants() {
        assert_eq!(MIN_SQRT_RATIO.to_string(), "4295128739");
        assert_eq!(
            MAX_SQRT_RATIO.to_string(),
            "1461446703485210103287273052203988822378723970342"
        );
    }

    #[test]
    fn test_decode_round_trip_for_display() {
        let encoded = encode_sqrt_price_x96_from_u128(4, 1).unwrap();
        assert_eq!(sqrt_price_x96_to_price(encoded), dec("4"));
        assert_eq!(sqrt_price_x96_to_price(Q96), dec("1"));
    }
}
