//! # Ordering and Price Properties
//!
//! Property checks for token ordering and sqrt-price encoding over random
//! inputs.

#[cfg(test)]
mod tests {
    use alloy_primitives::{hex, Address};
    use proptest::prelude::*;
    use v3_deployer_math::*;

    fn any_address() -> impl Strategy<Value = Address> {
        any::<[u8; 20]>().prop_map(Address::from)
    }

    proptest! {
        #[test]
        fn sort_tokens_returns_min_then_max(a in any_address(), b in any_address()) {
            prop_assume!(a != b);
            let (token0, token1) = sort_tokens(a, b);

            prop_assert!(hex::encode(token0) < hex::encode(token1));
            prop_assert!(token0 == a || token0 == b);
            prop_assert!(token1 == a || token1 == b);
        }

        #[test]
        fn sort_tokens_is_idempotent(a in any_address(), b in any_address()) {
            let sorted = sort_tokens(a, b);
            prop_assert_eq!(sort_tokens(sorted.0, sorted.1), sorted);
        }

        #[test]
        fn sqrt_price_is_monotonic_in_reserve1(r0 in 1u64..1_000_000, r1 in 1u64..1_000_000) {
            let lower = encode_sqrt_price_x96_from_u128(r1 as u128, r0 as u128).unwrap();
            let higher = encode_sqrt_price_x96_from_u128(r1 as u128 + 1, r0 as u128).unwrap();
            prop_assert!(lower < higher);
        }

        #[test]
        fn equal_reserves_always_encode_q96(r in 1u64..u64::MAX) {
            let encoded = encode_sqrt_price_x96_from_u128(r as u128, r as u128).unwrap();
            prop_assert_eq!(encoded, Q96);
        }
    }
}
