/// Fee tiers and tick-range rules

use crate::error::{MathError, MathResult};

/// Lowest tick a position may reference
pub const MIN_TICK: i32 = -887_272;

/// Highest tick a position may reference
pub const MAX_TICK: i32 = 887_272;

/// Fee tiers enabled on a freshly deployed factory, with their tick spacing
pub const FEE_TIERS: [(u32, i32); 4] = [(100, 1), (500, 10), (3000, 60), (10_000, 200)];

/// Tick spacing for a fee tier (in hundredths of a basis point)
pub fn tick_spacing(fee: u32) -> MathResult<i32> {
    FEE_TIERS
        .iter()
        .find(|(tier, _)| *tier == fee)
        .map(|(_, spacing)| *spacing)
        .ok_or(MathError::UnsupportedFeeTier(fee))
}

/// Check that `[lower, upper]` is a usable position range for `fee`
pub fn validate_tick_range(lower: i32, upper: i32, fee: u32) -> MathResult<()> {
    let spacing = tick_spacing(fee)?;
    let invalid = |reason: String| MathError::InvalidTickRange {
        lower,
        upper,
        reason,
    };

    if lower >= upper {
        return Err(invalid("lower tick must be below upper tick".to_string()));
    }
    if lower < MIN_TICK || upper > MAX_TICK {
        return Err(invalid(format!("ticks must lie within [{MIN_TICK}, {MAX_TICK}]")));
    }
    if lower % spacing != 0 || upper % spacing != 0 {
        return Err(invalid(format!("ticks must be multiples of {spacing}")));
    }

    Ok(())
}

/// Closest tick to `tick` that is a multiple of `spacing` and within bounds
pub fn nearest_usable_tick(tick: i32, spacing: i32) -> i32 {
    let rounded = ((tick as f64) / (spacing as f64)).round() as i32 * spacing;
    if rounded < MIN_TICK {
        rounded + spacing
    } else if rounded > MAX_TICK {
        rounded - spacing
    } else {
        rounded
    }
}
