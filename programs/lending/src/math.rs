use anchor_lang::prelude::*;

use crate::state::InterestRateModelConfig;
use crate::LendingError;

pub const RATE_SCALE: u128 = 1_000_000_000u128; // 1e9 fixed point for rates and indices
pub const BPS_SCALE: u128 = 10_000;
pub const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;
/// Precision of the per-share reward indices.
pub const REWARD_INDEX_SCALE: u128 = 1_000_000_000_000u128;

pub fn mul_div_floor(a: u128, b: u128, c: u128) -> Result<u128> {
    require!(c > 0, LendingError::MathOverflow);
    a.checked_mul(b)
        .map(|v| v / c)
        .ok_or_else(|| error!(LendingError::MathOverflow))
}

pub fn mul_div_ceil(a: u128, b: u128, c: u128) -> Result<u128> {
    require!(c > 0, LendingError::MathOverflow);
    let product = a
        .checked_mul(b)
        .ok_or_else(|| error!(LendingError::MathOverflow))?;
    Ok(product / c + u128::from(product % c != 0))
}

fn bps_to_rate(bps: u64) -> Result<u128> {
    mul_div_floor(bps as u128, RATE_SCALE, BPS_SCALE)
}

/// utilization = borrowed / max(1, supplied), scaled by `RATE_SCALE`
pub fn utilization(borrowed: u128, supplied: u128) -> Result<u128> {
    mul_div_floor(borrowed, RATE_SCALE, supplied.max(1))
}

/// Annualized borrow rate from the piecewise (kinked) model, scaled by `RATE_SCALE`.
pub fn borrow_rate(model: &InterestRateModelConfig, util_scaled: u128) -> Result<u128> {
    let kink_scaled = bps_to_rate(model.kink_bps)?;
    let base_scaled = bps_to_rate(model.base_rate_bps)?;
    let slope1_scaled = bps_to_rate(model.slope1_bps)?;
    let slope2_scaled = bps_to_rate(model.slope2_bps)?;

    if util_scaled <= kink_scaled {
        let variable = mul_div_floor(util_scaled, slope1_scaled, RATE_SCALE)?;
        return base_scaled
            .checked_add(variable)
            .ok_or_else(|| error!(LendingError::MathOverflow));
    }

    let pre = base_scaled
        .checked_add(mul_div_floor(kink_scaled, slope1_scaled, RATE_SCALE)?)
        .ok_or_else(|| error!(LendingError::MathOverflow))?;
    let delta = util_scaled - kink_scaled;
    pre.checked_add(mul_div_floor(delta, slope2_scaled, RATE_SCALE)?)
        .ok_or_else(|| error!(LendingError::MathOverflow))
}

/// Simple (non-compounding) interest factor for `seconds` at an annual `rate_scaled`.
pub fn interest_factor(rate_scaled: u128, seconds: u64) -> Result<u128> {
    mul_div_floor(rate_scaled, seconds as u128, SECONDS_PER_YEAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> InterestRateModelConfig {
        InterestRateModelConfig {
            base_rate_bps: 100,
            slope1_bps: 400,
            slope2_bps: 10_000,
            kink_bps: 8_000,
        }
    }

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div_floor(10, 3, 4).unwrap(), 7);
        assert_eq!(mul_div_ceil(10, 3, 4).unwrap(), 8);
        assert_eq!(mul_div_ceil(8, 3, 4).unwrap(), 6);
        assert!(mul_div_floor(1, 1, 0).is_err());
    }

    #[test]
    fn test_utilization_of_empty_market_is_zero() {
        assert_eq!(utilization(0, 0).unwrap(), 0);
        assert_eq!(utilization(50, 100).unwrap(), RATE_SCALE / 2);
    }

    #[test]
    fn test_borrow_rate_below_kink() {
        // 1% base + 50% * 4% = 3%
        let rate = borrow_rate(&model(), RATE_SCALE / 2).unwrap();
        assert_eq!(rate, RATE_SCALE * 3 / 100);
    }

    #[test]
    fn test_borrow_rate_above_kink() {
        // 1% + 80% * 4% + 10% * 100% = 14.2%
        let rate = borrow_rate(&model(), RATE_SCALE * 9 / 10).unwrap();
        assert_eq!(rate, RATE_SCALE * 142 / 1000);
    }

    #[test]
    fn test_interest_factor_for_one_year() {
        let factor = interest_factor(RATE_SCALE / 10, SECONDS_PER_YEAR as u64).unwrap();
        assert_eq!(factor, RATE_SCALE / 10);
    }
}
