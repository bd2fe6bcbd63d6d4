use anchor_lang::prelude::*;
use lending::amount::{Amount, Usdc};

use crate::budget::WorkBudget;
use crate::constants::{BPS_SCALE, MIN_RESIDUAL_LIQUIDITY};
use crate::error::LoopError;
use crate::ledger::{share_of, usable_liquidity, validate_percent, LendingMarket, PositionLedger};
use crate::state::Privileged;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnterOutcome {
    pub iterations: u32,
    pub total_supplied: u64,
    pub total_borrowed: u64,
}

/// Supplies whatever USDC the vault holds. Returns the amount supplied.
pub fn supply_idle<M: LendingMarket>(market: &mut M, _auth: &Privileged) -> Result<u64> {
    let idle = market.idle_usdc()?;
    if idle > 0 {
        market.supply(idle)?;
    }
    Ok(idle)
}

/// Largest borrow whose re-supply still leaves `MIN_RESIDUAL_LIQUIDITY`.
/// Each borrowed unit put back as collateral costs `1 - cf` of liquidity.
fn max_step(usable: u64, collateral_factor_bps: u64) -> u64 {
    let headroom = usable.saturating_sub(MIN_RESIDUAL_LIQUIDITY) as u128;
    let cost_bps = BPS_SCALE.saturating_sub(collateral_factor_bps) as u128;
    if headroom == 0 {
        return 0;
    }
    if cost_bps == 0 {
        return u64::MAX;
    }
    u64::try_from(headroom * BPS_SCALE as u128 / cost_bps).unwrap_or(u64::MAX)
}

/// One leverage step: borrow `percent` of current liquidity and supply
/// everything idle. Returns the amount borrowed; zero means the position
/// is saturated and nothing was done.
pub fn borrow_and_supply<M: LendingMarket>(
    market: &mut M,
    auth: &Privileged,
    percent: u64,
) -> Result<u64> {
    validate_percent(percent)?;
    let liquidity = market.account_liquidity_accrued()?;
    require!(liquidity.err == 0, LoopError::MathOverflow);

    let market_state = market.load()?.market;
    let usable = usable_liquidity(liquidity.liquidity, market_state.borrow_index);
    let cap = max_step(usable, market_state.collateral_factor_bps);
    let amount = share_of(usable, percent)?.min(cap);
    if amount == 0 {
        return Ok(0);
    }
    market.borrow(amount)?;
    supply_idle(market, auth)?;
    Ok(amount)
}

pub fn enter_position<M: LendingMarket>(
    market: &mut M,
    auth: &Privileged,
    loop_count: u32,
    percent: u64,
) -> Result<EnterOutcome> {
    require!(loop_count >= 1, LoopError::InvalidLoopCount);
    validate_percent(percent)?;

    supply_idle(market, auth)?;

    let mut budget = WorkBudget::new(loop_count);
    let mut iterations = 0;
    while budget.try_spend() {
        if borrow_and_supply(market, auth, percent)? == 0 {
            break;
        }
        iterations += 1;
    }

    let outcome = EnterOutcome {
        iterations,
        total_supplied: market.total_supplied()?.to_u64()?,
        total_borrowed: market.total_borrowed()?.to_u64()?,
    };
    msg!(
        "enter_position: {} iterations, supplied {}, borrowed {}",
        iterations,
        Amount::<Usdc>::from_u64(outcome.total_supplied),
        Amount::<Usdc>::from_u64(outcome.total_borrowed)
    );
    Ok(outcome)
}
