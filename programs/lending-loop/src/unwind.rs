use anchor_lang::prelude::*;
use lending::amount::{Amount, Usdc};

use crate::budget::WorkBudget;
use crate::constants::{BPS_SCALE, PERCENT_PRECISION};
use crate::error::LoopError;
use crate::ledger::{usable_liquidity, validate_percent, LendingMarket, PositionLedger, RepayAmount};
use crate::state::Privileged;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub iterations: u32,
    /// Debt fully repaid and the remaining supply redeemed.
    pub complete: bool,
    pub idle_usdc: u64,
}

/// Redeemable underlying that keeps the position healthy:
/// `liquidity / collateral_factor * percent`, capped at what is supplied.
fn redeem_amount(
    liquidity: u64,
    collateral_factor_bps: u64,
    percent: u64,
    supplied: u64,
) -> Result<u64> {
    require!(collateral_factor_bps > 0, LoopError::InvalidMarket);
    let amount = (liquidity as u128)
        .checked_mul(BPS_SCALE as u128)
        .and_then(|v| v.checked_mul(percent as u128))
        .map(|v| v / (collateral_factor_bps as u128 * PERCENT_PRECISION as u128))
        .ok_or(LoopError::MathOverflow)?;
    Ok(amount.min(supplied as u128) as u64)
}

/// One unwind step: free `percent` of the redeemable supply, then pay debt
/// with everything idle. Returns whether anything moved.
pub fn redeem_and_repay<M: LendingMarket>(
    market: &mut M,
    _auth: &Privileged,
    percent: u64,
) -> Result<bool> {
    validate_percent(percent)?;
    let liquidity = market.account_liquidity_accrued()?;
    require!(liquidity.err == 0, LoopError::MathOverflow);

    let snapshot = market.load()?;
    let supplied = snapshot.obligation.supplied(&snapshot.market)?.to_u64()?;
    let usable = usable_liquidity(liquidity.liquidity, snapshot.market.supply_index);
    let redeemed = redeem_amount(usable, snapshot.market.collateral_factor_bps, percent, supplied)?;
    if redeemed > 0 {
        market.redeem_underlying(redeemed)?;
    }

    let idle = market.idle_usdc()?;
    let owed = market.total_borrowed()?.to_u64()?;
    let repaid = if idle == 0 || owed == 0 {
        0
    } else if idle >= owed {
        market.repay(RepayAmount::All)?
    } else {
        market.repay(RepayAmount::Exact(idle))?
    };

    Ok(redeemed > 0 || repaid > 0)
}

/// Unwinds the loop for at most `max_iterations` steps. When the debt
/// reaches zero the exact remaining share balance is redeemed, so no dust
/// stays supplied. Returns with `complete == false` when the budget ran out
/// first; calling again continues from there.
///
/// Fails with `ExitStalled` when the first step of the call cannot move
/// anything (no liquidity to redeem against and nothing idle to repay with).
/// A stall after earlier progress keeps that progress; the next call reports it.
pub fn exit_position<M: LendingMarket>(
    market: &mut M,
    auth: &Privileged,
    max_iterations: u32,
    percent: u64,
) -> Result<ExitOutcome> {
    require!(max_iterations >= 1, LoopError::InvalidLoopCount);
    validate_percent(percent)?;
    market.accrue_interest()?;

    let mut budget = WorkBudget::new(max_iterations);
    let mut iterations = 0;
    while !market.total_borrowed()?.is_zero() && budget.try_spend() {
        iterations += 1;
        if !redeem_and_repay(market, auth, percent)? {
            require!(iterations > 1, LoopError::ExitStalled);
            break;
        }
    }

    let complete = market.total_borrowed()?.is_zero();
    if complete {
        let shares = market.supply_shares()?;
        if shares > 0 {
            market.redeem(shares)?;
        }
    }

    let outcome = ExitOutcome {
        iterations,
        complete,
        idle_usdc: market.idle_usdc()?,
    };
    msg!(
        "exit_position: {} iterations, complete {}, idle {}",
        iterations,
        complete,
        Amount::<Usdc>::from_u64(outcome.idle_usdc)
    );
    Ok(outcome)
}
