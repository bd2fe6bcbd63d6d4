//! Single market operations exposed to owner and admin as-is.

use anchor_lang::prelude::*;

use crate::error::LoopError;
use crate::ledger::{LendingMarket, RepayAmount};
use crate::state::Privileged;

fn require_amount(amount: u64) -> Result<()> {
    require!(amount > 0, LoopError::InvalidAmount);
    Ok(())
}

pub fn supply<M: LendingMarket>(market: &mut M, _auth: &Privileged, amount: u64) -> Result<()> {
    require_amount(amount)?;
    market.supply(amount)
}

pub fn borrow<M: LendingMarket>(market: &mut M, _auth: &Privileged, amount: u64) -> Result<()> {
    require_amount(amount)?;
    market.borrow(amount)
}

/// `u64::MAX` repays the whole debt. Returns what was repaid.
pub fn repay<M: LendingMarket>(market: &mut M, _auth: &Privileged, amount: u64) -> Result<u64> {
    require_amount(amount)?;
    let amount = if amount == u64::MAX {
        RepayAmount::All
    } else {
        RepayAmount::Exact(amount)
    };
    market.repay(amount)
}

pub fn redeem<M: LendingMarket>(market: &mut M, _auth: &Privileged, shares: u128) -> Result<u64> {
    require!(shares > 0, LoopError::InvalidAmount);
    market.redeem(shares)
}

pub fn redeem_underlying<M: LendingMarket>(
    market: &mut M,
    _auth: &Privileged,
    amount: u64,
) -> Result<()> {
    require_amount(amount)?;
    market.redeem_underlying(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PositionLedger;
    use crate::sim::{SimMarket, USDC};
    use crate::state::privileged_for_tests;

    #[test]
    fn test_zero_amounts_are_rejected() {
        let auth = privileged_for_tests();
        let mut sim = SimMarket::new();
        sim.fund(100 * USDC);

        let invalid = || -> anchor_lang::error::Error { LoopError::InvalidAmount.into() };
        assert_eq!(supply(&mut sim, &auth, 0).unwrap_err(), invalid());
        assert_eq!(borrow(&mut sim, &auth, 0).unwrap_err(), invalid());
        assert_eq!(repay(&mut sim, &auth, 0).unwrap_err(), invalid());
        assert_eq!(redeem(&mut sim, &auth, 0).unwrap_err(), invalid());
        assert_eq!(redeem_underlying(&mut sim, &auth, 0).unwrap_err(), invalid());
        assert_eq!(sim.balance_usdc().unwrap(), 100 * USDC);
    }

    #[test]
    fn test_repay_max_clears_debt() {
        let auth = privileged_for_tests();
        let mut sim = SimMarket::new();
        sim.fund(1_000 * USDC);
        supply(&mut sim, &auth, 1_000 * USDC).unwrap();
        borrow(&mut sim, &auth, 300 * USDC).unwrap();

        assert_eq!(repay(&mut sim, &auth, u64::MAX).unwrap(), 300 * USDC);
        assert!(sim.total_borrowed().unwrap().is_zero());
        let shares = sim.supply_shares().unwrap();
        assert_eq!(redeem(&mut sim, &auth, shares).unwrap(), 1_000 * USDC);
    }
}
