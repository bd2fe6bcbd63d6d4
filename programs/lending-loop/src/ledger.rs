//! The narrow view of the lending market the loop works against, and the
//! read side built on top of it.
//!
//! [`LendingMarket`] is what the controllers call. On chain it is backed by
//! CPIs into the `lending` program ([`crate::adapter::CpiMarket`]); in tests
//! by an in-memory market running the same engine. [`PositionLedger`] comes
//! for free with any implementation and turns the market's raw accounts into
//! the position aggregates the loop reasons about.

use anchor_lang::prelude::*;
use lending::amount::{Amount, RewardToken, Usdc};
use lending::state::{Market, Obligation};

use crate::error::LoopError;

/// Market state together with the vault's obligation, read at one point in time.
#[derive(Clone)]
pub struct MarketSnapshot {
    pub market: Market,
    pub obligation: Obligation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepayAmount {
    Exact(u64),
    /// Whatever is owed at execution time, interest included.
    All,
}

impl RepayAmount {
    /// Wire form understood by the market; `u64::MAX` means everything.
    pub fn to_wire(self) -> u64 {
        match self {
            RepayAmount::Exact(amount) => amount,
            RepayAmount::All => lending::state::REPAY_ALL,
        }
    }
}

pub trait LendingMarket {
    fn accrue_interest(&mut self) -> Result<()>;
    fn load(&self) -> Result<MarketSnapshot>;
    /// USDC held by the vault and not supplied.
    fn idle_usdc(&self) -> Result<u64>;
    fn idle_rewards(&self) -> Result<u64>;

    fn supply(&mut self, amount: u64) -> Result<()>;
    fn borrow(&mut self, amount: u64) -> Result<()>;
    /// Returns the amount actually repaid.
    fn repay(&mut self, amount: RepayAmount) -> Result<u64>;
    /// Burns supply shares; returns the underlying received.
    fn redeem(&mut self, shares: u128) -> Result<u64>;
    fn redeem_underlying(&mut self, amount: u64) -> Result<()>;
    /// Moves accrued rewards into the vault; returns the amount.
    fn claim_rewards(&mut self) -> Result<u64>;

    fn transfer_usdc_to_owner(&mut self, amount: u64) -> Result<()>;
    fn transfer_rewards_to_owner(&mut self, amount: u64) -> Result<()>;
}

/// Account liquidity in USDC base units.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountLiquidity {
    pub err: u64,
    pub liquidity: u64,
    pub shortfall: u64,
}

pub trait PositionLedger: LendingMarket {
    fn balance_usdc(&self) -> Result<u64> {
        self.idle_usdc()
    }

    fn balance_reward(&self) -> Result<u64> {
        self.idle_rewards()
    }

    fn claimable_rewards(&self) -> Result<Amount<RewardToken>> {
        let snapshot = self.load()?;
        snapshot.obligation.claimable_rewards(&snapshot.market)
    }

    fn total_supplied(&self) -> Result<Amount<Usdc>> {
        let snapshot = self.load()?;
        snapshot.obligation.supplied(&snapshot.market)
    }

    fn total_borrowed(&self) -> Result<Amount<Usdc>> {
        let snapshot = self.load()?;
        snapshot.obligation.borrowed(&snapshot.market)
    }

    fn supply_shares(&self) -> Result<u128> {
        Ok(self.load()?.obligation.shares)
    }

    fn collateral_factor_bps(&self) -> Result<u64> {
        Ok(self.load()?.market.collateral_factor_bps)
    }

    fn account_liquidity(&self) -> Result<AccountLiquidity> {
        let snapshot = self.load()?;
        let raw = snapshot.obligation.account_liquidity(&snapshot.market);
        if raw.err != 0 {
            return Ok(AccountLiquidity { err: raw.err, ..AccountLiquidity::default() });
        }
        Ok(AccountLiquidity {
            err: 0,
            liquidity: raw.liquidity.rescale::<Usdc>()?.to_u64()?,
            shortfall: raw.shortfall.rescale::<Usdc>()?.to_u64()?,
        })
    }

    fn total_supplied_accrued(&mut self) -> Result<Amount<Usdc>> {
        self.accrue_interest()?;
        self.total_supplied()
    }

    fn total_borrowed_accrued(&mut self) -> Result<Amount<Usdc>> {
        self.accrue_interest()?;
        self.total_borrowed()
    }

    fn account_liquidity_accrued(&mut self) -> Result<AccountLiquidity> {
        self.accrue_interest()?;
        self.account_liquidity()
    }
}

impl<M: LendingMarket + ?Sized> PositionLedger for M {}

/// Base units one borrow or redeem can lose to the market's share/debt rounding.
pub const ROUNDING_SLACK: u64 = 2;

/// Liquidity that still passes the market's health check after one
/// operation priced at `index`. Exact while the index is a whole multiple of 1.0.
pub fn usable_liquidity(liquidity: u64, index: u128) -> u64 {
    if index % lending::RATE_SCALE == 0 {
        liquidity
    } else {
        liquidity.saturating_sub(ROUNDING_SLACK)
    }
}

/// `liquidity * percent / PERCENT_PRECISION`, rounded down.
pub fn share_of(liquidity: u64, percent: u64) -> Result<u64> {
    let amount = (liquidity as u128)
        .checked_mul(percent as u128)
        .map(|v| v / crate::constants::PERCENT_PRECISION as u128)
        .ok_or(LoopError::MathOverflow)?;
    u64::try_from(amount).map_err(|_| error!(LoopError::MathOverflow))
}

pub fn validate_percent(percent: u64) -> Result<()> {
    require!(
        percent >= 1 && percent <= crate::constants::PERCENT_PRECISION,
        LoopError::InvalidPercent
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimMarket, USDC};

    #[test]
    fn test_empty_position_reads_zero() {
        let mut sim = SimMarket::new();
        assert_eq!(sim.balance_usdc().unwrap(), 0);
        assert_eq!(sim.balance_reward().unwrap(), 0);
        assert_eq!(sim.total_supplied().unwrap(), Amount::ZERO);
        assert_eq!(sim.total_borrowed_accrued().unwrap(), Amount::ZERO);
        assert_eq!(sim.account_liquidity().unwrap(), AccountLiquidity::default());
        assert_eq!(sim.claimable_rewards().unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_liquidity_is_reported_in_usdc_units() {
        let mut sim = SimMarket::new();
        sim.fund(1_000 * USDC);
        sim.supply(1_000 * USDC).unwrap();
        let liquidity = sim.account_liquidity().unwrap();
        assert_eq!(liquidity, AccountLiquidity { err: 0, liquidity: 800 * USDC, shortfall: 0 });
    }

    #[test]
    fn test_accrued_reads_see_interest() {
        let mut sim = SimMarket::new();
        sim.fund(1_000 * USDC);
        sim.supply(1_000 * USDC).unwrap();
        sim.borrow(500 * USDC).unwrap();
        sim.advance(30 * 24 * 3600);

        let stale = sim.total_borrowed().unwrap();
        let fresh = sim.total_borrowed_accrued().unwrap();
        assert_eq!(stale, Amount::from_u64(500 * USDC));
        assert!(fresh > stale);
    }

    #[test]
    fn test_share_of() {
        assert_eq!(share_of(800_000, 100_000).unwrap(), 800_000);
        assert_eq!(share_of(800_000, 50_000).unwrap(), 400_000);
        assert_eq!(share_of(3, 33_333).unwrap(), 0);
    }

    #[test]
    fn test_usable_liquidity_only_trims_after_accrual() {
        assert_eq!(usable_liquidity(1_000, lending::RATE_SCALE), 1_000);
        assert_eq!(usable_liquidity(1_000, lending::RATE_SCALE + 1), 998);
        assert_eq!(usable_liquidity(1, lending::RATE_SCALE * 3 / 2), 0);
    }

    #[test]
    fn test_percent_range() {
        assert!(validate_percent(0).is_err());
        assert!(validate_percent(1).is_ok());
        assert!(validate_percent(100_000).is_ok());
        assert!(validate_percent(100_001).is_err());
    }

    #[test]
    fn test_repay_all_maps_to_sentinel() {
        assert_eq!(RepayAmount::All.to_wire(), u64::MAX);
        assert_eq!(RepayAmount::Exact(5).to_wire(), 5);
    }
}
