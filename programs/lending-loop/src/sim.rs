//! In-memory lending market for unit tests. Runs the `lending` program's own
//! engine, so accrual, health checks and rounding match the deployed venue.

use anchor_lang::prelude::*;
use lending::state::{InterestRateModelConfig, Market, Obligation};
use lending::{LendingError, RATE_SCALE};

use crate::ledger::{LendingMarket, MarketSnapshot, RepayAmount};

pub const USDC: u64 = 1_000_000;

/// Liquidity provided by other suppliers so the vault can borrow.
pub const EXTERNAL_SUPPLY: u64 = 100_000_000 * USDC;

#[derive(Clone)]
pub struct SimMarket {
    pub market: Market,
    pub obligation: Obligation,
    pub external: Obligation,
    pub idle_usdc: u64,
    pub idle_rewards: u64,
    pub owner_usdc: u64,
    pub owner_rewards: u64,
    pub now: u64,
    /// Number of market operations that succeed before every later one fails.
    pub fail_after: Option<usize>,
}

fn obligation(market: &Market) -> Obligation {
    Obligation {
        market: Pubkey::new_unique(),
        owner: Pubkey::new_unique(),
        shares: 0,
        borrow_scaled: 0,
        supply_reward_snapshot: market.supply_reward_index,
        borrow_reward_snapshot: market.borrow_reward_index,
        rewards_accrued: 0,
        bump: 255,
    }
}

impl SimMarket {
    pub fn new() -> Self {
        let mut market = Market {
            authority: Pubkey::new_unique(),
            base_mint: Pubkey::new_unique(),
            vault: Pubkey::new_unique(),
            reward_mint: Pubkey::new_unique(),
            reward_vault: Pubkey::new_unique(),
            total_shares: 0,
            total_borrow_scaled: 0,
            supply_index: RATE_SCALE,
            borrow_index: RATE_SCALE,
            total_reserves: 0,
            supply_reward_index: 0,
            borrow_reward_index: 0,
            last_accrued_ts: 1_700_000_000,
            interest_model: InterestRateModelConfig {
                base_rate_bps: 100,
                slope1_bps: 400,
                slope2_bps: 10_000,
                kink_bps: 8_000,
            },
            collateral_factor_bps: 8_000,
            reserve_factor_bps: 1_000,
            supply_reward_speed: 0,
            borrow_reward_speed: 0,
            paused: false,
            bump: 255,
        };
        let mut external = obligation(&market);
        external
            .deposit(&mut market, EXTERNAL_SUPPLY)
            .expect("fresh market accepts deposits");
        let vault_obligation = obligation(&market);

        Self {
            now: market.last_accrued_ts,
            market,
            obligation: vault_obligation,
            external,
            idle_usdc: 0,
            idle_rewards: 0,
            owner_usdc: 0,
            owner_rewards: 0,
            fail_after: None,
        }
    }

    pub fn with_reward_speeds(mut self, supply: u64, borrow: u64) -> Self {
        self.market.supply_reward_speed = supply;
        self.market.borrow_reward_speed = borrow;
        self
    }

    /// Owner sends USDC to the vault.
    pub fn fund(&mut self, amount: u64) {
        self.idle_usdc += amount;
    }

    pub fn advance(&mut self, seconds: u64) {
        self.now += seconds;
    }

    /// Runs `f` all-or-nothing, the way an instruction commits or reverts.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let before = self.clone();
        let result = f(self);
        if result.is_err() {
            let fail_after = self.fail_after;
            *self = before;
            self.fail_after = fail_after;
        }
        result
    }

    fn step<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if let Some(left) = self.fail_after.as_mut() {
            if *left == 0 {
                return err!(LendingError::Paused);
            }
            *left -= 1;
        }
        self.transact(|sim| {
            sim.market.accrue(sim.now)?;
            f(sim)
        })
    }
}

impl LendingMarket for SimMarket {
    fn accrue_interest(&mut self) -> Result<()> {
        let now = self.now;
        self.market.accrue(now)
    }

    fn load(&self) -> Result<MarketSnapshot> {
        Ok(MarketSnapshot {
            market: self.market.clone(),
            obligation: self.obligation.clone(),
        })
    }

    fn idle_usdc(&self) -> Result<u64> {
        Ok(self.idle_usdc)
    }

    fn idle_rewards(&self) -> Result<u64> {
        Ok(self.idle_rewards)
    }

    fn supply(&mut self, amount: u64) -> Result<()> {
        self.step(|sim| {
            require!(amount <= sim.idle_usdc, LendingError::InvalidAmount);
            sim.obligation.deposit(&mut sim.market, amount)?;
            sim.idle_usdc -= amount;
            Ok(())
        })
    }

    fn borrow(&mut self, amount: u64) -> Result<()> {
        self.step(|sim| {
            sim.obligation.borrow(&mut sim.market, amount)?;
            sim.idle_usdc += amount;
            Ok(())
        })
    }

    fn repay(&mut self, amount: RepayAmount) -> Result<u64> {
        self.step(|sim| {
            let repaid = sim.obligation.repay(&mut sim.market, amount.to_wire())?;
            require!(repaid <= sim.idle_usdc, LendingError::InvalidAmount);
            sim.idle_usdc -= repaid;
            Ok(repaid)
        })
    }

    fn redeem(&mut self, shares: u128) -> Result<u64> {
        self.step(|sim| {
            let amount = sim.obligation.redeem_shares(&mut sim.market, shares)?;
            sim.idle_usdc += amount;
            Ok(amount)
        })
    }

    fn redeem_underlying(&mut self, amount: u64) -> Result<()> {
        self.step(|sim| {
            sim.obligation.redeem_underlying(&mut sim.market, amount)?;
            sim.idle_usdc += amount;
            Ok(())
        })
    }

    fn claim_rewards(&mut self) -> Result<u64> {
        self.step(|sim| {
            let market = sim.market.clone();
            let amount = sim.obligation.take_rewards(&market)?;
            sim.idle_rewards += amount;
            Ok(amount)
        })
    }

    fn transfer_usdc_to_owner(&mut self, amount: u64) -> Result<()> {
        require!(amount <= self.idle_usdc, LendingError::InvalidAmount);
        self.idle_usdc -= amount;
        self.owner_usdc += amount;
        Ok(())
    }

    fn transfer_rewards_to_owner(&mut self, amount: u64) -> Result<()> {
        require!(amount <= self.idle_rewards, LendingError::InvalidAmount);
        self.idle_rewards -= amount;
        self.owner_rewards += amount;
        Ok(())
    }
}
