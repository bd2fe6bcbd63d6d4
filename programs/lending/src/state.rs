use anchor_lang::prelude::*;

use crate::amount::{Amount, RewardToken, UsdValue, Usdc};
use crate::math::{
    borrow_rate, interest_factor, mul_div_ceil, mul_div_floor, utilization, BPS_SCALE,
    RATE_SCALE, REWARD_INDEX_SCALE,
};
use crate::LendingError;

/// Sentinel accepted by `repay` meaning "everything currently owed".
pub const REPAY_ALL: u64 = u64::MAX;

/// `Liquidity::err` when the valuation overflowed.
pub const LIQUIDITY_MATH_ERROR: u64 = 1;

#[account]
pub struct Market {
    pub authority: Pubkey,
    pub base_mint: Pubkey,
    pub vault: Pubkey,
    pub reward_mint: Pubkey,
    pub reward_vault: Pubkey,
    pub total_shares: u128,
    pub total_borrow_scaled: u128,
    pub supply_index: u128,
    pub borrow_index: u128,
    pub total_reserves: u128,
    pub supply_reward_index: u128,
    pub borrow_reward_index: u128,
    pub last_accrued_ts: u64,
    pub interest_model: InterestRateModelConfig,
    pub collateral_factor_bps: u64,
    pub reserve_factor_bps: u64,
    pub supply_reward_speed: u64, // reward base units per second, split across suppliers
    pub borrow_reward_speed: u64, // reward base units per second, split across borrowers
    pub paused: bool,
    pub bump: u8,
}

impl Market {
    pub const SIZE: usize = 8 + // discriminator
        32 + // authority
        32 + // base_mint
        32 + // vault
        32 + // reward_mint
        32 + // reward_vault
        16 + // total_shares
        16 + // total_borrow_scaled
        16 + // supply_index
        16 + // borrow_index
        16 + // total_reserves
        16 + // supply_reward_index
        16 + // borrow_reward_index
        8 +  // last_accrued_ts
        InterestRateModelConfig::SIZE +
        8 +  // collateral_factor_bps
        8 +  // reserve_factor_bps
        8 +  // supply_reward_speed
        8 +  // borrow_reward_speed
        1 +  // paused
        1;   // bump

    /// Underlying owed to all suppliers, interest included.
    pub fn total_supply(&self) -> Result<Amount<Usdc>> {
        mul_div_floor(self.total_shares, self.supply_index, RATE_SCALE).map(Amount::from_raw)
    }

    /// Underlying owed by all borrowers, interest included.
    pub fn total_borrowed(&self) -> Result<Amount<Usdc>> {
        mul_div_ceil(self.total_borrow_scaled, self.borrow_index, RATE_SCALE).map(Amount::from_raw)
    }

    /// Cash held by the vault: supplier claims plus reserves minus outstanding debt.
    pub fn available_liquidity(&self) -> Result<Amount<Usdc>> {
        let claims = self
            .total_supply()?
            .checked_add(Amount::from_raw(self.total_reserves))?;
        Ok(claims.saturating_sub(self.total_borrowed()?))
    }

    /// Brings indices up to `now`. A no-op when already accrued at or after `now`.
    pub fn accrue(&mut self, now: u64) -> Result<()> {
        if now <= self.last_accrued_ts {
            return Ok(());
        }
        let elapsed = now - self.last_accrued_ts;
        self.accrue_rewards(elapsed)?;

        let borrowed = self.total_borrowed()?.raw();
        let supplied = self.total_supply()?.raw();
        let rate = borrow_rate(&self.interest_model, utilization(borrowed, supplied)?)?;
        let factor = interest_factor(rate, elapsed)?;

        let interest = mul_div_floor(borrowed, factor, RATE_SCALE)?;
        let reserve = mul_div_floor(interest, self.reserve_factor_bps as u128, BPS_SCALE)?;
        let to_suppliers = interest - reserve;

        self.borrow_index = self
            .borrow_index
            .checked_add(mul_div_floor(self.borrow_index, factor, RATE_SCALE)?)
            .ok_or(LendingError::MathOverflow)?;
        if supplied > 0 {
            self.supply_index = self
                .supply_index
                .checked_add(mul_div_floor(self.supply_index, to_suppliers, supplied)?)
                .ok_or(LendingError::MathOverflow)?;
        }
        self.total_reserves = self
            .total_reserves
            .checked_add(reserve)
            .ok_or(LendingError::MathOverflow)?;
        self.last_accrued_ts = now;
        Ok(())
    }

    fn accrue_rewards(&mut self, elapsed: u64) -> Result<()> {
        if self.total_shares > 0 {
            let emitted = (self.supply_reward_speed as u128) * (elapsed as u128);
            self.supply_reward_index = self
                .supply_reward_index
                .checked_add(mul_div_floor(emitted, REWARD_INDEX_SCALE, self.total_shares)?)
                .ok_or(LendingError::MathOverflow)?;
        }
        if self.total_borrow_scaled > 0 {
            let emitted = (self.borrow_reward_speed as u128) * (elapsed as u128);
            self.borrow_reward_index = self
                .borrow_reward_index
                .checked_add(mul_div_floor(emitted, REWARD_INDEX_SCALE, self.total_borrow_scaled)?)
                .ok_or(LendingError::MathOverflow)?;
        }
        Ok(())
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterestRateModelConfig {
    pub base_rate_bps: u64,
    pub slope1_bps: u64,
    pub slope2_bps: u64,
    pub kink_bps: u64,
}

impl InterestRateModelConfig {
    pub const SIZE: usize = 8 * 4;
}

/// One account's position in a market.
#[account]
pub struct Obligation {
    pub market: Pubkey,
    pub owner: Pubkey,
    pub shares: u128,
    pub borrow_scaled: u128,
    pub supply_reward_snapshot: u128,
    pub borrow_reward_snapshot: u128,
    pub rewards_accrued: u128,
    pub bump: u8,
}

impl Obligation {
    pub const SIZE: usize = 8 + // discriminator
        32 + // market
        32 + // owner
        16 + // shares
        16 + // borrow_scaled
        16 + // supply_reward_snapshot
        16 + // borrow_reward_snapshot
        16 + // rewards_accrued
        1;   // bump

    pub fn supplied(&self, market: &Market) -> Result<Amount<Usdc>> {
        mul_div_floor(self.shares, market.supply_index, RATE_SCALE).map(Amount::from_raw)
    }

    pub fn borrowed(&self, market: &Market) -> Result<Amount<Usdc>> {
        mul_div_ceil(self.borrow_scaled, market.borrow_index, RATE_SCALE).map(Amount::from_raw)
    }

    /// Collateral value (after the collateral factor) minus debt value.
    ///
    /// Mirrors the Compound convention: a valuation failure is reported
    /// through `err` rather than by failing the call.
    pub fn account_liquidity(&self, market: &Market) -> Liquidity {
        self.try_account_liquidity(market).unwrap_or(Liquidity {
            err: LIQUIDITY_MATH_ERROR,
            ..Liquidity::default()
        })
    }

    fn try_account_liquidity(&self, market: &Market) -> Result<Liquidity> {
        let collateral = self
            .supplied(market)?
            .mul_bps(market.collateral_factor_bps)?
            .rescale::<UsdValue>()?;
        let debt = self.borrowed(market)?.rescale::<UsdValue>()?;
        let mut liquidity = Liquidity::default();
        if collateral >= debt {
            liquidity.liquidity = collateral.checked_sub(debt)?;
        } else {
            liquidity.shortfall = debt.checked_sub(collateral)?;
        }
        Ok(liquidity)
    }

    /// Rewards already settled plus those pending since the last snapshot.
    pub fn claimable_rewards(&self, market: &Market) -> Result<Amount<RewardToken>> {
        let pending = self.pending_rewards(market)?;
        Amount::from_raw(self.rewards_accrued).checked_add(pending)
    }

    fn pending_rewards(&self, market: &Market) -> Result<Amount<RewardToken>> {
        let supply_delta = market
            .supply_reward_index
            .saturating_sub(self.supply_reward_snapshot);
        let borrow_delta = market
            .borrow_reward_index
            .saturating_sub(self.borrow_reward_snapshot);
        let from_supply = mul_div_floor(self.shares, supply_delta, REWARD_INDEX_SCALE)?;
        let from_borrow = mul_div_floor(self.borrow_scaled, borrow_delta, REWARD_INDEX_SCALE)?;
        Amount::from_raw(from_supply).checked_add(Amount::from_raw(from_borrow))
    }

    pub fn settle_rewards(&mut self, market: &Market) -> Result<()> {
        let pending = self.pending_rewards(market)?;
        self.rewards_accrued = Amount::<RewardToken>::from_raw(self.rewards_accrued)
            .checked_add(pending)?
            .raw();
        self.supply_reward_snapshot = market.supply_reward_index;
        self.borrow_reward_snapshot = market.borrow_reward_index;
        Ok(())
    }

    fn require_healthy(&self, market: &Market) -> Result<()> {
        let liquidity = self.account_liquidity(market);
        require!(liquidity.err == 0, LendingError::MathOverflow);
        require!(liquidity.shortfall.is_zero(), LendingError::InsufficientCollateral);
        Ok(())
    }

    /// Supplies `amount` of underlying; returns the shares minted.
    /// The market must already be accrued.
    pub fn deposit(&mut self, market: &mut Market, amount: u64) -> Result<u128> {
        require!(!market.paused, LendingError::Paused);
        require!(amount > 0, LendingError::InvalidAmount);
        self.settle_rewards(market)?;

        let shares = mul_div_floor(amount as u128, RATE_SCALE, market.supply_index)?;
        require!(shares > 0, LendingError::InvalidAmount);

        self.shares = self.shares.checked_add(shares).ok_or(LendingError::MathOverflow)?;
        market.total_shares = market
            .total_shares
            .checked_add(shares)
            .ok_or(LendingError::MathOverflow)?;
        Ok(shares)
    }

    /// Burns `shares`; returns the underlying released.
    pub fn redeem_shares(&mut self, market: &mut Market, shares: u128) -> Result<u64> {
        require!(shares > 0 && shares <= self.shares, LendingError::InvalidAmount);
        let amount = mul_div_floor(shares, market.supply_index, RATE_SCALE)?;
        self.withdraw(market, shares, amount)?;
        Amount::<Usdc>::from_raw(amount).to_u64()
    }

    /// Withdraws exactly `amount` of underlying; returns the shares burned.
    pub fn redeem_underlying(&mut self, market: &mut Market, amount: u64) -> Result<u128> {
        require!(amount > 0, LendingError::InvalidAmount);
        let shares = mul_div_ceil(amount as u128, RATE_SCALE, market.supply_index)?;
        require!(shares <= self.shares, LendingError::InvalidAmount);
        self.withdraw(market, shares, amount as u128)?;
        Ok(shares)
    }

    fn withdraw(&mut self, market: &mut Market, shares: u128, amount: u128) -> Result<()> {
        require!(
            Amount::<Usdc>::from_raw(amount) <= market.available_liquidity()?,
            LendingError::InsufficientLiquidity
        );
        self.settle_rewards(market)?;

        let mut next = self.clone();
        next.shares -= shares;
        next.require_healthy(market)?;

        *self = next;
        market.total_shares = market.total_shares.saturating_sub(shares);
        Ok(())
    }

    pub fn borrow(&mut self, market: &mut Market, amount: u64) -> Result<()> {
        require!(!market.paused, LendingError::Paused);
        require!(amount > 0, LendingError::InvalidAmount);
        require!(
            Amount::<Usdc>::from_u64(amount) <= market.available_liquidity()?,
            LendingError::InsufficientLiquidity
        );
        self.settle_rewards(market)?;

        let scaled = mul_div_ceil(amount as u128, RATE_SCALE, market.borrow_index)?;
        let mut next = self.clone();
        next.borrow_scaled = next
            .borrow_scaled
            .checked_add(scaled)
            .ok_or(LendingError::MathOverflow)?;
        next.require_healthy(market)?;

        *self = next;
        market.total_borrow_scaled = market
            .total_borrow_scaled
            .checked_add(scaled)
            .ok_or(LendingError::MathOverflow)?;
        Ok(())
    }

    /// Repays the lesser of `requested` and the current debt; `REPAY_ALL`
    /// clears the debt exactly. Returns the amount actually repaid.
    pub fn repay(&mut self, market: &mut Market, requested: u64) -> Result<u64> {
        require!(requested > 0, LendingError::InvalidAmount);
        self.settle_rewards(market)?;

        let owed = self.borrowed(market)?;
        let amount = Amount::<Usdc>::from_u64(requested).min(owed);
        if amount.is_zero() {
            return Ok(0);
        }

        let scaled = if amount == owed {
            self.borrow_scaled
        } else {
            mul_div_floor(amount.raw(), RATE_SCALE, market.borrow_index)?.min(self.borrow_scaled)
        };
        self.borrow_scaled -= scaled;
        market.total_borrow_scaled = market.total_borrow_scaled.saturating_sub(scaled);
        amount.to_u64()
    }

    /// Settles and hands out the accrued rewards; returns the amount. At most
    /// `u64::MAX` leaves per call, the rest stays accrued for the next claim.
    pub fn take_rewards(&mut self, market: &Market) -> Result<u64> {
        self.settle_rewards(market)?;
        let amount = Amount::<RewardToken>::from_raw(self.rewards_accrued)
            .min(Amount::from_u64(u64::MAX))
            .to_u64()?;
        self.rewards_accrued -= amount as u128;
        Ok(amount)
    }
}

/// Account liquidity in `UsdValue` units, Compound style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Liquidity {
    pub err: u64,
    pub liquidity: Amount<UsdValue>,
    pub shortfall: Amount<UsdValue>,
}
