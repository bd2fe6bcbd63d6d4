use anchor_lang::prelude::*;
use anchor_spl::token::{Token, TokenAccount};
use lending::amount::{Amount, RewardToken};
use lending::program::Lending;
use lending::state::{Market, Obligation};

use crate::adapter::CpiMarket;
use crate::constants::VAULT_SEED;
use crate::error::LoopError;
use crate::ledger::{AccountLiquidity, LendingMarket, PositionLedger};
use crate::looping;
use crate::primitives;
use crate::state::*;
use crate::unwind;

#[derive(Accounts)]
pub struct ManagePosition<'info> {
    pub caller: Signer<'info>,
    #[account(
        seeds = [VAULT_SEED, vault.seed.as_ref()],
        bump = vault.bump,
        has_one = market @ LoopError::InvalidMarket,
        has_one = obligation @ LoopError::InvalidMarket,
        has_one = usdc_account,
        has_one = reward_account
    )]
    pub vault: Account<'info, LoopVault>,
    #[account(mut)]
    pub market: Account<'info, Market>,
    #[account(mut)]
    pub obligation: Account<'info, Obligation>,
    #[account(mut)]
    pub usdc_account: Account<'info, TokenAccount>,
    #[account(mut)]
    pub reward_account: Account<'info, TokenAccount>,
    #[account(mut, address = market.vault @ LoopError::InvalidMarket)]
    pub market_vault: Account<'info, TokenAccount>,
    #[account(mut, address = market.reward_vault @ LoopError::InvalidMarket)]
    pub market_reward_vault: Account<'info, TokenAccount>,
    pub lending_program: Program<'info, Lending>,
    pub token_program: Program<'info, Token>,
}

impl<'info> ManagePosition<'info> {
    /// Runs `op` against the vault's position once the caller is authorized.
    pub fn run<T>(
        &self,
        op: impl FnOnce(&mut CpiMarket<'info>, &Privileged) -> Result<T>,
    ) -> Result<T> {
        self.run_on(self.cpi_market(), op)
    }

    fn run_on<T>(
        &self,
        mut market: CpiMarket<'info>,
        op: impl FnOnce(&mut CpiMarket<'info>, &Privileged) -> Result<T>,
    ) -> Result<T> {
        self.vault.roles.run_as(&self.caller.key(), &mut market, op)
    }

    pub fn cpi_market(&self) -> CpiMarket<'info> {
        CpiMarket {
            vault: self.vault.to_account_info(),
            vault_seed: self.vault.seed,
            vault_bump: self.vault.bump,
            market: self.market.to_account_info(),
            obligation: self.obligation.to_account_info(),
            usdc_account: self.usdc_account.to_account_info(),
            reward_account: self.reward_account.to_account_info(),
            market_vault: self.market_vault.to_account_info(),
            market_reward_vault: self.market_reward_vault.to_account_info(),
            lending_program: self.lending_program.to_account_info(),
            token_program: self.token_program.to_account_info(),
            owner_usdc_account: None,
            owner_reward_account: None,
        }
    }
}

#[derive(Accounts)]
pub struct PayoutToOwner<'info> {
    pub position: ManagePosition<'info>,
    #[account(
        mut,
        constraint = owner_token_account.owner == position.vault.roles.owner
            @ LoopError::MissingOwnerAccount
    )]
    pub owner_token_account: Account<'info, TokenAccount>,
}

pub fn supply(ctx: Context<ManagePosition>, amount: u64) -> Result<()> {
    ctx.accounts.run(|market, auth| primitives::supply(market, auth, amount))
}

pub fn borrow(ctx: Context<ManagePosition>, amount: u64) -> Result<()> {
    ctx.accounts.run(|market, auth| primitives::borrow(market, auth, amount))
}

pub fn repay(ctx: Context<ManagePosition>, amount: u64) -> Result<u64> {
    ctx.accounts.run(|market, auth| primitives::repay(market, auth, amount))
}

pub fn redeem(ctx: Context<ManagePosition>, shares: u128) -> Result<u64> {
    ctx.accounts.run(|market, auth| primitives::redeem(market, auth, shares))
}

pub fn redeem_underlying(ctx: Context<ManagePosition>, amount: u64) -> Result<()> {
    ctx.accounts
        .run(|market, auth| primitives::redeem_underlying(market, auth, amount))
}

pub fn borrow_and_supply(ctx: Context<ManagePosition>, percent: u64) -> Result<u64> {
    ctx.accounts
        .run(|market, auth| looping::borrow_and_supply(market, auth, percent))
}

pub fn redeem_and_repay(ctx: Context<ManagePosition>, percent: u64) -> Result<bool> {
    ctx.accounts
        .run(|market, auth| unwind::redeem_and_repay(market, auth, percent))
}

pub fn enter_position(ctx: Context<ManagePosition>, loop_count: u32, percent: u64) -> Result<()> {
    let outcome = ctx
        .accounts
        .run(|market, auth| looping::enter_position(market, auth, loop_count, percent))?;
    emit!(PositionEntered {
        vault: ctx.accounts.vault.key(),
        iterations: outcome.iterations,
        total_supplied: outcome.total_supplied,
        total_borrowed: outcome.total_borrowed,
    });
    Ok(())
}

/// Returns the vault's idle USDC after the unwind.
pub fn exit_position(
    ctx: Context<ManagePosition>,
    max_iterations: u32,
    percent: u64,
) -> Result<u64> {
    let outcome = ctx
        .accounts
        .run(|market, auth| unwind::exit_position(market, auth, max_iterations, percent))?;
    emit!(PositionExited {
        vault: ctx.accounts.vault.key(),
        iterations: outcome.iterations,
        complete: outcome.complete,
        idle_usdc: outcome.idle_usdc,
    });
    Ok(outcome.idle_usdc)
}

pub fn claim_rewards_to_owner(ctx: Context<PayoutToOwner>) -> Result<u64> {
    let position = &ctx.accounts.position;
    require_keys_eq!(
        ctx.accounts.owner_token_account.mint,
        position.reward_account.mint,
        LoopError::MissingOwnerAccount
    );

    let mut market = position.cpi_market();
    market.owner_reward_account = Some(ctx.accounts.owner_token_account.to_account_info());
    let amount = position.run_on(market, |m, auth| claim_to_owner(m, auth))?;

    emit!(RewardsClaimed { vault: position.vault.key(), amount });
    Ok(amount)
}

pub fn withdraw_all_usdc_to_owner(ctx: Context<PayoutToOwner>) -> Result<u64> {
    let position = &ctx.accounts.position;
    require_keys_eq!(
        ctx.accounts.owner_token_account.mint,
        position.usdc_account.mint,
        LoopError::MissingOwnerAccount
    );

    let mut market = position.cpi_market();
    market.owner_usdc_account = Some(ctx.accounts.owner_token_account.to_account_info());
    let amount = position.run_on(market, |m, auth| sweep_usdc_to_owner(m, auth))?;

    emit!(UsdcSwept { vault: position.vault.key(), amount });
    Ok(amount)
}

/// Claims from the market, then hands the whole reward balance to the owner.
pub fn claim_to_owner<M: LendingMarket>(market: &mut M, _auth: &Privileged) -> Result<u64> {
    market.claim_rewards()?;
    let amount = market.idle_rewards()?;
    market.transfer_rewards_to_owner(amount)?;
    msg!("Rewards sent to owner: {}", Amount::<RewardToken>::from_u64(amount));
    Ok(amount)
}

pub fn sweep_usdc_to_owner<M: LendingMarket>(market: &mut M, _auth: &Privileged) -> Result<u64> {
    let amount = market.idle_usdc()?;
    market.transfer_usdc_to_owner(amount)?;
    Ok(amount)
}

pub fn get_balance_usdc(ctx: Context<ManagePosition>) -> Result<u64> {
    ctx.accounts.cpi_market().balance_usdc()
}

pub fn get_balance_reward(ctx: Context<ManagePosition>) -> Result<u64> {
    ctx.accounts.cpi_market().balance_reward()
}

pub fn get_claimable_rewards(ctx: Context<ManagePosition>) -> Result<u128> {
    Ok(ctx.accounts.cpi_market().claimable_rewards()?.raw())
}

pub fn get_total_supplied(ctx: Context<ManagePosition>) -> Result<u64> {
    ctx.accounts.cpi_market().total_supplied()?.to_u64()
}

pub fn get_total_supplied_accrued(ctx: Context<ManagePosition>) -> Result<u64> {
    ctx.accounts.cpi_market().total_supplied_accrued()?.to_u64()
}

pub fn get_total_borrowed(ctx: Context<ManagePosition>) -> Result<u64> {
    ctx.accounts.cpi_market().total_borrowed()?.to_u64()
}

pub fn get_total_borrowed_accrued(ctx: Context<ManagePosition>) -> Result<u64> {
    ctx.accounts.cpi_market().total_borrowed_accrued()?.to_u64()
}

pub fn get_account_liquidity(ctx: Context<ManagePosition>) -> Result<AccountLiquidity> {
    ctx.accounts.cpi_market().account_liquidity()
}

pub fn get_account_liquidity_accrued(ctx: Context<ManagePosition>) -> Result<AccountLiquidity> {
    ctx.accounts.cpi_market().account_liquidity_accrued()
}

#[event]
pub struct PositionEntered {
    pub vault: Pubkey,
    pub iterations: u32,
    pub total_supplied: u64,
    pub total_borrowed: u64,
}

#[event]
pub struct PositionExited {
    pub vault: Pubkey,
    pub iterations: u32,
    pub complete: bool,
    pub idle_usdc: u64,
}

#[event]
pub struct RewardsClaimed {
    pub vault: Pubkey,
    pub amount: u64,
}

#[event]
pub struct UsdcSwept {
    pub vault: Pubkey,
    pub amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimMarket, USDC};
    use crate::state::privileged_for_tests;

    /// What a rejected call must leave untouched.
    fn fingerprint(sim: &SimMarket) -> (u128, u128, u128, u64, u64, u64, u64) {
        (
            sim.obligation.shares,
            sim.obligation.borrow_scaled,
            sim.obligation.rewards_accrued,
            sim.idle_usdc,
            sim.idle_rewards,
            sim.owner_usdc,
            sim.owner_rewards,
        )
    }

    #[test]
    fn test_rewards_accrue_and_reach_owner() {
        let auth = privileged_for_tests();
        let mut sim = SimMarket::new().with_reward_speeds(100_000_000_000_000, 10_000_000_000_000);
        sim.fund(1_000_000 * USDC);
        looping::enter_position(&mut sim, &auth, 11, 100_000).unwrap();

        sim.advance(24 * 3600);
        sim.accrue_interest().unwrap();
        let claimable = sim.claimable_rewards().unwrap();
        assert!(!claimable.is_zero());

        let sent = claim_to_owner(&mut sim, &auth).unwrap();

        assert_eq!(sent as u128, claimable.raw());
        assert_eq!(sim.owner_rewards, sent);
        assert_eq!(sim.balance_reward().unwrap(), 0);
        assert!(sim.claimable_rewards().unwrap().is_zero());
    }

    #[test]
    fn test_claim_beyond_u64_leaves_remainder_accrued() {
        let auth = privileged_for_tests();
        let mut sim = SimMarket::new().with_reward_speeds(100_000_000_000_000, 10_000_000_000_000);
        sim.fund(1_000_000 * USDC);
        looping::enter_position(&mut sim, &auth, 11, 100_000).unwrap();

        sim.advance(30 * 24 * 3600);
        sim.accrue_interest().unwrap();
        let claimable = sim.claimable_rewards().unwrap().raw();
        assert!(claimable > u64::MAX as u128);

        let sent = claim_to_owner(&mut sim, &auth).unwrap();

        assert_eq!(sent, u64::MAX);
        assert_eq!(sim.owner_rewards, u64::MAX);
        assert_eq!(sim.claimable_rewards().unwrap().raw(), claimable - u64::MAX as u128);
    }

    #[test]
    fn test_borrow_side_rewards_follow_debt() {
        let mut sim = SimMarket::new().with_reward_speeds(0, 1_000_000);
        sim.fund(1_000 * USDC);
        sim.supply(1_000 * USDC).unwrap();
        sim.advance(100);
        sim.accrue_interest().unwrap();
        // nothing borrowed yet, nothing earned
        assert!(sim.claimable_rewards().unwrap().is_zero());

        sim.borrow(100 * USDC).unwrap();
        sim.advance(100);
        sim.accrue_interest().unwrap();

        // sole borrower receives the whole emission, less index rounding
        let earned = sim.claimable_rewards().unwrap().raw();
        assert!(earned <= 100_000_000);
        assert!(earned >= 100_000_000 - 1);
    }

    #[test]
    fn test_claim_with_nothing_accrued() {
        let mut sim = SimMarket::new();
        assert_eq!(claim_to_owner(&mut sim, &privileged_for_tests()).unwrap(), 0);
        assert_eq!(sim.owner_rewards, 0);
    }

    #[test]
    fn test_sweep_moves_all_idle_usdc() {
        let mut sim = SimMarket::new();
        sim.fund(1_000 * USDC);
        sim.supply(400 * USDC).unwrap();

        assert_eq!(sweep_usdc_to_owner(&mut sim, &privileged_for_tests()).unwrap(), 600 * USDC);
        assert_eq!(sim.owner_usdc, 600 * USDC);
        assert_eq!(sim.balance_usdc().unwrap(), 0);
        assert_eq!(sim.total_supplied().unwrap().to_u64().unwrap(), 400 * USDC);
    }

    #[test]
    fn test_full_cycle_back_to_owner() {
        let auth = privileged_for_tests();
        let mut sim = SimMarket::new();
        sim.fund(1_000_000 * USDC);
        looping::enter_position(&mut sim, &auth, 11, 100_000).unwrap();
        unwind::exit_position(&mut sim, &auth, 100, 100_000).unwrap();

        sweep_usdc_to_owner(&mut sim, &auth).unwrap();

        assert_eq!(sim.owner_usdc, 1_000_000 * USDC);
    }

    #[test]
    fn test_stranger_cannot_touch_position() {
        let owner = Pubkey::new_unique();
        let admin = Pubkey::new_unique();
        let stranger = Pubkey::new_unique();
        let mut roles = Roles::new(owner);
        roles.set_admin(&owner, admin).unwrap();

        let mut sim = SimMarket::new().with_reward_speeds(1_000_000, 1_000_000);
        sim.fund(2_000 * USDC);
        roles
            .run_as(&owner, &mut sim, |m, auth| {
                looping::enter_position(m, auth, 3, 100_000).map(|_| ())
            })
            .unwrap();
        sim.advance(3600);
        let before = fingerprint(&sim);

        let ops: [fn(&mut SimMarket, &Privileged) -> Result<()>; 11] = [
            |m, a| primitives::supply(m, a, USDC),
            |m, a| primitives::borrow(m, a, USDC),
            |m, a| primitives::repay(m, a, u64::MAX).map(|_| ()),
            |m, a| primitives::redeem(m, a, 1).map(|_| ()),
            |m, a| primitives::redeem_underlying(m, a, USDC),
            |m, a| looping::borrow_and_supply(m, a, 100_000).map(|_| ()),
            |m, a| unwind::redeem_and_repay(m, a, 100_000).map(|_| ()),
            |m, a| looping::enter_position(m, a, 1, 100_000).map(|_| ()),
            |m, a| unwind::exit_position(m, a, 32, 100_000).map(|_| ()),
            |m, a| claim_to_owner(m, a).map(|_| ()),
            |m, a| sweep_usdc_to_owner(m, a).map(|_| ()),
        ];
        for op in ops {
            let err = roles.run_as(&stranger, &mut sim, op).unwrap_err();
            assert_eq!(err, LoopError::Unauthorized.into());
        }

        assert_eq!(fingerprint(&sim), before);
        assert_eq!(sim.market.last_accrued_ts, 1_700_000_000);

        // the admin drives the same position
        let exited = roles
            .run_as(&admin, &mut sim, |m, auth| unwind::exit_position(m, auth, 32, 100_000))
            .unwrap();
        assert!(exited.complete);
    }
}
