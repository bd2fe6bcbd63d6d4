// Summary: single-asset money market. Suppliers receive index-scaled shares,
// borrowers carry index-scaled debt, and each account lives in its own
// Obligation so health checks use the market's collateral factor. Rewards are
// emitted per second to both sides through per-share reward indices.
//
// Rates, indices and utilization use u128 fixed point with RATE_SCALE = 1e9.

use anchor_lang::prelude::*;
use anchor_spl::token::{self, Mint, Token, TokenAccount, Transfer};

pub mod amount;
pub mod math;
pub mod state;
use amount::{Amount, RewardToken};
use state::*;

declare_id!("BeJW4TrT31GWgW5wpLeYS4tFiCQquHd5bHcfYrPykErs");

pub use math::RATE_SCALE;

pub const MARKET_SEED: &[u8] = b"market";
pub const VAULT_SEED: &[u8] = b"vault";
pub const REWARD_VAULT_SEED: &[u8] = b"reward_vault";
pub const OBLIGATION_SEED: &[u8] = b"obligation";

fn now() -> Result<u64> {
    Ok(Clock::get()?.unix_timestamp as u64)
}

/// Moves `amount` out of a market-owned token account.
fn transfer_from_market<'info>(
    market: &Account<'info, Market>,
    from: &Account<'info, TokenAccount>,
    to: &Account<'info, TokenAccount>,
    token_program: &Program<'info, Token>,
    amount: u64,
) -> Result<()> {
    let seeds = &[MARKET_SEED, market.base_mint.as_ref(), &[market.bump]];
    let signer = &[&seeds[..]];
    let cpi_accounts = Transfer {
        from: from.to_account_info(),
        to: to.to_account_info(),
        authority: market.to_account_info(),
    };
    token::transfer(
        CpiContext::new_with_signer(token_program.to_account_info(), cpi_accounts, signer),
        amount,
    )
}

#[program]
pub mod lending {
    use super::*;

    pub fn initialize_market(
        ctx: Context<InitializeMarket>,
        params: InitializeMarketParams,
    ) -> Result<()> {
        params.validate()?;
        let market = &mut ctx.accounts.market;

        market.authority = ctx.accounts.authority.key();
        market.base_mint = ctx.accounts.base_mint.key();
        market.vault = ctx.accounts.vault.key();
        market.reward_mint = ctx.accounts.reward_mint.key();
        market.reward_vault = ctx.accounts.reward_vault.key();
        market.total_shares = 0;
        market.total_borrow_scaled = 0;
        market.supply_index = RATE_SCALE; // start at 1.0
        market.borrow_index = RATE_SCALE;
        market.total_reserves = 0;
        market.supply_reward_index = 0;
        market.borrow_reward_index = 0;
        market.last_accrued_ts = now()?;
        market.interest_model = InterestRateModelConfig {
            base_rate_bps: params.base_rate_bps,
            slope1_bps: params.slope1_bps,
            slope2_bps: params.slope2_bps,
            kink_bps: params.kink_bps,
        };
        market.collateral_factor_bps = params.collateral_factor_bps;
        market.reserve_factor_bps = params.reserve_factor_bps;
        market.supply_reward_speed = params.supply_reward_speed;
        market.borrow_reward_speed = params.borrow_reward_speed;
        market.paused = false;
        market.bump = ctx.bumps.market;

        msg!(
            "Market initialized: cf {} bps, reserve {} bps",
            params.collateral_factor_bps,
            params.reserve_factor_bps
        );
        Ok(())
    }

    pub fn pause_market(ctx: Context<MarketAdmin>, paused: bool) -> Result<()> {
        let market = &mut ctx.accounts.market;
        require_keys_eq!(
            market.authority,
            ctx.accounts.authority.key(),
            LendingError::Unauthorized
        );
        market.paused = paused;
        msg!("Market paused: {}", paused);
        Ok(())
    }

    pub fn set_reward_speeds(
        ctx: Context<MarketAdmin>,
        supply_speed: u64,
        borrow_speed: u64,
    ) -> Result<()> {
        let market = &mut ctx.accounts.market;
        require_keys_eq!(
            market.authority,
            ctx.accounts.authority.key(),
            LendingError::Unauthorized
        );
        // Emission up to now runs at the old speeds.
        market.accrue(now()?)?;
        market.supply_reward_speed = supply_speed;
        market.borrow_reward_speed = borrow_speed;
        Ok(())
    }

    pub fn accrue_interest(ctx: Context<AccrueInterest>) -> Result<()> {
        ctx.accounts.market.accrue(now()?)
    }

    pub fn open_obligation(ctx: Context<OpenObligation>) -> Result<()> {
        let market = &ctx.accounts.market;
        let obligation = &mut ctx.accounts.obligation;
        obligation.market = market.key();
        obligation.owner = ctx.accounts.owner.key();
        obligation.shares = 0;
        obligation.borrow_scaled = 0;
        obligation.supply_reward_snapshot = market.supply_reward_index;
        obligation.borrow_reward_snapshot = market.borrow_reward_index;
        obligation.rewards_accrued = 0;
        obligation.bump = ctx.bumps.obligation;
        Ok(())
    }

    pub fn supply(ctx: Context<DepositLiquidity>, amount: u64) -> Result<()> {
        let market = &mut ctx.accounts.market;
        market.accrue(now()?)?;
        let shares = ctx.accounts.obligation.deposit(market, amount)?;

        let cpi_accounts = Transfer {
            from: ctx.accounts.source.to_account_info(),
            to: ctx.accounts.vault.to_account_info(),
            authority: ctx.accounts.owner.to_account_info(),
        };
        let cpi_ctx = CpiContext::new(ctx.accounts.token_program.to_account_info(), cpi_accounts);
        token::transfer(cpi_ctx, amount)?;

        emit!(SupplyEvent { owner: ctx.accounts.owner.key(), amount, shares });
        Ok(())
    }

    /// Burns `shares` and pays out the underlying they are worth.
    pub fn redeem(ctx: Context<WithdrawLiquidity>, shares: u128) -> Result<u64> {
        let market = &mut ctx.accounts.market;
        market.accrue(now()?)?;
        let amount = ctx.accounts.obligation.redeem_shares(market, shares)?;

        let accounts = &ctx.accounts;
        if amount > 0 {
            transfer_from_market(
            &accounts.market,
            &accounts.vault,
            &accounts.destination,
            &accounts.token_program,
            amount,
        )?;
        }
        emit!(RedeemEvent { owner: accounts.owner.key(), amount, shares });
        Ok(amount)
    }

    /// Pays out exactly `amount` of underlying, burning the shares it costs.
    pub fn redeem_underlying(ctx: Context<WithdrawLiquidity>, amount: u64) -> Result<u128> {
        let market = &mut ctx.accounts.market;
        market.accrue(now()?)?;
        let shares = ctx.accounts.obligation.redeem_underlying(market, amount)?;

        let accounts = &ctx.accounts;
        transfer_from_market(
            &accounts.market,
            &accounts.vault,
            &accounts.destination,
            &accounts.token_program,
            amount,
        )?;
        emit!(RedeemEvent { owner: accounts.owner.key(), amount, shares });
        Ok(shares)
    }

    pub fn borrow(ctx: Context<WithdrawLiquidity>, amount: u64) -> Result<()> {
        let market = &mut ctx.accounts.market;
        market.accrue(now()?)?;
        ctx.accounts.obligation.borrow(market, amount)?;

        let accounts = &ctx.accounts;
        transfer_from_market(
            &accounts.market,
            &accounts.vault,
            &accounts.destination,
            &accounts.token_program,
            amount,
        )?;
        emit!(BorrowEvent { owner: accounts.owner.key(), amount });
        Ok(())
    }

    /// Repays up to `amount`; `u64::MAX` repays the whole debt. Returns what was taken.
    pub fn repay(ctx: Context<DepositLiquidity>, amount: u64) -> Result<u64> {
        let market = &mut ctx.accounts.market;
        market.accrue(now()?)?;
        let repaid = ctx.accounts.obligation.repay(market, amount)?;

        if repaid > 0 {
            let cpi_accounts = Transfer {
                from: ctx.accounts.source.to_account_info(),
                to: ctx.accounts.vault.to_account_info(),
                authority: ctx.accounts.owner.to_account_info(),
            };
            let cpi_ctx =
                CpiContext::new(ctx.accounts.token_program.to_account_info(), cpi_accounts);
            token::transfer(cpi_ctx, repaid)?;
        }

        emit!(RepayEvent { owner: ctx.accounts.owner.key(), amount: repaid });
        Ok(repaid)
    }

    pub fn claim_rewards(ctx: Context<ClaimRewards>) -> Result<u64> {
        let market = &mut ctx.accounts.market;
        market.accrue(now()?)?;
        let amount = ctx.accounts.obligation.take_rewards(market)?;

        let accounts = &ctx.accounts;
        if amount > 0 {
            transfer_from_market(
            &accounts.market,
            &accounts.reward_vault,
            &accounts.destination,
            &accounts.token_program,
            amount,
        )?;
        }
        msg!("Rewards claimed: {}", Amount::<RewardToken>::from_u64(amount));
        emit!(RewardsClaimedEvent { owner: accounts.owner.key(), amount });
        Ok(amount)
    }

    pub fn get_account_liquidity(ctx: Context<ViewObligation>) -> Result<LiquidityView> {
        let liquidity = ctx.accounts.obligation.account_liquidity(&ctx.accounts.market);
        Ok(LiquidityView {
            err: liquidity.err,
            liquidity: liquidity.liquidity.raw(),
            shortfall: liquidity.shortfall.raw(),
        })
    }

    pub fn get_claimable_rewards(ctx: Context<ViewObligation>) -> Result<u128> {
        Ok(ctx.accounts.obligation.claimable_rewards(&ctx.accounts.market)?.raw())
    }
}

#[derive(Accounts)]
#[instruction(params: InitializeMarketParams)]
pub struct InitializeMarket<'info> {
    #[account(
        init,
        payer = authority,
        space = Market::SIZE,
        seeds = [MARKET_SEED, base_mint.key().as_ref()],
        bump
    )]
    pub market: Account<'info, Market>,
    #[account(mut)]
    pub authority: Signer<'info>,
    pub base_mint: Account<'info, Mint>,
    pub reward_mint: Account<'info, Mint>,
    #[account(
        init,
        payer = authority,
        seeds = [VAULT_SEED, market.key().as_ref()],
        bump,
        token::mint = base_mint,
        token::authority = market
    )]
    pub vault: Account<'info, TokenAccount>,
    #[account(
        init,
        payer = authority,
        seeds = [REWARD_VAULT_SEED, market.key().as_ref()],
        bump,
        token::mint = reward_mint,
        token::authority = market
    )]
    pub reward_vault: Account<'info, TokenAccount>,
    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(Accounts)]
pub struct MarketAdmin<'info> {
    #[account(mut, has_one = authority)]
    pub market: Account<'info, Market>,
    pub authority: Signer<'info>,
}

#[derive(Accounts)]
pub struct AccrueInterest<'info> {
    #[account(mut)]
    pub market: Account<'info, Market>,
}

#[derive(Accounts)]
pub struct OpenObligation<'info> {
    pub market: Account<'info, Market>,
    #[account(
        init,
        payer = payer,
        space = Obligation::SIZE,
        seeds = [OBLIGATION_SEED, market.key().as_ref(), owner.key().as_ref()],
        bump
    )]
    pub obligation: Account<'info, Obligation>,
    /// CHECK: only recorded as the obligation's owner; must sign later operations
    pub owner: UncheckedAccount<'info>,
    #[account(mut)]
    pub payer: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct DepositLiquidity<'info> {
    #[account(mut)]
    pub market: Account<'info, Market>,
    #[account(
        mut,
        has_one = market,
        has_one = owner,
        seeds = [OBLIGATION_SEED, market.key().as_ref(), owner.key().as_ref()],
        bump = obligation.bump
    )]
    pub obligation: Account<'info, Obligation>,
    pub owner: Signer<'info>,
    #[account(mut, constraint = source.mint == market.base_mint @ LendingError::InvalidMint)]
    pub source: Account<'info, TokenAccount>,
    #[account(mut, address = market.vault)]
    pub vault: Account<'info, TokenAccount>,
    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct WithdrawLiquidity<'info> {
    #[account(mut)]
    pub market: Account<'info, Market>,
    #[account(
        mut,
        has_one = market,
        has_one = owner,
        seeds = [OBLIGATION_SEED, market.key().as_ref(), owner.key().as_ref()],
        bump = obligation.bump
    )]
    pub obligation: Account<'info, Obligation>,
    pub owner: Signer<'info>,
    #[account(mut, constraint = destination.mint == market.base_mint @ LendingError::InvalidMint)]
    pub destination: Account<'info, TokenAccount>,
    #[account(mut, address = market.vault)]
    pub vault: Account<'info, TokenAccount>,
    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct ClaimRewards<'info> {
    #[account(mut)]
    pub market: Account<'info, Market>,
    #[account(mut, has_one = market, has_one = owner)]
    pub obligation: Account<'info, Obligation>,
    pub owner: Signer<'info>,
    #[account(mut, constraint = destination.mint == market.reward_mint @ LendingError::InvalidMint)]
    pub destination: Account<'info, TokenAccount>,
    #[account(mut, address = market.reward_vault)]
    pub reward_vault: Account<'info, TokenAccount>,
    pub token_program: Program<'info, Token>,
}

#[derive(Accounts)]
pub struct ViewObligation<'info> {
    pub market: Account<'info, Market>,
    #[account(has_one = market)]
    pub obligation: Account<'info, Obligation>,
}

#[event]
pub struct SupplyEvent {
    pub owner: Pubkey,
    pub amount: u64,
    pub shares: u128,
}

#[event]
pub struct RedeemEvent {
    pub owner: Pubkey,
    pub amount: u64,
    pub shares: u128,
}

#[event]
pub struct BorrowEvent {
    pub owner: Pubkey,
    pub amount: u64,
}

#[event]
pub struct RepayEvent {
    pub owner: Pubkey,
    pub amount: u64,
}

#[event]
pub struct RewardsClaimedEvent {
    pub owner: Pubkey,
    pub amount: u64,
}

#[error_code]
pub enum LendingError {
    #[msg("Invalid parameters")] InvalidParams,
    #[msg("Market is paused")] Paused,
    #[msg("Invalid amount")] InvalidAmount,
    #[msg("Unauthorized")] Unauthorized,
    #[msg("Insufficient liquidity")] InsufficientLiquidity,
    #[msg("Insufficient collateral")] InsufficientCollateral,
    #[msg("Math overflow")] MathOverflow,
    #[msg("Token account mint does not match the market")] InvalidMint,
}

/// Account liquidity in 18-decimal USD units, as returned by `get_account_liquidity`.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiquidityView {
    pub err: u64,
    pub liquidity: u128,
    pub shortfall: u128,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct InitializeMarketParams {
    pub base_rate_bps: u64,
    pub slope1_bps: u64,
    pub slope2_bps: u64,
    pub kink_bps: u64,
    pub collateral_factor_bps: u64,
    pub reserve_factor_bps: u64,
    pub supply_reward_speed: u64,
    pub borrow_reward_speed: u64,
}

impl InitializeMarketParams {
    pub fn validate(&self) -> Result<()> {
        require!(self.base_rate_bps <= 1_000_000, LendingError::InvalidParams);
        require!(self.slope1_bps <= 1_000_000, LendingError::InvalidParams);
        require!(self.slope2_bps <= 1_000_000, LendingError::InvalidParams);
        require!(self.kink_bps > 0 && self.kink_bps <= 10_000, LendingError::InvalidParams);
        require!(
            self.collateral_factor_bps > 0 && self.collateral_factor_bps < 10_000,
            LendingError::InvalidParams
        );
        require!(self.reserve_factor_bps <= 10_000, LendingError::InvalidParams);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> InitializeMarketParams {
        InitializeMarketParams {
            base_rate_bps: 100,
            slope1_bps: 400,
            slope2_bps: 10_000,
            kink_bps: 8_000,
            collateral_factor_bps: 8_000,
            reserve_factor_bps: 1_000,
            supply_reward_speed: 0,
            borrow_reward_speed: 0,
        }
    }

    #[test]
    fn test_default_params_are_valid() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn test_collateral_factor_bounds() {
        let mut p = params();
        p.collateral_factor_bps = 0;
        assert!(p.validate().is_err());
        p.collateral_factor_bps = 10_000;
        assert!(p.validate().is_err());
        p.collateral_factor_bps = 9_999;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_kink_and_reserve_bounds() {
        let mut p = params();
        p.kink_bps = 0;
        assert!(p.validate().is_err());
        let mut p = params();
        p.reserve_factor_bps = 10_001;
        assert!(p.validate().is_err());
    }
}
