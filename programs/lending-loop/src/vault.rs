use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};
use lending::cpi::accounts::OpenObligation;
use lending::program::Lending;
use lending::state::Market;

use crate::constants::*;
use crate::state::*;

/// Creates the vault PDA, its USDC and reward token accounts, and the
/// vault's obligation in the market. The signing `owner` becomes both owner
/// and admin.
pub fn initialize_vault(ctx: Context<InitializeVault>) -> Result<()> {
    let owner = ctx.accounts.owner.key();
    let cpi_accounts = OpenObligation {
        market: ctx.accounts.market.to_account_info(),
        obligation: ctx.accounts.obligation.to_account_info(),
        owner: ctx.accounts.vault.to_account_info(),
        payer: ctx.accounts.payer.to_account_info(),
        system_program: ctx.accounts.system_program.to_account_info(),
    };
    lending::cpi::open_obligation(CpiContext::new(
        ctx.accounts.lending_program.to_account_info(),
        cpi_accounts,
    ))?;

    let vault = &mut ctx.accounts.vault;
    vault.seed = owner;
    vault.roles = Roles::new(owner);
    vault.market = ctx.accounts.market.key();
    vault.obligation = ctx.accounts.obligation.key();
    vault.usdc_account = ctx.accounts.usdc_account.key();
    vault.reward_account = ctx.accounts.reward_account.key();
    vault.bump = ctx.bumps.vault;

    msg!("Loop vault {} initialized for owner {}", vault.key(), owner);
    Ok(())
}

pub fn set_admin(ctx: Context<SetAdmin>, new_admin: Pubkey) -> Result<()> {
    let vault = &mut ctx.accounts.vault;
    let previous = vault.roles.set_admin(&ctx.accounts.caller.key(), new_admin)?;
    emit!(AdminChanged {
        vault: vault.key(),
        previous,
        admin: new_admin,
    });
    Ok(())
}

#[derive(Accounts)]
pub struct InitializeVault<'info> {
    #[account(
        init,
        payer = payer,
        space = LoopVault::SIZE,
        seeds = [VAULT_SEED, owner.key().as_ref()],
        bump
    )]
    pub vault: Account<'info, LoopVault>,
    /// Only the owner can claim the vault address derived from its key.
    pub owner: Signer<'info>,
    #[account(mut)]
    pub payer: Signer<'info>,
    pub market: Account<'info, Market>,
    /// CHECK: created by the lending program, which validates its address
    #[account(mut)]
    pub obligation: UncheckedAccount<'info>,
    #[account(address = market.base_mint)]
    pub usdc_mint: Account<'info, Mint>,
    #[account(address = market.reward_mint)]
    pub reward_mint: Account<'info, Mint>,
    #[account(
        init,
        payer = payer,
        seeds = [USDC_ACCOUNT_SEED, vault.key().as_ref()],
        bump,
        token::mint = usdc_mint,
        token::authority = vault
    )]
    pub usdc_account: Account<'info, TokenAccount>,
    #[account(
        init,
        payer = payer,
        seeds = [REWARD_ACCOUNT_SEED, vault.key().as_ref()],
        bump,
        token::mint = reward_mint,
        token::authority = vault
    )]
    pub reward_account: Account<'info, TokenAccount>,
    pub lending_program: Program<'info, Lending>,
    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    pub rent: Sysvar<'info, Rent>,
}

#[derive(Accounts)]
pub struct SetAdmin<'info> {
    pub caller: Signer<'info>,
    #[account(
        mut,
        seeds = [VAULT_SEED, vault.seed.as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, LoopVault>,
}

#[derive(Accounts)]
pub struct ReadVault<'info> {
    pub vault: Account<'info, LoopVault>,
}

#[event]
pub struct AdminChanged {
    pub vault: Pubkey,
    pub previous: Pubkey,
    pub admin: Pubkey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::ToAccountMetas;

    #[test]
    fn test_vault_creation_needs_owner_signature() {
        let owner = Pubkey::new_unique();
        let (vault, _) = Pubkey::find_program_address(&[VAULT_SEED, owner.as_ref()], &crate::ID);
        let accounts = crate::accounts::InitializeVault {
            vault,
            owner,
            payer: Pubkey::new_unique(),
            market: Pubkey::new_unique(),
            obligation: Pubkey::new_unique(),
            usdc_mint: Pubkey::new_unique(),
            reward_mint: Pubkey::new_unique(),
            usdc_account: Pubkey::new_unique(),
            reward_account: Pubkey::new_unique(),
            lending_program: lending::ID,
            token_program: anchor_spl::token::ID,
            system_program: anchor_lang::system_program::ID,
            rent: anchor_lang::solana_program::sysvar::rent::ID,
        };

        let metas = accounts.to_account_metas(None);

        let owner_meta = metas.iter().find(|m| m.pubkey == owner).unwrap();
        assert!(owner_meta.is_signer);
        assert!(!owner_meta.is_writable);
    }
}
