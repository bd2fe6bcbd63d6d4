// Summary: self-leveraging USDC position on the lending market. The vault PDA
// supplies its USDC, borrows against it and re-supplies the loan, repeating to
// amplify the market's reward emission; exit walks the same loop backwards.
// Owner and admin drive every operation; the emergency entry points forward
// arbitrary CPIs signed by the vault.

use anchor_lang::prelude::*;

pub mod adapter;
pub mod budget;
pub mod constants;
pub mod error;
pub mod escape;
pub mod ledger;
pub mod looping;
pub mod position;
pub mod primitives;
pub mod state;
pub mod unwind;
pub mod vault;

#[cfg(test)]
mod sim;

use escape::*;
use ledger::AccountLiquidity;
use position::*;
use vault::*;

pub use error::LoopError;

declare_id!("DNV9nTmTztTaufsdKQd3WW1vfaKHMB5uiGzWRXD3AgYd");

#[program]
pub mod lending_loop {
    use super::*;

    /// The signing owner becomes owner and admin of the new vault.
    pub fn initialize_vault(ctx: Context<InitializeVault>) -> Result<()> {
        vault::initialize_vault(ctx)
    }

    /// Owner only.
    pub fn set_admin(ctx: Context<SetAdmin>, new_admin: Pubkey) -> Result<()> {
        vault::set_admin(ctx, new_admin)
    }

    pub fn supply(ctx: Context<ManagePosition>, amount: u64) -> Result<()> {
        position::supply(ctx, amount)
    }

    pub fn borrow(ctx: Context<ManagePosition>, amount: u64) -> Result<()> {
        position::borrow(ctx, amount)
    }

    pub fn repay(ctx: Context<ManagePosition>, amount: u64) -> Result<u64> {
        position::repay(ctx, amount)
    }

    pub fn redeem(ctx: Context<ManagePosition>, shares: u128) -> Result<u64> {
        position::redeem(ctx, shares)
    }

    pub fn redeem_underlying(ctx: Context<ManagePosition>, amount: u64) -> Result<()> {
        position::redeem_underlying(ctx, amount)
    }

    pub fn borrow_and_supply(ctx: Context<ManagePosition>, percent: u64) -> Result<u64> {
        position::borrow_and_supply(ctx, percent)
    }

    pub fn redeem_and_repay(ctx: Context<ManagePosition>, percent: u64) -> Result<bool> {
        position::redeem_and_repay(ctx, percent)
    }

    /// Supplies idle USDC, then runs up to `loop_count` borrow/supply steps of
    /// `percent` (1..=100_000) of account liquidity.
    pub fn enter_position(
        ctx: Context<ManagePosition>,
        loop_count: u32,
        percent: u64,
    ) -> Result<()> {
        position::enter_position(ctx, loop_count, percent)
    }

    /// Runs up to `max_iterations` redeem/repay steps; call again while the
    /// `PositionExited` event reports `complete == false`. Fails with
    /// `ExitStalled` when the position cannot be unwound any further.
    pub fn exit_position(
        ctx: Context<ManagePosition>,
        max_iterations: u32,
        percent: u64,
    ) -> Result<u64> {
        position::exit_position(ctx, max_iterations, percent)
    }

    pub fn claim_rewards_to_owner(ctx: Context<PayoutToOwner>) -> Result<u64> {
        position::claim_rewards_to_owner(ctx)
    }

    pub fn withdraw_all_usdc_to_owner(ctx: Context<PayoutToOwner>) -> Result<u64> {
        position::withdraw_all_usdc_to_owner(ctx)
    }

    pub fn emergency_function_call<'info>(
        ctx: Context<'_, '_, '_, 'info, EmergencyInvoke<'info>>,
        data: Vec<u8>,
    ) -> Result<Vec<u8>> {
        escape::emergency_invoke(ctx, InvokeMode::Call, data)
    }

    pub fn emergency_function_delegate_call<'info>(
        ctx: Context<'_, '_, '_, 'info, EmergencyInvoke<'info>>,
        data: Vec<u8>,
    ) -> Result<Vec<u8>> {
        escape::emergency_invoke(ctx, InvokeMode::DelegateCall, data)
    }

    pub fn get_owner(ctx: Context<ReadVault>) -> Result<Pubkey> {
        Ok(ctx.accounts.vault.roles.owner)
    }

    pub fn get_admin(ctx: Context<ReadVault>) -> Result<Pubkey> {
        Ok(ctx.accounts.vault.roles.admin)
    }

    pub fn get_balance_usdc(ctx: Context<ManagePosition>) -> Result<u64> {
        position::get_balance_usdc(ctx)
    }

    pub fn get_balance_reward(ctx: Context<ManagePosition>) -> Result<u64> {
        position::get_balance_reward(ctx)
    }

    pub fn get_claimable_rewards(ctx: Context<ManagePosition>) -> Result<u128> {
        position::get_claimable_rewards(ctx)
    }

    pub fn get_total_supplied(ctx: Context<ManagePosition>) -> Result<u64> {
        position::get_total_supplied(ctx)
    }

    pub fn get_total_supplied_accrued(ctx: Context<ManagePosition>) -> Result<u64> {
        position::get_total_supplied_accrued(ctx)
    }

    pub fn get_total_borrowed(ctx: Context<ManagePosition>) -> Result<u64> {
        position::get_total_borrowed(ctx)
    }

    pub fn get_total_borrowed_accrued(ctx: Context<ManagePosition>) -> Result<u64> {
        position::get_total_borrowed_accrued(ctx)
    }

    pub fn get_account_liquidity(ctx: Context<ManagePosition>) -> Result<AccountLiquidity> {
        position::get_account_liquidity(ctx)
    }

    pub fn get_account_liquidity_accrued(ctx: Context<ManagePosition>) -> Result<AccountLiquidity> {
        position::get_account_liquidity_accrued(ctx)
    }
}
