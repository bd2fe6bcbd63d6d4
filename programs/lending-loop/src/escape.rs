use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_lang::solana_program::program::{get_return_data, invoke_signed};

use crate::constants::VAULT_SEED;
use crate::error::LoopError;
use crate::state::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeMode {
    /// The callee acts with the vault's signature on its own state.
    Call,
    /// As `Call`, and the vault takes over any `Roles` record the callee
    /// returns. A delegated callee can therefore replace owner and admin.
    DelegateCall,
}

/// Forwards `data` to `target_program` with the remaining accounts as its
/// account list, signed by the vault PDA. Returns the callee's return data.
pub fn emergency_invoke<'info>(
    ctx: Context<'_, '_, '_, 'info, EmergencyInvoke<'info>>,
    mode: InvokeMode,
    data: Vec<u8>,
) -> Result<Vec<u8>> {
    let target = ctx.accounts.target_program.to_account_info();
    let vault_info = ctx.accounts.vault.to_account_info();
    let ix = forwarded_instruction(
        &ctx.accounts.vault.roles,
        &ctx.accounts.caller.key(),
        &target,
        vault_info.key,
        ctx.remaining_accounts,
        data,
    )?;

    let mut infos = vec![target.clone(), vault_info];
    infos.extend_from_slice(ctx.remaining_accounts);

    let seed = ctx.accounts.vault.seed;
    let bump = ctx.accounts.vault.bump;
    let seeds = &[VAULT_SEED, seed.as_ref(), &[bump]];
    invoke_signed(&ix, &infos, &[&seeds[..]])?;

    let returned = returned_by(&target.key(), get_return_data());
    let adopted = adopt_roles(mode, &mut ctx.accounts.vault.roles, &returned);

    msg!(
        "Emergency {:?} to {}: {} bytes returned",
        mode,
        target.key(),
        returned.len()
    );
    emit!(EmergencyInvoked {
        vault: ctx.accounts.vault.key(),
        target: target.key(),
        delegate: mode == InvokeMode::DelegateCall,
        roles_adopted: adopted,
    });
    Ok(returned)
}

/// Checks the caller's role and the target, then builds the instruction the
/// vault forwards.
pub fn forwarded_instruction(
    roles: &Roles,
    caller: &Pubkey,
    target: &AccountInfo,
    vault: &Pubkey,
    accounts: &[AccountInfo],
    data: Vec<u8>,
) -> Result<Instruction> {
    roles.authorize(caller)?;
    require!(target.executable, LoopError::InvalidTarget);
    require_keys_neq!(*target.key, crate::ID, LoopError::InvalidTarget);
    Ok(Instruction {
        program_id: *target.key,
        accounts: forwarded_metas(vault, accounts),
        data,
    })
}

/// Account metas for the forwarded instruction; the vault is always a signer.
pub fn forwarded_metas(vault: &Pubkey, accounts: &[AccountInfo]) -> Vec<AccountMeta> {
    accounts
        .iter()
        .map(|a| {
            let is_signer = a.is_signer || a.key == vault;
            if a.is_writable {
                AccountMeta::new(*a.key, is_signer)
            } else {
                AccountMeta::new_readonly(*a.key, is_signer)
            }
        })
        .collect()
}

/// Return data is only trusted when the target itself set it.
fn returned_by(target: &Pubkey, return_data: Option<(Pubkey, Vec<u8>)>) -> Vec<u8> {
    match return_data {
        Some((program_id, data)) if program_id == *target => data,
        _ => Vec::new(),
    }
}

/// Applies a returned `Roles` record in delegate mode. Returns whether the
/// vault's roles were replaced.
pub fn adopt_roles(mode: InvokeMode, roles: &mut Roles, returned: &[u8]) -> bool {
    if mode != InvokeMode::DelegateCall {
        return false;
    }
    match Roles::try_from_slice(returned) {
        Ok(new_roles) => {
            *roles = new_roles;
            true
        }
        Err(_) => false,
    }
}

#[derive(Accounts)]
pub struct EmergencyInvoke<'info> {
    pub caller: Signer<'info>,
    #[account(
        mut,
        seeds = [VAULT_SEED, vault.seed.as_ref()],
        bump = vault.bump
    )]
    pub vault: Account<'info, LoopVault>,
    /// CHECK: arbitrary program; must be executable and not this program
    pub target_program: UncheckedAccount<'info>,
}

#[event]
pub struct EmergencyInvoked {
    pub vault: Pubkey,
    pub target: Pubkey,
    pub delegate: bool,
    pub roles_adopted: bool,
}
