use anchor_lang::prelude::*;

use crate::error::LoopError;

#[account]
pub struct LoopVault {
    pub seed: Pubkey, // creating owner; PDA seed, never changes
    pub roles: Roles,
    pub market: Pubkey,
    pub obligation: Pubkey,
    pub usdc_account: Pubkey,
    pub reward_account: Pubkey,
    pub bump: u8,
}

impl LoopVault {
    pub const SIZE: usize = 8 + // discriminator
        32 + // seed
        Roles::SIZE +
        32 + // market
        32 + // obligation
        32 + // usdc_account
        32 + // reward_account
        1;   // bump
}

/// Who may drive the vault. `owner` is fixed at initialization, `admin`
/// starts equal to it and can be replaced by the owner.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roles {
    pub owner: Pubkey,
    pub admin: Pubkey,
}

/// Proof that the caller passed `Roles::authorize`. Controllers take it by
/// reference so they cannot be reached without the check.
#[derive(Debug)]
pub struct Privileged {
    _private: (),
}

impl Roles {
    pub const SIZE: usize = 32 + 32;

    pub fn new(owner: Pubkey) -> Self {
        Self { owner, admin: owner }
    }

    pub fn authorize(&self, caller: &Pubkey) -> Result<Privileged> {
        require!(
            *caller == self.owner || *caller == self.admin,
            LoopError::Unauthorized
        );
        Ok(Privileged { _private: () })
    }

    /// Runs `op` on `target` with the caller's capability. Nothing runs when
    /// the caller holds neither role.
    pub fn run_as<M, T>(
        &self,
        caller: &Pubkey,
        target: &mut M,
        op: impl FnOnce(&mut M, &Privileged) -> Result<T>,
    ) -> Result<T> {
        let auth = self.authorize(caller)?;
        op(target, &auth)
    }

    /// Owner only. Returns the previous admin.
    pub fn set_admin(&mut self, caller: &Pubkey, new_admin: Pubkey) -> Result<Pubkey> {
        require_keys_eq!(*caller, self.owner, LoopError::Unauthorized);
        Ok(std::mem::replace(&mut self.admin, new_admin))
    }
}

#[cfg(test)]
pub(crate) fn privileged_for_tests() -> Privileged {
    Privileged { _private: () }
}
