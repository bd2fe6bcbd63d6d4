use anchor_lang::prelude::*;
use anchor_spl::token::{self, TokenAccount, Transfer};
use lending::cpi::accounts::{AccrueInterest, ClaimRewards, DepositLiquidity, WithdrawLiquidity};
use lending::state::{Market, Obligation};

use crate::constants::VAULT_SEED;
use crate::error::LoopError;
use crate::ledger::{LendingMarket, MarketSnapshot, RepayAmount};

/// `LendingMarket` backed by CPIs into the lending program, signed by the
/// vault PDA. State is read straight from the account data after each call,
/// so it always reflects what the market just wrote.
pub struct CpiMarket<'info> {
    pub vault: AccountInfo<'info>,
    pub vault_seed: Pubkey,
    pub vault_bump: u8,
    pub market: AccountInfo<'info>,
    pub obligation: AccountInfo<'info>,
    pub usdc_account: AccountInfo<'info>,
    pub reward_account: AccountInfo<'info>,
    pub market_vault: AccountInfo<'info>,
    pub market_reward_vault: AccountInfo<'info>,
    pub lending_program: AccountInfo<'info>,
    pub token_program: AccountInfo<'info>,
    pub owner_usdc_account: Option<AccountInfo<'info>>,
    pub owner_reward_account: Option<AccountInfo<'info>>,
}

fn token_amount(account: &AccountInfo) -> Result<u64> {
    let data = account.try_borrow_data()?;
    Ok(TokenAccount::try_deserialize(&mut &data[..])?.amount)
}

impl<'info> CpiMarket<'info> {
    fn with_signer<T>(&self, f: impl FnOnce(&[&[&[u8]]]) -> Result<T>) -> Result<T> {
        let bump = [self.vault_bump];
        let seeds: &[&[u8]] = &[VAULT_SEED, self.vault_seed.as_ref(), &bump];
        f(&[seeds])
    }

    fn deposit_accounts(&self) -> DepositLiquidity<'info> {
        DepositLiquidity {
            market: self.market.clone(),
            obligation: self.obligation.clone(),
            owner: self.vault.clone(),
            source: self.usdc_account.clone(),
            vault: self.market_vault.clone(),
            token_program: self.token_program.clone(),
        }
    }

    fn withdraw_accounts(&self) -> WithdrawLiquidity<'info> {
        WithdrawLiquidity {
            market: self.market.clone(),
            obligation: self.obligation.clone(),
            owner: self.vault.clone(),
            destination: self.usdc_account.clone(),
            vault: self.market_vault.clone(),
            token_program: self.token_program.clone(),
        }
    }

    fn transfer_out(
        &self,
        from: &AccountInfo<'info>,
        to: &AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.with_signer(|signer| {
            let cpi_accounts = Transfer {
                from: from.clone(),
                to: to.clone(),
                authority: self.vault.clone(),
            };
            token::transfer(
                CpiContext::new_with_signer(self.token_program.clone(), cpi_accounts, signer),
                amount,
            )
        })
    }
}

impl<'info> LendingMarket for CpiMarket<'info> {
    fn accrue_interest(&mut self) -> Result<()> {
        let cpi_accounts = AccrueInterest { market: self.market.clone() };
        lending::cpi::accrue_interest(CpiContext::new(self.lending_program.clone(), cpi_accounts))
    }

    fn load(&self) -> Result<MarketSnapshot> {
        let market = {
            let data = self.market.try_borrow_data()?;
            Market::try_deserialize(&mut &data[..])?
        };
        let obligation = {
            let data = self.obligation.try_borrow_data()?;
            Obligation::try_deserialize(&mut &data[..])?
        };
        require_keys_eq!(obligation.market, self.market.key(), LoopError::InvalidMarket);
        Ok(MarketSnapshot { market, obligation })
    }

    fn idle_usdc(&self) -> Result<u64> {
        token_amount(&self.usdc_account)
    }

    fn idle_rewards(&self) -> Result<u64> {
        token_amount(&self.reward_account)
    }

    fn supply(&mut self, amount: u64) -> Result<()> {
        self.with_signer(|signer| {
            let program = self.lending_program.clone();
            let ctx = CpiContext::new_with_signer(program, self.deposit_accounts(), signer);
            lending::cpi::supply(ctx, amount)
        })
    }

    fn borrow(&mut self, amount: u64) -> Result<()> {
        self.with_signer(|signer| {
            let program = self.lending_program.clone();
            let ctx = CpiContext::new_with_signer(program, self.withdraw_accounts(), signer);
            lending::cpi::borrow(ctx, amount)
        })
    }

    fn repay(&mut self, amount: RepayAmount) -> Result<u64> {
        self.with_signer(|signer| {
            let program = self.lending_program.clone();
            let ctx = CpiContext::new_with_signer(program, self.deposit_accounts(), signer);
            Ok(lending::cpi::repay(ctx, amount.to_wire())?.get())
        })
    }

    fn redeem(&mut self, shares: u128) -> Result<u64> {
        self.with_signer(|signer| {
            let program = self.lending_program.clone();
            let ctx = CpiContext::new_with_signer(program, self.withdraw_accounts(), signer);
            Ok(lending::cpi::redeem(ctx, shares)?.get())
        })
    }

    fn redeem_underlying(&mut self, amount: u64) -> Result<()> {
        self.with_signer(|signer| {
            let program = self.lending_program.clone();
            let ctx = CpiContext::new_with_signer(program, self.withdraw_accounts(), signer);
            lending::cpi::redeem_underlying(ctx, amount)?;
            Ok(())
        })
    }

    fn claim_rewards(&mut self) -> Result<u64> {
        self.with_signer(|signer| {
            let cpi_accounts = ClaimRewards {
                market: self.market.clone(),
                obligation: self.obligation.clone(),
                owner: self.vault.clone(),
                destination: self.reward_account.clone(),
                reward_vault: self.market_reward_vault.clone(),
                token_program: self.token_program.clone(),
            };
            let program = self.lending_program.clone();
            let ctx = CpiContext::new_with_signer(program, cpi_accounts, signer);
            Ok(lending::cpi::claim_rewards(ctx)?.get())
        })
    }

    fn transfer_usdc_to_owner(&mut self, amount: u64) -> Result<()> {
        let owner_account = self
            .owner_usdc_account
            .clone()
            .ok_or(LoopError::MissingOwnerAccount)?;
        self.transfer_out(&self.usdc_account, &owner_account, amount)
    }

    fn transfer_rewards_to_owner(&mut self, amount: u64) -> Result<()> {
        let owner_account = self
            .owner_reward_account
            .clone()
            .ok_or(LoopError::MissingOwnerAccount)?;
        self.transfer_out(&self.reward_account, &owner_account, amount)
    }
}
