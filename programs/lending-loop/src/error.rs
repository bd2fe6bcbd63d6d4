use anchor_lang::prelude::*;

#[error_code]
pub enum LoopError {
    #[msg("Caller is neither owner nor admin")] Unauthorized,
    #[msg("Loop count must be at least 1")] InvalidLoopCount,
    #[msg("Percent must be in 1..=100000")] InvalidPercent,
    #[msg("Invalid amount")] InvalidAmount,
    #[msg("Math overflow")] MathOverflow,
    #[msg("Account does not belong to this vault's market")] InvalidMarket,
    #[msg("Invalid emergency call target")] InvalidTarget,
    #[msg("Owner token account missing or mismatched")] MissingOwnerAccount,
    #[msg("Position has no liquidity or idle USDC to unwind with")] ExitStalled,
}
