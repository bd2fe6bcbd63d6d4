pub const VAULT_SEED: &[u8] = b"loop_vault";
pub const USDC_ACCOUNT_SEED: &[u8] = b"loop_usdc";
pub const REWARD_ACCOUNT_SEED: &[u8] = b"loop_reward";

/// 100_000 = 100% of current account liquidity.
pub const PERCENT_PRECISION: u64 = 100_000;

/// Upper bound on loop iterations in one instruction, whatever the caller asks for.
pub const MAX_ITERATIONS_PER_CALL: u32 = 32;

pub const BPS_SCALE: u64 = 10_000;

/// Account liquidity (USDC base units) entry leaves untouched, so the unwind
/// always has supply it can free.
pub const MIN_RESIDUAL_LIQUIDITY: u64 = 1_000;
