//! Fixed-point token amounts tagged with the asset they are denominated in.
//!
//! Every amount carries its decimal exponent in the type, so adding USDC to a
//! reward balance does not compile. Moving between assets goes through
//! [`Amount::rescale`], which is exact when scaling up and floors when scaling
//! down.

use std::fmt;
use std::marker::PhantomData;

use anchor_lang::prelude::*;

use crate::LendingError;

pub trait Asset {
    const DECIMALS: u8;
    const SYMBOL: &'static str;
}

/// The market's single collateral and borrow asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Usdc;

impl Asset for Usdc {
    const DECIMALS: u8 = 6;
    const SYMBOL: &'static str = "USDC";
}

/// Token emitted by the market to suppliers and borrowers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct RewardToken;

impl Asset for RewardToken {
    const DECIMALS: u8 = 18;
    const SYMBOL: &'static str = "RWD";
}

/// Unit of account for collateral and debt valuation (USDC priced at 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct UsdValue;

impl Asset for UsdValue {
    const DECIMALS: u8 = 18;
    const SYMBOL: &'static str = "USD";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount<A> {
    raw: u128,
    asset: PhantomData<A>,
}

fn pow10(exp: u8) -> Result<u128> {
    10u128
        .checked_pow(exp as u32)
        .ok_or_else(|| error!(LendingError::MathOverflow))
}

impl<A: Asset> Amount<A> {
    pub const ZERO: Self = Self::from_raw(0);

    /// Wraps a value already expressed in base units.
    pub const fn from_raw(raw: u128) -> Self {
        Self { raw, asset: PhantomData }
    }

    pub fn from_u64(raw: u64) -> Self {
        Self::from_raw(raw as u128)
    }

    /// `whole` tokens, i.e. `whole * 10^DECIMALS` base units.
    pub fn raw(self) -> u128 {
        self.raw
    }

    pub fn is_zero(self) -> bool {
        self.raw == 0
    }

    /// Base units as an SPL token amount.
    pub fn to_u64(self) -> Result<u64> {
        u64::try_from(self.raw).map_err(|_| error!(LendingError::MathOverflow))
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.raw
            .checked_add(other.raw)
            .map(Self::from_raw)
            .ok_or_else(|| error!(LendingError::MathOverflow))
    }

    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.raw
            .checked_sub(other.raw)
            .map(Self::from_raw)
            .ok_or_else(|| error!(LendingError::MathOverflow))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self::from_raw(self.raw.saturating_sub(other.raw))
    }

    pub fn min(self, other: Self) -> Self {
        if self.raw <= other.raw {
            self
        } else {
            other
        }
    }

    /// `self * bps / 10_000`, rounded down.
    pub fn mul_bps(self, bps: u64) -> Result<Self> {
        self.raw
            .checked_mul(bps as u128)
            .map(|v| v / 10_000)
            .map(Self::from_raw)
            .ok_or_else(|| error!(LendingError::MathOverflow))
    }

    /// Re-expresses the amount with `B`'s decimal exponent. Scaling down floors.
    pub fn rescale<B: Asset>(self) -> Result<Amount<B>> {
        let raw = if B::DECIMALS >= A::DECIMALS {
            self.raw
                .checked_mul(pow10(B::DECIMALS - A::DECIMALS)?)
                .ok_or_else(|| error!(LendingError::MathOverflow))?
        } else {
            self.raw / pow10(A::DECIMALS - B::DECIMALS)?
        };
        Ok(Amount::from_raw(raw))
    }
}

impl<A: Asset> fmt::Display for Amount<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = 10u128.pow(A::DECIMALS as u32);
        write!(
            f,
            "{}.{:0width$} {}",
            self.raw / unit,
            self.raw % unit,
            A::SYMBOL,
            width = A::DECIMALS as usize
        )
    }
}
