//! Pool pricing math.
//!
//! Every model takes the input amount before fees, charges the fee on the
//! input side, and returns the gross output together with the fee taken.
//!
//! - `constant_product`: x * y = k pools
//! - `bins`: liquidity split into discrete fixed-price bins
//! - `stable`: two-coin StableSwap invariant solved by Newton iteration

pub mod bins;
pub mod constant_product;
pub mod stable;

use crate::error::{Result, RoutingError};

pub const FEE_DENOMINATOR_BPS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapResult {
    pub amount_out: f64,
    pub fee_amount: f64,
}

pub fn fee_rate(fee_bps: u16) -> f64 {
    fee_bps as f64 / FEE_DENOMINATOR_BPS
}

/// Splits `amount_in` into (fee, amount after fee)
pub fn apply_fee(amount_in: f64, fee_bps: u16) -> (f64, f64) {
    let fee = amount_in * fee_rate(fee_bps);
    (fee, amount_in - fee)
}

pub(crate) fn check_swap_inputs(amount_in: f64, reserve_in: f64, reserve_out: f64) -> Result<()> {
    if !amount_in.is_finite() || amount_in <= 0.0 {
        return Err(RoutingError::InvalidAmount(format!(
            "input amount must be positive, got {}",
            amount_in
        )));
    }
    if !(reserve_in > 0.0 && reserve_out > 0.0) || !reserve_in.is_finite() || !reserve_out.is_finite()
    {
        return Err(RoutingError::InsufficientLiquidity(format!(
            "pool reserves unusable (in: {}, out: {})",
            reserve_in, reserve_out
        )));
    }
    Ok(())
}
