//! Constant product (x * y = k) pool math with the fee charged on input.

use super::{apply_fee, check_swap_inputs, SwapResult};
use crate::error::{Result, RoutingError};

/// Output for swapping `amount_in` into a constant product pool
pub fn swap_output(
    amount_in: f64,
    reserve_in: f64,
    reserve_out: f64,
    fee_bps: u16,
) -> Result<SwapResult> {
    check_swap_inputs(amount_in, reserve_in, reserve_out)?;

    let (fee_amount, input_after_fee) = apply_fee(amount_in, fee_bps);

    // dy = y * dx / (x + dx)
    let amount_out = reserve_out * input_after_fee / (reserve_in + input_after_fee);
    if !(amount_out > 0.0) || amount_out >= reserve_out {
        return Err(RoutingError::InsufficientLiquidity(format!(
            "constant product pool cannot fill {} (out reserve {})",
            amount_in, reserve_out
        )));
    }

    Ok(SwapResult {
        amount_out,
        fee_amount,
    })
}

/// Marginal out/in price before any trade, fee excluded
pub fn spot_price(reserve_in: f64, reserve_out: f64) -> f64 {
    if reserve_in <= 0.0 {
        return 0.0;
    }
    reserve_out / reserve_in
}
