//! Discretized-bin liquidity math.
//!
//! The output reserve is laid out in bins of `bin_liquidity` output units.
//! The active bin trades at the reserve ratio; each further bin crossed trades
//! `bin_step_bps` worse than the one before it.

use super::{apply_fee, check_swap_inputs, fee_rate, SwapResult, FEE_DENOMINATOR_BPS};
use crate::error::{Result, RoutingError};

/// Upper bound on bins walked by a single swap
pub const MAX_BINS_CROSSED: usize = 4_096;

pub fn active_bin_price(reserve_in: f64, reserve_out: f64) -> f64 {
    if reserve_in <= 0.0 {
        return 0.0;
    }
    reserve_out / reserve_in
}

/// Price of bin `index` counted from the active bin
pub fn bin_price(active_price: f64, bin_step_bps: u16, index: usize) -> f64 {
    let step = bin_step_bps as f64 / FEE_DENOMINATOR_BPS;
    active_price * (1.0 - step).powi(index as i32)
}

pub fn swap_output(
    amount_in: f64,
    reserve_in: f64,
    reserve_out: f64,
    fee_bps: u16,
    bin_step_bps: u16,
    bin_liquidity: f64,
) -> Result<SwapResult> {
    check_swap_inputs(amount_in, reserve_in, reserve_out)?;
    if !(bin_liquidity > 0.0) || !bin_liquidity.is_finite() {
        return Err(RoutingError::InsufficientLiquidity(format!(
            "bin liquidity must be positive, got {}",
            bin_liquidity
        )));
    }
    if fee_rate(bin_step_bps) >= 1.0 {
        return Err(RoutingError::InsufficientLiquidity(format!(
            "bin step {} bps leaves no tradable price",
            bin_step_bps
        )));
    }

    let (fee_amount, mut remaining) = apply_fee(amount_in, fee_bps);
    let active_price = active_bin_price(reserve_in, reserve_out);

    let mut amount_out = 0.0;
    let mut consumed = 0.0;
    let mut index = 0;

    while remaining > 0.0 {
        let capacity = bin_liquidity.min(reserve_out - consumed);
        if capacity <= 0.0 {
            break;
        }
        if index >= MAX_BINS_CROSSED {
            return Err(RoutingError::InsufficientLiquidity(format!(
                "swap of {} crosses more than {} bins",
                amount_in, MAX_BINS_CROSSED
            )));
        }

        let price = bin_price(active_price, bin_step_bps, index);
        let input_to_drain = capacity / price;
        if remaining >= input_to_drain {
            amount_out += capacity;
            consumed += capacity;
            remaining -= input_to_drain;
            index += 1;
        } else {
            amount_out += remaining * price;
            remaining = 0.0;
        }
    }

    if remaining > 0.0 || !(amount_out > 0.0) {
        return Err(RoutingError::InsufficientLiquidity(format!(
            "all {} bins drained before filling {}",
            index, amount_in
        )));
    }

    Ok(SwapResult {
        amount_out,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_trade_inside_active_bin_has_no_impact() {
        let result = swap_output(10.0, 1_000.0, 2_000.0, 0, 25, 100.0).unwrap();
        assert_approx_eq!(result.amount_out, 20.0);
    }

    #[test]
    fn test_crossing_bins_worsens_price() {
        // 100 out per bin at price 2.0: first 50 in fill bin 0 exactly
        let result = swap_output(100.0, 1_000.0, 2_000.0, 0, 100, 100.0).unwrap();
        let second_bin_price = 2.0 * 0.99;
        assert_approx_eq!(result.amount_out, 100.0 + 50.0 * second_bin_price, 1e-9);
        assert!(result.amount_out < 200.0);
    }

    #[test]
    fn test_draining_all_bins_fails() {
        let err = swap_output(5_000.0, 1_000.0, 200.0, 0, 10, 100.0).unwrap_err();
        assert!(matches!(err, RoutingError::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_fee_charged_on_input() {
        let result = swap_output(10.0, 1_000.0, 1_000.0, 100, 10, 500.0).unwrap();
        assert_approx_eq!(result.fee_amount, 0.1);
        assert_approx_eq!(result.amount_out, 9.9);
    }
}
