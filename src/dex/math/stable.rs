//! Two-coin StableSwap math.
//!
//! Invariant: `A·n^n·(x + y) + D = A·n^n·D + D^3 / (n^n·x·y)` with n = 2.
//! Both `D` and the post-trade balance are solved with Newton iteration.

use super::{apply_fee, check_swap_inputs, SwapResult};
use crate::error::{Result, RoutingError};

const N_COINS: f64 = 2.0;
const MAX_ITERATIONS: usize = 255;
const CONVERGENCE: f64 = 1e-12;

fn ann(amplification: u64) -> f64 {
    amplification as f64 * N_COINS * N_COINS
}

/// Invariant `D` for balances `x`, `y`
pub fn compute_d(x: f64, y: f64, amplification: u64) -> Result<f64> {
    if !(x > 0.0 && y > 0.0) {
        return Err(RoutingError::InsufficientLiquidity(
            "stable pool has an empty side".to_string(),
        ));
    }
    let ann = ann(amplification);
    let sum = x + y;
    let mut d = sum;

    for _ in 0..MAX_ITERATIONS {
        let d_p = d * d * d / (N_COINS * N_COINS * x * y);
        let previous = d;
        d = (ann * sum + N_COINS * d_p) * d / ((ann - 1.0) * d + (N_COINS + 1.0) * d_p);
        if (d - previous).abs() <= CONVERGENCE * d.max(1.0) {
            return Ok(d);
        }
    }

    Err(RoutingError::InsufficientLiquidity(format!(
        "stable invariant did not converge for balances {} / {}",
        x, y
    )))
}

/// Balance of the other coin once this side holds `x_new`, keeping `d` fixed
pub fn compute_y(x_new: f64, d: f64, amplification: u64) -> Result<f64> {
    let ann = ann(amplification);
    let c = d * d * d / (N_COINS * N_COINS * x_new * ann);
    let b = x_new + d / ann;
    let mut y = d;

    for _ in 0..MAX_ITERATIONS {
        let previous = y;
        y = (y * y + c) / (2.0 * y + b - d);
        if (y - previous).abs() <= CONVERGENCE * y.max(1.0) {
            return Ok(y);
        }
    }

    Err(RoutingError::InsufficientLiquidity(format!(
        "stable balance did not converge for input balance {}",
        x_new
    )))
}

pub fn swap_output(
    amount_in: f64,
    reserve_in: f64,
    reserve_out: f64,
    fee_bps: u16,
    amplification: u64,
) -> Result<SwapResult> {
    check_swap_inputs(amount_in, reserve_in, reserve_out)?;
    if amplification == 0 {
        return Err(RoutingError::InsufficientLiquidity(
            "stable pool amplification must be at least 1".to_string(),
        ));
    }

    let (fee_amount, input_after_fee) = apply_fee(amount_in, fee_bps);
    let d = compute_d(reserve_in, reserve_out, amplification)?;
    let y_new = compute_y(reserve_in + input_after_fee, d, amplification)?;
    let amount_out = reserve_out - y_new;

    if !(amount_out > 0.0) || amount_out >= reserve_out {
        return Err(RoutingError::InsufficientLiquidity(format!(
            "stable pool cannot fill {} (out reserve {})",
            amount_in, reserve_out
        )));
    }

    Ok(SwapResult {
        amount_out,
        fee_amount,
    })
}

/// Marginal out/in price at the current balances, from the invariant's
/// partial derivatives
pub fn spot_price(reserve_in: f64, reserve_out: f64, amplification: u64) -> Result<f64> {
    let d = compute_d(reserve_in, reserve_out, amplification)?;
    let ann = ann(amplification);
    let d3 = d * d * d;
    let df_dx = ann + d3 / (N_COINS * N_COINS * reserve_in * reserve_in * reserve_out);
    let df_dy = ann + d3 / (N_COINS * N_COINS * reserve_in * reserve_out * reserve_out);
    Ok(df_dx / df_dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_balanced_pool_invariant() {
        let d = compute_d(1_000_000.0, 1_000_000.0, 100).unwrap();
        assert_approx_eq!(d, 2_000_000.0, 1e-6);
        assert_approx_eq!(spot_price(1_000_000.0, 1_000_000.0, 100).unwrap(), 1.0, 1e-12);
    }

    #[test]
    fn test_stable_beats_constant_product_near_peg() {
        let stable = swap_output(10_000.0, 1_000_000.0, 1_000_000.0, 4, 100).unwrap();
        let cp = super::super::constant_product::swap_output(10_000.0, 1_000_000.0, 1_000_000.0, 4)
            .unwrap();
        assert!(stable.amount_out > cp.amount_out);
        assert!(stable.amount_out < 10_000.0);
    }

    #[test]
    fn test_invariant_preserved_after_swap() {
        let result = swap_output(50_000.0, 800_000.0, 1_200_000.0, 0, 50).unwrap();
        let before = compute_d(800_000.0, 1_200_000.0, 50).unwrap();
        let after = compute_d(850_000.0, 1_200_000.0 - result.amount_out, 50).unwrap();
        assert_approx_eq!(before, after, 1e-3);
    }

    #[test]
    fn test_zero_amplification_rejected() {
        assert!(swap_output(1.0, 100.0, 100.0, 4, 0).is_err());
    }
}
