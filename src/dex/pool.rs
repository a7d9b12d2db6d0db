use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::time::Duration;

use crate::dex::math::{self, bins, constant_product, stable, SwapResult};
use crate::error::{Result, RoutingError};

/// A tradable token. Identity is the mint; symbol and decimals are display data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub mint: Pubkey,
    pub symbol: String,
    pub decimals: u8,
}

impl Asset {
    pub fn new(mint: Pubkey, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            mint,
            symbol: symbol.into(),
            decimals,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Pricing model of a pool, fixed when the pool is constructed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolKind {
    ConstantProduct,
    DiscretizedBins { bin_step_bps: u16, bin_liquidity: f64 },
    Stable { amplification: u64 },
}

impl PoolKind {
    pub fn label(&self) -> &'static str {
        match self {
            PoolKind::ConstantProduct => "constant_product",
            PoolKind::DiscretizedBins { .. } => "discretized_bins",
            PoolKind::Stable { .. } => "stable",
        }
    }

    /// Rough time for one hop through this kind of pool to land
    pub fn estimated_execution_time(&self) -> Duration {
        match self {
            PoolKind::ConstantProduct => Duration::from_millis(600),
            PoolKind::DiscretizedBins { .. } => Duration::from_millis(700),
            PoolKind::Stable { .. } => Duration::from_millis(650),
        }
    }
}

/// Result of pricing a swap against a pool snapshot.
/// `price_impact` is a fraction in [0, 1]; the fee is reported separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub amount_out: f64,
    pub price_impact: f64,
    pub fee_amount: f64,
}

/// Read-only snapshot of an exchange pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub address: Pubkey,
    pub asset_a: Asset,
    pub asset_b: Asset,
    pub reserve_a: f64,
    pub reserve_b: f64,
    pub fee_bps: u16,
    pub volume_24h: Option<f64>,
    pub last_update_timestamp: u64,
    pub kind: PoolKind,
}

impl Pool {
    pub fn new(
        address: Pubkey,
        asset_a: Asset,
        asset_b: Asset,
        reserve_a: f64,
        reserve_b: f64,
        fee_bps: u16,
        kind: PoolKind,
    ) -> Self {
        Self {
            address,
            asset_a,
            asset_b,
            reserve_a,
            reserve_b,
            fee_bps,
            volume_24h: None,
            last_update_timestamp: 0,
            kind,
        }
    }

    pub fn constant_product(
        address: Pubkey,
        asset_a: Asset,
        asset_b: Asset,
        reserve_a: f64,
        reserve_b: f64,
        fee_bps: u16,
    ) -> Self {
        Self::new(
            address,
            asset_a,
            asset_b,
            reserve_a,
            reserve_b,
            fee_bps,
            PoolKind::ConstantProduct,
        )
    }

    pub fn with_volume(mut self, volume_24h: f64) -> Self {
        self.volume_24h = Some(volume_24h);
        self
    }

    pub fn with_timestamp(mut self, last_update_timestamp: u64) -> Self {
        self.last_update_timestamp = last_update_timestamp;
        self
    }

    pub fn fee_rate(&self) -> f64 {
        math::fee_rate(self.fee_bps)
    }

    /// Depth measure: geometric mean of the two reserves
    pub fn liquidity(&self) -> f64 {
        if self.reserve_a <= 0.0 || self.reserve_b <= 0.0 {
            return 0.0;
        }
        // the product overflows long before either reserve does
        self.reserve_a.sqrt() * self.reserve_b.sqrt()
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.asset_a.mint == *mint || self.asset_b.mint == *mint
    }

    /// The asset received when selling `mint` into this pool
    pub fn other_side(&self, mint: &Pubkey) -> Option<&Asset> {
        if self.asset_a.mint == *mint {
            Some(&self.asset_b)
        } else if self.asset_b.mint == *mint {
            Some(&self.asset_a)
        } else {
            None
        }
    }

    /// (reserve_in, reserve_out) when selling `mint`
    pub fn reserves_for(&self, mint: &Pubkey) -> Option<(f64, f64)> {
        if self.asset_a.mint == *mint {
            Some((self.reserve_a, self.reserve_b))
        } else if self.asset_b.mint == *mint {
            Some((self.reserve_b, self.reserve_a))
        } else {
            None
        }
    }

    /// Two distinct sides with finite, non-negative reserves
    pub fn is_well_formed(&self) -> bool {
        self.asset_a.mint != self.asset_b.mint
            && self.reserve_a.is_finite()
            && self.reserve_b.is_finite()
            && self.reserve_a >= 0.0
            && self.reserve_b >= 0.0
    }

    /// Marginal out/in price before trading, fee excluded
    pub fn spot_price(&self, asset_in: &Pubkey) -> Result<f64> {
        let (reserve_in, reserve_out) = self.reserves_for(asset_in).ok_or_else(|| {
            RoutingError::InsufficientLiquidity(format!(
                "asset {} not traded by pool {}",
                asset_in, self.address
            ))
        })?;
        if reserve_in <= 0.0 || reserve_out <= 0.0 {
            return Err(RoutingError::InsufficientLiquidity(format!(
                "pool {} has an empty side",
                self.address
            )));
        }
        match self.kind {
            PoolKind::ConstantProduct => Ok(constant_product::spot_price(reserve_in, reserve_out)),
            PoolKind::DiscretizedBins { .. } => Ok(bins::active_bin_price(reserve_in, reserve_out)),
            PoolKind::Stable { amplification } => {
                stable::spot_price(reserve_in, reserve_out, amplification)
            }
        }
    }

    pub fn quote(&self, asset_in: &Pubkey, amount_in: f64) -> Result<Quote> {
        if !amount_in.is_finite() || amount_in <= 0.0 {
            return Err(RoutingError::InvalidAmount(format!(
                "cannot quote {} on pool {}",
                amount_in, self.address
            )));
        }
        let (reserve_in, reserve_out) = self.reserves_for(asset_in).ok_or_else(|| {
            RoutingError::InsufficientLiquidity(format!(
                "asset {} not traded by pool {}",
                asset_in, self.address
            ))
        })?;

        let SwapResult {
            amount_out,
            fee_amount,
        } = match self.kind {
            PoolKind::ConstantProduct => {
                constant_product::swap_output(amount_in, reserve_in, reserve_out, self.fee_bps)?
            }
            PoolKind::DiscretizedBins {
                bin_step_bps,
                bin_liquidity,
            } => bins::swap_output(
                amount_in,
                reserve_in,
                reserve_out,
                self.fee_bps,
                bin_step_bps,
                bin_liquidity,
            )?,
            PoolKind::Stable { amplification } => stable::swap_output(
                amount_in,
                reserve_in,
                reserve_out,
                self.fee_bps,
                amplification,
            )?,
        };

        let reference = self.spot_price(asset_in)? * (1.0 - self.fee_rate());
        let price_impact = if reference > 0.0 {
            (1.0 - (amount_out / amount_in) / reference).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Ok(Quote {
            amount_out,
            price_impact,
            fee_amount,
        })
    }
}
