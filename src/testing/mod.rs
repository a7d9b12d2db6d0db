//! Fixtures shared by unit and integration tests: deterministic keys, pool
//! builders and a scripted trade executor.

pub mod mock_venue;

pub use mock_venue::{HopBehavior, ScriptedTradeExecutor};

use crate::dex::pool::{Asset, Pool, PoolKind};
use solana_sdk::pubkey::Pubkey;

fn labelled_key(prefix: u8, label: &str) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes[0] = prefix;
    for (slot, byte) in bytes[1..].iter_mut().zip(label.bytes()) {
        *slot = byte;
    }
    Pubkey::new_from_array(bytes)
}

/// Mint key derived from a symbol; mints order the same way their symbols do
pub fn mint(symbol: &str) -> Pubkey {
    labelled_key(b'M', symbol)
}

pub fn pool_address(label: &str) -> Pubkey {
    labelled_key(b'P', label)
}

pub fn asset(symbol: &str, decimals: u8) -> Asset {
    Asset::new(mint(symbol), symbol, decimals)
}

/// Constant product pool labelled `A-B`
pub fn cp_pool(a: &Asset, b: &Asset, reserve_a: f64, reserve_b: f64, fee_bps: u16) -> Pool {
    Pool::constant_product(
        pool_address(&format!("{}-{}", a.symbol, b.symbol)),
        a.clone(),
        b.clone(),
        reserve_a,
        reserve_b,
        fee_bps,
    )
}

/// Same as `cp_pool` with a caller-chosen address label, for parallel pools
pub fn cp_pool_labelled(
    label: &str,
    a: &Asset,
    b: &Asset,
    reserve_a: f64,
    reserve_b: f64,
    fee_bps: u16,
) -> Pool {
    Pool::constant_product(
        pool_address(label),
        a.clone(),
        b.clone(),
        reserve_a,
        reserve_b,
        fee_bps,
    )
}

pub fn stable_pool(a: &Asset, b: &Asset, reserve: f64, fee_bps: u16, amplification: u64) -> Pool {
    Pool::new(
        pool_address(&format!("{}-{}-stable", a.symbol, b.symbol)),
        a.clone(),
        b.clone(),
        reserve,
        reserve,
        fee_bps,
        PoolKind::Stable { amplification },
    )
}

pub fn bins_pool(
    a: &Asset,
    b: &Asset,
    reserve_a: f64,
    reserve_b: f64,
    fee_bps: u16,
    bin_step_bps: u16,
    bin_liquidity: f64,
) -> Pool {
    Pool::new(
        pool_address(&format!("{}-{}-bins", a.symbol, b.symbol)),
        a.clone(),
        b.clone(),
        reserve_a,
        reserve_b,
        fee_bps,
        PoolKind::DiscretizedBins {
            bin_step_bps,
            bin_liquidity,
        },
    )
}

/// USDC/SOL/TOKEN assets used across scenarios
pub fn core_assets() -> (Asset, Asset, Asset) {
    (asset("USDC", 6), asset("SOL", 9), asset("TOKEN", 6))
}

/// USDC-SOL (0.3%) and SOL-TOKEN (1%), both deep: the only USDC to TOKEN
/// route is the two-hop one through SOL
pub fn two_hop_pools() -> Vec<Pool> {
    let (usdc, sol, token) = core_assets();
    vec![
        cp_pool(&usdc, &sol, 10_000_000.0, 100_000.0, 30),
        cp_pool(&sol, &token, 100_000.0, 10_000_000.0, 100),
    ]
}
