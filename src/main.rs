// src/main.rs
use anyhow::{Context, Result};
use log::{info, warn};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;

use solana_swap_router::{
    arbitrage::routing::{
        JsonFilePoolProvider, PaperTradeExecutor, PoolDataProvider, RouteConstraints, RoutePlan,
        SmartRouter, SmartRouterConfig, StaticPoolProvider,
    },
    config::load_config,
    dex::{Asset, Pool, PoolKind},
    utils::{parse_log_level, setup_logging},
};

const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";
const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
const BONK_MINT: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

fn mint(address: &str, symbol: &str, decimals: u8) -> Result<Asset> {
    let key = Pubkey::from_str(address).with_context(|| format!("bad mint for {}", symbol))?;
    Ok(Asset::new(key, symbol, decimals))
}

/// Small built-in market used when no pool file is configured
fn sample_pools() -> Result<Vec<Pool>> {
    let usdc = mint(USDC_MINT, "USDC", 6)?;
    let usdt = mint(USDT_MINT, "USDT", 6)?;
    let sol = mint(SOL_MINT, "SOL", 9)?;
    let bonk = mint(BONK_MINT, "BONK", 5)?;

    Ok(vec![
        Pool::constant_product(Pubkey::new_unique(), usdc.clone(), sol.clone(), 4_000_000.0, 25_000.0, 25),
        Pool::new(
            Pubkey::new_unique(),
            sol.clone(),
            usdc.clone(),
            12_000.0,
            1_950_000.0,
            10,
            PoolKind::DiscretizedBins {
                bin_step_bps: 10,
                bin_liquidity: 40_000.0,
            },
        ),
        Pool::new(
            Pubkey::new_unique(),
            usdc.clone(),
            usdt.clone(),
            6_000_000.0,
            6_000_000.0,
            4,
            PoolKind::Stable { amplification: 200 },
        ),
        Pool::constant_product(Pubkey::new_unique(), usdt.clone(), sol.clone(), 2_500_000.0, 15_500.0, 30),
        Pool::constant_product(Pubkey::new_unique(), sol.clone(), bonk.clone(), 8_000.0, 50_000_000_000.0, 30),
        Pool::constant_product(Pubkey::new_unique(), usdc.clone(), bonk.clone(), 300_000.0, 1_000_000_000.0, 100),
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    setup_logging(parse_log_level(&config.log_level))?;
    config.log_settings();
    info!("Swap router demo starting");

    let (provider, pools): (Arc<dyn PoolDataProvider>, Vec<Pool>) = match &config.pools_file {
        Some(path) => {
            let provider = JsonFilePoolProvider::new(path);
            let pools = provider.load_pools().await?;
            (Arc::new(provider), pools)
        }
        None => {
            let pools = sample_pools()?;
            (Arc::new(StaticPoolProvider::new(pools.clone())), pools)
        }
    };

    let router = SmartRouter::new(
        SmartRouterConfig::from_config(&config),
        provider,
        Arc::new(PaperTradeExecutor::new(&pools)),
    );

    let snapshot = router.snapshot().await?;
    let stats = snapshot.graph.stats();
    info!(
        "Graph: {} assets, {} pools, connectivity {:.2}",
        stats.asset_count, stats.pool_count, stats.connectivity_score
    );

    let usdc = Pubkey::from_str(USDC_MINT)?;
    let bonk = Pubkey::from_str(BONK_MINT)?;
    let amount = 25_000.0;

    match router
        .find_best_route(&usdc, &bonk, amount, config.max_hops, &RouteConstraints::none())
        .await?
    {
        Some(route) => info!(
            "Best route: {} ({} hops) -> {:.2} out, impact {:.3}%, fees {:.3}%, confidence {:.1}",
            route.path,
            route.hop_count(),
            route.expected_output,
            route.total_price_impact_pct,
            route.total_fee_pct,
            route.confidence_score
        ),
        None => warn!("No route from USDC to BONK"),
    }

    let candidates = router
        .find_routes_for_split(&usdc, &bonk, amount, config.max_routes, config.max_hops)
        .await?;
    if candidates.is_empty() {
        warn!("Nothing to split");
    } else {
        let plan = router.optimize_split(&candidates, amount).await?;
        for allocation in &plan.allocations {
            info!(
                "  {:>6.2}% via {} -> {:.2}",
                allocation.fraction * 100.0,
                allocation.route.path,
                allocation.expected_output
            );
        }

        let result = router.execute(&RoutePlan::Split(plan), None).await?;
        info!(
            "Paper execution {}: {:?}, realized {:.2} with {} receipts",
            result.id,
            result.status,
            result.realized_output,
            result.receipts.len()
        );
    }

    let cycles = router.find_arbitrage(&usdc, 5.0, 4).await?;
    if cycles.is_empty() {
        info!("No arbitrage cycles from USDC");
    }
    for cycle in cycles.iter().take(5) {
        info!(
            "Cycle {}: {:+.2} bps on {}",
            cycle.cycle, cycle.profit_bps, cycle.probe_amount
        );
    }

    info!("Router metrics: {:?}", router.metrics());
    Ok(())
}
