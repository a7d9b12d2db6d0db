use std::sync::Arc;

use assert_approx_eq::assert_approx_eq;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use solana_swap_router::arbitrage::routing::{
    ManualClock, PathFinder, PathfinderConfig, RouteConstraints, RouteEvaluator, RouteSplitter,
    RoutingGraph, SmartRouter, SmartRouterConfig, StaticPoolProvider,
};
use solana_swap_router::dex::Pool;
use solana_swap_router::testing::{
    asset, bins_pool, core_assets, cp_pool, stable_pool, ScriptedTradeExecutor,
};

/// USDC-SOL deep at 0.3%, SOL-TOKEN shallow at 1%; no direct USDC-TOKEN pool
fn scenario_pools() -> Vec<Pool> {
    let (usdc, sol, token) = core_assets();
    vec![
        cp_pool(&usdc, &sol, 20_000_000.0, 200_000.0, 30),
        cp_pool(&sol, &token, 2_000.0, 200_000.0, 100),
    ]
}

fn triangle_pools(token_usdc_reserve: f64) -> Vec<Pool> {
    let (usdc, sol, token) = core_assets();
    vec![
        cp_pool(&usdc, &sol, 1_000_000.0, 10_000.0, 30),
        cp_pool(&sol, &token, 10_000.0, 1_000_000.0, 30),
        cp_pool(&token, &usdc, 1_000_000.0, token_usdc_reserve, 30),
    ]
}

fn router(pools: Vec<Pool>) -> SmartRouter {
    SmartRouter::with_clock(
        SmartRouterConfig::default(),
        Arc::new(StaticPoolProvider::new(pools)),
        Arc::new(ScriptedTradeExecutor::new()),
        Arc::new(ManualClock::new(0)),
    )
}

#[test]
fn two_hop_route_through_the_only_bridge() {
    let (usdc, sol, token) = core_assets();
    let graph = RoutingGraph::build(&scenario_pools());

    let paths = PathFinder::default().find_paths(&graph, &usdc.mint, &token.mint, 2, None);
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].assets(), &[usdc.mint, sol.mint, token.mint]);

    let route = RouteEvaluator::default()
        .evaluate(&graph, &paths[0], 100.0)
        .expect("two-hop route should be viable");
    assert_approx_eq!(route.total_fee_pct, 1.3, 1e-9);
    assert!(route.expected_output.is_finite());
    assert!(route.expected_output > 0.0);
}

#[tokio::test]
async fn one_hop_cap_finds_nothing() {
    let (usdc, _, token) = core_assets();
    let graph = RoutingGraph::build(&scenario_pools());
    assert!(PathFinder::default()
        .find_paths(&graph, &usdc.mint, &token.mint, 1, None)
        .is_empty());

    let router = router(scenario_pools());
    let best = router
        .find_best_route(&usdc.mint, &token.mint, 100.0, 1, &RouteConstraints::none())
        .await
        .unwrap();
    assert!(best.is_none());

    let widened = router
        .find_best_route(&usdc.mint, &token.mint, 100.0, 2, &RouteConstraints::none())
        .await
        .unwrap();
    assert!(widened.is_some());
}

#[tokio::test]
async fn profitable_triangle_is_reported() {
    let (usdc, sol, token) = core_assets();
    let cycles = router(triangle_pools(1_200_000.0))
        .find_arbitrage(&usdc.mint, 0.0, 3)
        .await
        .unwrap();

    assert!(!cycles.is_empty());
    let best = &cycles[0];
    assert_eq!(
        best.cycle.assets(),
        &[usdc.mint, sol.mint, token.mint, usdc.mint]
    );
    assert!(best.route.expected_output > best.probe_amount);
    assert!(cycles.windows(2).all(|w| w[0].profit_bps >= w[1].profit_bps));
}

#[tokio::test]
async fn losing_triangle_is_not_reported() {
    let (usdc, _, _) = core_assets();
    let cycles = router(triangle_pools(995_000.0))
        .find_arbitrage(&usdc.mint, 0.0, 3)
        .await
        .unwrap();
    assert!(cycles.is_empty());
}

#[tokio::test]
async fn price_impact_constraint_filters_routes() {
    let (usdc, _, token) = core_assets();
    let router = router(scenario_pools());

    let loose = router
        .find_best_route(&usdc.mint, &token.mint, 50_000.0, 2, &RouteConstraints::none())
        .await
        .unwrap()
        .unwrap();
    assert!(loose.total_price_impact_pct > 1.0);

    let strict = RouteConstraints::none().with_max_price_impact_pct(1.0);
    assert!(router
        .find_best_route(&usdc.mint, &token.mint, 50_000.0, 2, &strict)
        .await
        .unwrap()
        .is_none());
}

/// USDC -stable-> USDT -bins-> SOL -cp-> TOKEN
fn mixed_kind_pools(amplification: u64, bin_step_bps: u16, bin_liquidity: f64) -> Vec<Pool> {
    let (usdc, sol, token) = core_assets();
    let usdt = asset("USDT", 6);
    vec![
        stable_pool(&usdc, &usdt, 5_000_000.0, 4, amplification),
        bins_pool(&usdt, &sol, 2_000_000.0, 20_000.0, 10, bin_step_bps, bin_liquidity),
        cp_pool(&sol, &token, 20_000.0, 2_000_000.0, 30),
    ]
}

#[test]
fn stable_and_bin_pools_route_like_any_other() {
    let (usdc, sol, token) = core_assets();
    let usdt = asset("USDT", 6);
    let graph = RoutingGraph::build(&mixed_kind_pools(200, 20, 20.0));

    let paths = PathFinder::default().find_paths(&graph, &usdc.mint, &token.mint, 3, None);
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].assets(), &[usdc.mint, usdt.mint, sol.mint, token.mint]);

    let route = RouteEvaluator::default()
        .evaluate(&graph, &paths[0], 10_000.0)
        .expect("mixed route should be viable");
    assert_eq!(route.hop_count(), 3);
    assert_approx_eq!(route.total_fee_pct, 0.04 + 0.1 + 0.3, 1e-9);
    // a 10k swap barely moves a 5M stable pool
    assert!(route.hops[0].price_impact_pct < 0.01);
    assert!(route.hops[1].price_impact_pct > 0.0);
}

const SYMBOLS: [&str; 6] = ["A0", "A1", "A2", "A3", "A4", "A5"];

fn random_pools() -> impl Strategy<Value = Vec<Pool>> {
    prop::collection::vec(
        (
            0usize..SYMBOLS.len(),
            0usize..SYMBOLS.len(),
            1_000.0f64..10_000_000.0,
            1_000.0f64..10_000_000.0,
            1u16..300,
        ),
        1..14,
    )
    .prop_map(|edges| {
        edges
            .into_iter()
            .filter(|(a, b, ..)| a != b)
            .map(|(a, b, ra, rb, fee)| {
                cp_pool(&asset(SYMBOLS[a], 6), &asset(SYMBOLS[b], 6), ra, rb, fee)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn paths_are_simple_capped_and_stable(
        pools in random_pools(),
        from in 0usize..SYMBOLS.len(),
        to in 0usize..SYMBOLS.len(),
        max_hops in 1usize..5,
    ) {
        let graph = RoutingGraph::build(&pools);
        let finder = PathFinder::new(PathfinderConfig { max_paths: 500, ..PathfinderConfig::default() });
        let from = asset(SYMBOLS[from], 6).mint;
        let to = asset(SYMBOLS[to], 6).mint;

        let paths = finder.find_paths(&graph, &from, &to, max_hops, None);
        for path in &paths {
            let mut seen = path.assets().to_vec();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), path.assets().len());
            prop_assert!(path.hop_count() <= max_hops);
            prop_assert_eq!(path.source(), from);
            prop_assert_eq!(path.destination(), to);
            for (a, b) in path.hops() {
                let (x, y) = (graph.asset_id(&a).unwrap(), graph.asset_id(&b).unwrap());
                prop_assert!(!graph.pools_between(x, y).is_empty());
            }
        }
        prop_assert!(paths.windows(2).all(|w| (w[0].hop_count(), w[0].assets()) < (w[1].hop_count(), w[1].assets())));

        let again = finder.find_paths(&graph, &from, &to, max_hops, None);
        prop_assert_eq!(paths, again);
    }

    #[test]
    fn disconnected_assets_have_no_paths(pools in random_pools()) {
        let mut pools = pools;
        let (island_a, island_b) = (asset("ZZ1", 6), asset("ZZ2", 6));
        pools.push(cp_pool(&island_a, &island_b, 50_000.0, 50_000.0, 30));
        let graph = RoutingGraph::build(&pools);

        let from = asset(SYMBOLS[0], 6).mint;
        prop_assert!(PathFinder::default().find_paths(&graph, &from, &island_a.mint, 4, None).is_empty());
    }

    #[test]
    fn effective_price_never_improves_with_size(
        pools in random_pools(),
        base in 1.0f64..1_000.0,
    ) {
        let graph = RoutingGraph::build(&pools);
        let from = asset(SYMBOLS[0], 6).mint;
        let to = asset(SYMBOLS[1], 6).mint;
        let evaluator = RouteEvaluator::default();

        for path in PathFinder::default().find_paths(&graph, &from, &to, 3, None) {
            let mut previous = f64::INFINITY;
            for step in 0..8 {
                let amount = base * 4f64.powi(step);
                let Some(route) = evaluator.evaluate(&graph, &path, amount) else { break };
                let price = route.effective_price();
                prop_assert!(price <= previous * (1.0 + 1e-9));
                previous = price;
            }
        }
    }

    #[test]
    fn effective_price_never_improves_across_pool_kinds(
        amplification in 10u64..500,
        bin_step_bps in 1u16..100,
        bin_liquidity in 200.0f64..5_000.0,
    ) {
        let (usdc, _, token) = core_assets();
        let graph = RoutingGraph::build(&mixed_kind_pools(amplification, bin_step_bps, bin_liquidity));
        let evaluator = RouteEvaluator::default();

        for path in PathFinder::default().find_paths(&graph, &usdc.mint, &token.mint, 3, None) {
            let mut previous = f64::INFINITY;
            for step in 0..7 {
                let amount = 1_000.0 * 4f64.powi(step);
                let Some(route) = evaluator.evaluate(&graph, &path, amount) else { break };
                let price = route.effective_price();
                prop_assert!(price <= previous * (1.0 + 1e-7));
                previous = price;
            }
        }
    }

    #[test]
    fn split_amounts_sum_to_total(
        sol_depth in 10_000.0f64..1_000_000.0,
        usdt_depth in 10_000.0f64..1_000_000.0,
        total in 100.0f64..200_000.0,
    ) {
        let (usdc, sol, token) = core_assets();
        let usdt = asset("USDT", 6);
        let pools = vec![
            cp_pool(&usdc, &sol, sol_depth * 100.0, sol_depth, 30),
            cp_pool(&sol, &token, sol_depth, sol_depth * 100.0, 30),
            cp_pool(&usdc, &usdt, usdt_depth, usdt_depth, 5),
            cp_pool(&usdt, &token, usdt_depth, usdt_depth, 30),
        ];
        let graph = RoutingGraph::build(&pools);
        let evaluator = RouteEvaluator::default();
        let paths = PathFinder::default().find_paths(&graph, &usdc.mint, &token.mint, 2, None);
        let routes = evaluator.evaluate_all(&graph, &paths, total);
        prop_assume!(!routes.is_empty());

        let plan = RouteSplitter::default().split(&graph, &routes, total).unwrap();
        let amount_sum: f64 = plan.allocations.iter().map(|a| a.amount).sum();
        let fraction_sum: f64 = plan.allocations.iter().map(|a| a.fraction).sum();
        prop_assert!((amount_sum - total).abs() <= total * 1e-9);
        prop_assert!((fraction_sum - 1.0).abs() <= 1e-9);
        for allocation in &plan.allocations {
            prop_assert!(allocation.amount > 0.0);
            prop_assert!(allocation.expected_output > 0.0);
        }
    }
}
