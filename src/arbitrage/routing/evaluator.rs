// src/arbitrage/routing/evaluator.rs
//! Prices a path hop by hop against the current pool snapshot.

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

use super::graph::RoutingGraph;
use super::pathfinder::Path;
use crate::config::Config;
use crate::dex::pool::PoolKind;
use crate::error::{Result, RoutingError};

/// One swap of a route. Percentages are on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub asset_in: Pubkey,
    pub asset_out: Pubkey,
    pub pool: Pubkey,
    pub pool_kind: PoolKind,
    pub amount_in: f64,
    pub amount_out: f64,
    pub fee_amount: f64,
    pub fee_pct: f64,
    pub price_impact_pct: f64,
    pub pool_liquidity: f64,
}

/// A path priced at a specific input amount. Fee and impact totals are the
/// sums of the per-hop percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub path: Path,
    pub hops: Vec<Hop>,
    pub amount_in: f64,
    pub expected_output: f64,
    pub total_price_impact_pct: f64,
    pub total_fee_pct: f64,
    pub execution_time_estimate: Duration,
    pub confidence_score: f64,
}

impl Route {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Output per unit of input
    pub fn effective_price(&self) -> f64 {
        if self.amount_in > 0.0 {
            self.expected_output / self.amount_in
        } else {
            0.0
        }
    }

    pub fn min_pool_liquidity(&self) -> f64 {
        self.hops
            .iter()
            .map(|hop| hop.pool_liquidity)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pubkey> {
        self.hops.iter().map(|hop| &hop.pool)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Hops through pools shallower than this lower a route's confidence
    pub low_liquidity_floor: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            low_liquidity_floor: 10_000.0,
        }
    }
}

impl EvaluatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            low_liquidity_floor: config.low_liquidity_floor,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteEvaluator {
    config: EvaluatorConfig,
}

impl RouteEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Prices `path` at `amount_in`; `None` when any hop cannot be filled
    pub fn evaluate(&self, graph: &RoutingGraph, path: &Path, amount_in: f64) -> Option<Route> {
        match self.try_evaluate(graph, path, amount_in) {
            Ok(route) => Some(route),
            Err(e) => {
                debug!("Path {} not viable at {}: {}", path, amount_in, e);
                None
            }
        }
    }

    /// Evaluates every path in parallel; results keep the input order
    pub fn evaluate_all(&self, graph: &RoutingGraph, paths: &[Path], amount_in: f64) -> Vec<Route> {
        paths
            .par_iter()
            .filter_map(|path| self.evaluate(graph, path, amount_in))
            .collect()
    }

    /// Like `evaluate`, keeping the reason a path is not viable
    pub fn try_evaluate(&self, graph: &RoutingGraph, path: &Path, amount_in: f64) -> Result<Route> {
        if !amount_in.is_finite() || amount_in <= 0.0 {
            return Err(RoutingError::InvalidAmount(format!(
                "route input must be positive, got {}",
                amount_in
            )));
        }

        let mut hops = Vec::with_capacity(path.hop_count());
        let mut current = amount_in;

        for (asset_in, asset_out) in path.hops() {
            let (Some(from), Some(to)) = (graph.asset_id(&asset_in), graph.asset_id(&asset_out))
            else {
                return Err(RoutingError::UnknownAsset(format!(
                    "{} or {} not in the current snapshot",
                    asset_in, asset_out
                )));
            };
            let edge = graph.best_pool_between(from, to).ok_or_else(|| {
                RoutingError::InsufficientLiquidity(format!(
                    "no pool between {} and {}",
                    asset_in, asset_out
                ))
            })?;
            let pool = graph.pool(edge);
            let quote = pool.quote(&asset_in, current)?;
            if !(quote.amount_out > 0.0) {
                return Err(RoutingError::InsufficientLiquidity(format!(
                    "pool {} returns nothing for {}",
                    pool.address, current
                )));
            }

            hops.push(Hop {
                asset_in,
                asset_out,
                pool: pool.address,
                pool_kind: pool.kind,
                amount_in: current,
                amount_out: quote.amount_out,
                fee_amount: quote.fee_amount,
                fee_pct: pool.fee_rate() * 100.0,
                price_impact_pct: quote.price_impact * 100.0,
                pool_liquidity: graph.edge_liquidity(edge),
            });
            current = quote.amount_out;
        }

        let total_price_impact_pct = hops.iter().map(|h| h.price_impact_pct).sum();
        let total_fee_pct = hops.iter().map(|h| h.fee_pct).sum();
        let execution_time_estimate = hops
            .iter()
            .map(|h| h.pool_kind.estimated_execution_time())
            .sum();
        let confidence_score = self.confidence(&hops);

        Ok(Route {
            path: path.clone(),
            hops,
            amount_in,
            expected_output: current,
            total_price_impact_pct,
            total_fee_pct,
            execution_time_estimate,
            confidence_score,
        })
    }

    /// 100, less 10 per hop beyond the first, 5 per point of average impact,
    /// and 20 if any pool is below the liquidity floor
    fn confidence(&self, hops: &[Hop]) -> f64 {
        if hops.is_empty() {
            return 0.0;
        }
        let mut score = 100.0;
        score -= 10.0 * (hops.len() - 1) as f64;
        let avg_impact_pct =
            hops.iter().map(|h| h.price_impact_pct).sum::<f64>() / hops.len() as f64;
        score -= 5.0 * avg_impact_pct;
        if hops
            .iter()
            .any(|h| h.pool_liquidity < self.config.low_liquidity_floor)
        {
            score -= 20.0;
        }
        score.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asset, core_assets, cp_pool, two_hop_pools};
    use assert_approx_eq::assert_approx_eq;

    fn two_hop_path() -> Path {
        let (usdc, sol, token) = core_assets();
        Path::new(vec![usdc.mint, sol.mint, token.mint]).unwrap()
    }

    #[test]
    fn test_two_hop_evaluation() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let route = RouteEvaluator::default()
            .evaluate(&graph, &two_hop_path(), 1_000.0)
            .unwrap();

        assert_eq!(route.hop_count(), 2);
        assert_approx_eq!(route.total_fee_pct, 1.3, 1e-9);
        assert!(route.expected_output > 0.0);
        assert_approx_eq!(route.hops[1].amount_in, route.hops[0].amount_out);
        assert!(route.confidence_score > 0.0 && route.confidence_score <= 100.0);
        assert_eq!(route.execution_time_estimate, Duration::from_millis(1_200));
    }

    #[test]
    fn test_impacts_accumulate_additively() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let route = RouteEvaluator::default()
            .evaluate(&graph, &two_hop_path(), 250_000.0)
            .unwrap();
        let summed: f64 = route.hops.iter().map(|h| h.price_impact_pct).sum();
        assert_approx_eq!(route.total_price_impact_pct, summed);
        assert!(route.total_price_impact_pct > 0.0);
    }

    #[test]
    fn test_confidence_penalties() {
        let (usdc, sol, _) = core_assets();
        let thin = RoutingGraph::build(&[cp_pool(&usdc, &sol, 5_000.0, 50.0, 30)]);
        let direct = Path::new(vec![usdc.mint, sol.mint]).unwrap();
        let route = RouteEvaluator::default()
            .evaluate(&thin, &direct, 1.0)
            .unwrap();
        let expected = 100.0 - 20.0 - 5.0 * route.total_price_impact_pct;
        assert_approx_eq!(route.confidence_score, expected, 1e-9);
    }

    #[test]
    fn test_unfillable_or_invalid_inputs() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let evaluator = RouteEvaluator::default();
        assert!(evaluator.evaluate(&graph, &two_hop_path(), 0.0).is_none());
        assert!(evaluator.evaluate(&graph, &two_hop_path(), -5.0).is_none());

        let (usdc, _, _) = core_assets();
        let ghost = Path::new(vec![usdc.mint, asset("BONK", 5).mint]).unwrap();
        assert!(matches!(
            evaluator.try_evaluate(&graph, &ghost, 10.0),
            Err(RoutingError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_evaluate_all_keeps_order_and_drops_failures() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let (usdc, sol, token) = core_assets();
        let paths = vec![
            Path::new(vec![usdc.mint, sol.mint]).unwrap(),
            Path::new(vec![usdc.mint, token.mint]).unwrap(),
            two_hop_path(),
        ];
        let routes = RouteEvaluator::default().evaluate_all(&graph, &paths, 100.0);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].path, paths[0]);
        assert_eq!(routes[1].path, paths[2]);
    }
}
