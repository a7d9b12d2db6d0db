// src/arbitrage/detector.rs
//! Cycle search for arbitrage: closed paths that start and end at the same
//! asset, priced at a probe amount.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use crate::arbitrage::routing::evaluator::{Route, RouteEvaluator};
use crate::arbitrage::routing::graph::{AssetId, RoutingGraph};
use crate::arbitrage::routing::pathfinder::Path;
use crate::utils::timing::Timer;

/// Upper bound on DFS node visits per search
const MAX_DFS_EXPANSIONS: usize = 200_000;

/// A cycle whose output beats its input at the probe amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitableCycle {
    pub cycle: Path,
    pub route: Route,
    pub probe_amount: f64,
    pub profit: f64,
    pub profit_bps: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CycleDetector {
    evaluator: RouteEvaluator,
}

impl CycleDetector {
    pub fn new(evaluator: RouteEvaluator) -> Self {
        Self { evaluator }
    }

    /// Every simple cycle through `start` with 3 to `max_length` edges,
    /// ordered by length and then asset sequence. A cycle and its reverse
    /// are reported separately.
    pub fn find_cycles(&self, graph: &RoutingGraph, start: &Pubkey, max_length: usize) -> Vec<Path> {
        let Some(origin) = graph.asset_id(start) else {
            return Vec::new();
        };
        if max_length < 3 {
            return Vec::new();
        }

        let mut found: Vec<Vec<AssetId>> = Vec::new();
        let mut stack = vec![origin];
        let mut on_path: HashSet<AssetId> = HashSet::from([origin]);
        let mut expansions = 0usize;
        self.dfs(
            graph,
            origin,
            max_length,
            &mut stack,
            &mut on_path,
            &mut found,
            &mut expansions,
        );
        if expansions >= MAX_DFS_EXPANSIONS {
            debug!(
                "Cycle search from {} stopped after {} expansions",
                start, expansions
            );
        }

        // asset ids follow mint order, so sorting ids sorts mints
        found.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        found
            .into_iter()
            .filter_map(|ids| Path::closed(ids.iter().map(|&id| graph.asset(id).mint).collect()).ok())
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        graph: &RoutingGraph,
        origin: AssetId,
        max_length: usize,
        stack: &mut Vec<AssetId>,
        on_path: &mut HashSet<AssetId>,
        found: &mut Vec<Vec<AssetId>>,
        expansions: &mut usize,
    ) {
        let Some(&current) = stack.last() else {
            return;
        };
        let edges_used = stack.len() - 1;

        for next in graph.neighbors(current) {
            if *expansions >= MAX_DFS_EXPANSIONS {
                return;
            }
            *expansions += 1;

            if next == origin {
                if edges_used + 1 >= 3 {
                    let mut cycle = stack.clone();
                    cycle.push(origin);
                    found.push(cycle);
                }
                continue;
            }
            if on_path.contains(&next) || edges_used + 1 >= max_length {
                // a detour here could not return to the origin in time
                continue;
            }

            stack.push(next);
            on_path.insert(next);
            self.dfs(graph, origin, max_length, stack, on_path, found, expansions);
            on_path.remove(&next);
            stack.pop();
        }
    }

    /// Cycles through `start` returning at least `min_profit_bps` over the
    /// probe amount, most profitable first
    pub fn profitable_cycles(
        &self,
        graph: &RoutingGraph,
        start: &Pubkey,
        max_length: usize,
        probe_amount: f64,
        min_profit_bps: f64,
    ) -> Vec<ProfitableCycle> {
        let timer = Timer::start("cycle scan");
        let cycles = self.find_cycles(graph, start, max_length);
        let scanned = cycles.len();

        let mut profitable: Vec<ProfitableCycle> = cycles
            .into_iter()
            .filter_map(|cycle| {
                let route = self.evaluator.evaluate(graph, &cycle, probe_amount)?;
                let profit = route.expected_output - probe_amount;
                let profit_bps = profit / probe_amount * 10_000.0;
                (profit > 0.0 && profit_bps >= min_profit_bps).then(|| ProfitableCycle {
                    cycle,
                    route,
                    probe_amount,
                    profit,
                    profit_bps,
                })
            })
            .collect();

        profitable.sort_by(|a, b| {
            b.profit_bps
                .partial_cmp(&a.profit_bps)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cycle.cmp(&b.cycle))
        });
        timer.finish();

        info!(
            "Arbitrage scan from {}: {} cycles, {} above {} bps",
            start,
            scanned,
            profitable.len(),
            min_profit_bps
        );
        profitable
    }
}

/// Whether `b` can be reached from `a` in at most `max_hops` edges
pub fn is_connected(graph: &RoutingGraph, a: &Pubkey, b: &Pubkey, max_hops: usize) -> bool {
    let (Some(source), Some(target)) = (graph.asset_id(a), graph.asset_id(b)) else {
        return false;
    };
    if source == target {
        return true;
    }

    let mut seen = HashSet::from([source]);
    let mut queue = VecDeque::from([(source, 0usize)]);
    while let Some((asset, depth)) = queue.pop_front() {
        if depth == max_hops {
            continue;
        }
        for next in graph.neighbors(asset) {
            if next == target {
                return true;
            }
            if seen.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }
    false
}
