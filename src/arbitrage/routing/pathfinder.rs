// src/arbitrage/routing/pathfinder.rs
//! Candidate path discovery.
//!
//! Two searches run over the same graph and their results are merged:
//! a weighted Dijkstra search for the single cheapest path, and a bounded
//! breadth-first enumeration of every simple path within the hop cap.

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::fmt;

use super::graph::{AssetId, RoutingGraph};
use crate::config::Config;
use crate::error::{Result, RoutingError};
use crate::utils::timing::Timer;

/// Upper bound on partial paths the breadth-first search will expand
const MAX_BFS_EXPANSIONS: usize = 200_000;

/// Ordered sequence of asset mints traversed by a trade.
///
/// An open path never repeats an asset. A closed path (built only by the
/// cycle detector) returns to its first asset and repeats nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path {
    assets: Vec<Pubkey>,
}

impl Path {
    pub fn new(assets: Vec<Pubkey>) -> Result<Self> {
        if assets.len() < 2 {
            return Err(RoutingError::NoRouteFound(
                "a path needs at least two assets".to_string(),
            ));
        }
        if assets.iter().duplicates().next().is_some() {
            return Err(RoutingError::NoRouteFound(
                "a path cannot revisit an asset".to_string(),
            ));
        }
        Ok(Self { assets })
    }

    /// A cycle starting and ending at `assets[0]` with at least three hops
    pub fn closed(assets: Vec<Pubkey>) -> Result<Self> {
        if assets.len() < 4 || assets.first() != assets.last() {
            return Err(RoutingError::NoRouteFound(
                "a cycle needs three hops and must end where it starts".to_string(),
            ));
        }
        if assets[..assets.len() - 1].iter().duplicates().next().is_some() {
            return Err(RoutingError::NoRouteFound(
                "a cycle cannot revisit an intermediate asset".to_string(),
            ));
        }
        Ok(Self { assets })
    }

    pub fn assets(&self) -> &[Pubkey] {
        &self.assets
    }

    pub fn hop_count(&self) -> usize {
        self.assets.len() - 1
    }

    pub fn source(&self) -> Pubkey {
        self.assets[0]
    }

    pub fn destination(&self) -> Pubkey {
        self.assets[self.assets.len() - 1]
    }

    pub fn is_cycle(&self) -> bool {
        self.source() == self.destination()
    }

    /// (asset_in, asset_out) pairs in trade order
    pub fn hops(&self) -> impl Iterator<Item = (Pubkey, Pubkey)> + '_ {
        self.assets.windows(2).map(|pair| (pair[0], pair[1]))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.assets.iter().map(|mint| mint.to_string()).join(" -> ");
        write!(f, "{}", joined)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathfinderConfig {
    pub max_hops: usize,
    pub max_paths: usize,
    pub min_liquidity: Option<f64>,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_hops: 4,
            max_paths: 50,
            min_liquidity: None,
        }
    }
}

impl PathfinderConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_hops: config.max_hops,
            min_liquidity: config.min_liquidity,
            ..Default::default()
        }
    }
}

/// Min-heap entry; ties resolve towards the lower asset id
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    distance: f64,
    asset: AssetId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed for a min-heap
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.asset.cmp(&self.asset))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathFinder {
    config: PathfinderConfig,
}

impl PathFinder {
    pub fn new(config: PathfinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    /// Finds candidate paths with the configured hop cap and liquidity floor
    pub fn find_paths_with_config(
        &self,
        graph: &RoutingGraph,
        from: &Pubkey,
        to: &Pubkey,
    ) -> Vec<Path> {
        self.find_paths(graph, from, to, self.config.max_hops, self.config.min_liquidity)
    }

    /// Union of the weighted shortest path and every simple path of at most
    /// `max_hops` edges, de-duplicated and ordered by (hop count, asset
    /// sequence). Empty when the endpoints coincide or either is isolated.
    pub fn find_paths(
        &self,
        graph: &RoutingGraph,
        from: &Pubkey,
        to: &Pubkey,
        max_hops: usize,
        min_liquidity: Option<f64>,
    ) -> Vec<Path> {
        if from == to || max_hops == 0 {
            return Vec::new();
        }
        let (Some(source), Some(target)) = (graph.asset_id(from), graph.asset_id(to)) else {
            debug!("Path search {} -> {}: endpoint not in graph", from, to);
            return Vec::new();
        };
        if graph.edges_from(source).is_empty() || graph.edges_from(target).is_empty() {
            return Vec::new();
        }

        let mut timer = Timer::start("path search");
        let mut found: Vec<Vec<AssetId>> = Vec::new();

        if let Some(shortest) = self.dijkstra(graph, source, target, min_liquidity) {
            if shortest.len() - 1 <= max_hops {
                found.push(shortest);
            }
        }
        timer.checkpoint("dijkstra");

        found.extend(self.bounded_bfs(graph, source, target, max_hops, min_liquidity));
        timer.checkpoint("bfs");

        let mut paths: Vec<Path> = found
            .into_iter()
            .unique()
            .filter_map(|ids| {
                let mints = ids.iter().map(|&id| graph.asset(id).mint).collect();
                Path::new(mints).ok()
            })
            .collect();
        paths.sort_by(|a, b| {
            a.hop_count()
                .cmp(&b.hop_count())
                .then_with(|| a.assets().cmp(b.assets()))
        });
        paths.truncate(self.config.max_paths.max(1));

        timer.finish();
        debug!(
            "Path search {} -> {} (max {} hops): {} paths",
            from,
            to,
            max_hops,
            paths.len()
        );
        paths
    }

    /// Cheapest path by edge weight, ignoring the hop cap
    fn dijkstra(
        &self,
        graph: &RoutingGraph,
        source: AssetId,
        target: AssetId,
        min_liquidity: Option<f64>,
    ) -> Option<Vec<AssetId>> {
        let n = graph.asset_count();
        let mut distance = vec![f64::INFINITY; n];
        let mut previous: Vec<Option<AssetId>> = vec![None; n];
        let mut settled = vec![false; n];
        let mut heap = BinaryHeap::new();

        distance[source] = 0.0;
        heap.push(QueueEntry {
            distance: 0.0,
            asset: source,
        });

        while let Some(QueueEntry { distance: d, asset }) = heap.pop() {
            if settled[asset] {
                continue;
            }
            settled[asset] = true;
            if asset == target {
                break;
            }

            for next in graph.neighbors(asset) {
                if settled[next] {
                    continue;
                }
                let Some(edge) = graph.lightest_edge_between(asset, next, min_liquidity) else {
                    continue;
                };
                let candidate = d + graph.edge_weight(edge);
                if candidate < distance[next] {
                    distance[next] = candidate;
                    previous[next] = Some(asset);
                    heap.push(QueueEntry {
                        distance: candidate,
                        asset: next,
                    });
                }
            }
        }

        if !settled[target] {
            return None;
        }

        let mut path = vec![target];
        let mut current = target;
        while let Some(prev) = previous[current] {
            path.push(prev);
            current = prev;
        }
        path.reverse();
        (path.first() == Some(&source)).then_some(path)
    }

    /// Every simple path of at most `max_hops` edges
    fn bounded_bfs(
        &self,
        graph: &RoutingGraph,
        source: AssetId,
        target: AssetId,
        max_hops: usize,
        min_liquidity: Option<f64>,
    ) -> Vec<Vec<AssetId>> {
        let mut results = Vec::new();
        let mut queue = VecDeque::new();
        let mut expansions = 0usize;
        queue.push_back(vec![source]);

        while let Some(partial) = queue.pop_front() {
            if partial.len() > max_hops {
                continue;
            }
            expansions += 1;
            if expansions > MAX_BFS_EXPANSIONS {
                debug!(
                    "Breadth-first search stopped after {} expansions",
                    MAX_BFS_EXPANSIONS
                );
                break;
            }

            let last = partial[partial.len() - 1];
            let on_path: HashSet<AssetId> = partial.iter().copied().collect();

            for next in graph.neighbors(last) {
                if on_path.contains(&next) {
                    continue;
                }
                let usable = graph
                    .best_pool_between(last, next)
                    .map(|edge| min_liquidity.map_or(true, |min| graph.edge_liquidity(edge) >= min))
                    .unwrap_or(false);
                if !usable {
                    continue;
                }

                let mut extended = partial.clone();
                extended.push(next);
                if next == target {
                    results.push(extended);
                } else {
                    queue.push_back(extended);
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asset, core_assets, cp_pool, two_hop_pools};
    use pretty_assertions::assert_eq;

    fn finder() -> PathFinder {
        PathFinder::default()
    }

    #[test]
    fn test_two_hop_route_found() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let (usdc, sol, token) = core_assets();

        let paths = finder().find_paths(&graph, &usdc.mint, &token.mint, 2, None);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].assets(), &[usdc.mint, sol.mint, token.mint]);
    }

    #[test]
    fn test_hop_cap_filters_dijkstra_result() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let (usdc, _, token) = core_assets();
        assert!(finder()
            .find_paths(&graph, &usdc.mint, &token.mint, 1, None)
            .is_empty());
    }

    #[test]
    fn test_same_or_unknown_endpoints_yield_nothing() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let (usdc, _, _) = core_assets();
        let stranger = asset("BONK", 5);

        assert!(finder()
            .find_paths(&graph, &usdc.mint, &usdc.mint, 3, None)
            .is_empty());
        assert!(finder()
            .find_paths(&graph, &usdc.mint, &stranger.mint, 3, None)
            .is_empty());
    }

    #[test]
    fn test_paths_sorted_by_hops_then_assets() {
        let (usdc, sol, token) = core_assets();
        let usdt = asset("USDT", 6);
        let pools = vec![
            cp_pool(&usdc, &sol, 1_000_000.0, 10_000.0, 30),
            cp_pool(&sol, &token, 10_000.0, 1_000_000.0, 30),
            cp_pool(&usdc, &usdt, 1_000_000.0, 1_000_000.0, 5),
            cp_pool(&usdt, &token, 1_000_000.0, 1_000_000.0, 30),
            cp_pool(&usdc, &token, 50_000.0, 50_000.0, 100),
        ];
        let graph = RoutingGraph::build(&pools);

        let paths = finder().find_paths(&graph, &usdc.mint, &token.mint, 3, None);
        let expected = vec![
            vec![usdc.mint, token.mint],
            vec![usdc.mint, sol.mint, token.mint],
            vec![usdc.mint, usdt.mint, token.mint],
        ];
        let mut expected_sorted = expected.clone();
        expected_sorted[1..].sort();

        let got: Vec<Vec<Pubkey>> = paths.iter().map(|p| p.assets().to_vec()).collect();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], expected[0]);
        assert_eq!(&got[1..3], &expected_sorted[1..]);
        assert!(paths.iter().all(|p| p.hop_count() <= 3));
        let unique: HashSet<&Path> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
    }

    #[test]
    fn test_min_liquidity_prunes_thin_pools() {
        let (usdc, sol, token) = core_assets();
        let pools = vec![
            cp_pool(&usdc, &sol, 1_000_000.0, 10_000.0, 30),
            cp_pool(&sol, &token, 100.0, 100.0, 30),
        ];
        let graph = RoutingGraph::build(&pools);
        assert!(finder()
            .find_paths(&graph, &usdc.mint, &token.mint, 3, Some(1_000.0))
            .is_empty());
        assert_eq!(
            finder()
                .find_paths(&graph, &usdc.mint, &token.mint, 3, None)
                .len(),
            1
        );
    }

    #[test]
    fn test_path_validation() {
        let (usdc, sol, token) = core_assets();
        assert!(Path::new(vec![usdc.mint]).is_err());
        assert!(Path::new(vec![usdc.mint, sol.mint, usdc.mint]).is_err());
        let cycle = Path::closed(vec![usdc.mint, sol.mint, token.mint, usdc.mint]).unwrap();
        assert!(cycle.is_cycle());
        assert_eq!(cycle.hop_count(), 3);
        assert!(Path::closed(vec![usdc.mint, sol.mint, usdc.mint]).is_err());
    }
}
