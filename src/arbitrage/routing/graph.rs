// src/arbitrage/routing/graph.rs
//! Routing graph over a pool snapshot.
//!
//! Assets live in an arena addressed by dense `AssetId`s (assigned in mint
//! order, so comparing ids compares mints). Each pool is one undirected edge;
//! edge attributes are parallel arrays addressed by `EdgeId`, indexed both by
//! endpoint pair and by single endpoint. The graph is rebuilt wholesale from
//! every new snapshot and never mutated afterwards.

use log::{debug, warn};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::dex::pool::{Asset, Pool};
use crate::utils::timing::Timer;

pub type AssetId = usize;
pub type EdgeId = usize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStats {
    pub asset_count: usize,
    pub pool_count: usize,
    pub edge_count: usize,
    pub skipped_pools: usize,
    pub total_liquidity: f64,
    pub average_liquidity: f64,
    pub connectivity_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingGraph {
    assets: Vec<Asset>,
    asset_index: HashMap<Pubkey, AssetId>,
    pools: Vec<Pool>,
    edge_a: Vec<AssetId>,
    edge_b: Vec<AssetId>,
    edge_weight: Vec<f64>,
    edge_liquidity: Vec<f64>,
    pair_index: HashMap<(AssetId, AssetId), Vec<EdgeId>>,
    adjacency: Vec<Vec<EdgeId>>,
    skipped_pools: usize,
}

/// Lower bound on every edge weight
pub const MIN_EDGE_WEIGHT: f64 = 1e-12;

/// `fee + 1 / (ln(1 + liquidity) + 1)`: strictly positive, cheaper for deep
/// pools and pricier for high fees
pub fn edge_weight(fee_rate: f64, liquidity: f64) -> f64 {
    let weight = fee_rate + 1.0 / ((1.0 + liquidity.max(0.0)).ln() + 1.0);
    if weight.is_finite() {
        weight.max(MIN_EDGE_WEIGHT)
    } else {
        MIN_EDGE_WEIGHT
    }
}

fn pair_key(a: AssetId, b: AssetId) -> (AssetId, AssetId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl RoutingGraph {
    /// Builds the graph from a pool snapshot. Pools whose sides coincide,
    /// whose reserves are not finite, or whose address repeats are skipped.
    /// Fewer than two distinct assets yields an empty graph.
    pub fn build(pools: &[Pool]) -> Self {
        let timer = Timer::start("routing graph build");
        let mut skipped = 0usize;
        let mut seen_addresses = HashMap::new();
        let mut accepted: Vec<&Pool> = Vec::with_capacity(pools.len());

        for pool in pools {
            if !pool.is_well_formed() {
                warn!(
                    "Skipping malformed pool {} ({} / {})",
                    pool.address, pool.asset_a.symbol, pool.asset_b.symbol
                );
                skipped += 1;
                continue;
            }
            if seen_addresses.insert(pool.address, ()).is_some() {
                warn!("Skipping duplicate pool {}", pool.address);
                skipped += 1;
                continue;
            }
            accepted.push(pool);
        }

        let mut distinct: BTreeMap<Pubkey, &Asset> = BTreeMap::new();
        for pool in &accepted {
            distinct.entry(pool.asset_a.mint).or_insert(&pool.asset_a);
            distinct.entry(pool.asset_b.mint).or_insert(&pool.asset_b);
        }

        if distinct.len() < 2 {
            debug!(
                "Pool snapshot has {} distinct assets; routing graph left empty",
                distinct.len()
            );
            return Self {
                skipped_pools: skipped,
                ..Self::default()
            };
        }

        let assets: Vec<Asset> = distinct.into_values().cloned().collect();
        let asset_index: HashMap<Pubkey, AssetId> = assets
            .iter()
            .enumerate()
            .map(|(id, asset)| (asset.mint, id))
            .collect();

        let mut graph = Self {
            adjacency: vec![Vec::new(); assets.len()],
            assets,
            asset_index,
            skipped_pools: skipped,
            ..Self::default()
        };

        for pool in accepted {
            // both sides were collected above
            let (Some(&a), Some(&b)) = (
                graph.asset_index.get(&pool.asset_a.mint),
                graph.asset_index.get(&pool.asset_b.mint),
            ) else {
                continue;
            };

            let edge = graph.pools.len();
            let liquidity = pool.liquidity();
            graph.edge_a.push(a);
            graph.edge_b.push(b);
            graph.edge_liquidity.push(liquidity);
            graph.edge_weight.push(edge_weight(pool.fee_rate(), liquidity));
            graph.pair_index.entry(pair_key(a, b)).or_default().push(edge);
            graph.adjacency[a].push(edge);
            graph.adjacency[b].push(edge);
            graph.pools.push(pool.clone());
        }

        timer.finish();
        debug!(
            "Built routing graph: {} assets, {} pools, {} skipped",
            graph.assets.len(),
            graph.pools.len(),
            graph.skipped_pools
        );
        graph
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn asset_id(&self, mint: &Pubkey) -> Option<AssetId> {
        self.asset_index.get(mint).copied()
    }

    pub fn asset(&self, id: AssetId) -> &Asset {
        &self.assets[id]
    }

    pub fn pool(&self, edge: EdgeId) -> &Pool {
        &self.pools[edge]
    }

    pub fn edge_weight(&self, edge: EdgeId) -> f64 {
        self.edge_weight[edge]
    }

    pub fn edge_liquidity(&self, edge: EdgeId) -> f64 {
        self.edge_liquidity[edge]
    }

    pub fn edges_from(&self, asset: AssetId) -> &[EdgeId] {
        self.adjacency.get(asset).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The endpoint of `edge` that is not `from`
    pub fn other_end(&self, edge: EdgeId, from: AssetId) -> AssetId {
        if self.edge_a[edge] == from {
            self.edge_b[edge]
        } else {
            self.edge_a[edge]
        }
    }

    pub fn pools_between(&self, a: AssetId, b: AssetId) -> &[EdgeId] {
        self.pair_index
            .get(&pair_key(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct neighbours of `asset`, ascending
    pub fn neighbors(&self, asset: AssetId) -> Vec<AssetId> {
        let mut out: Vec<AssetId> = self
            .edges_from(asset)
            .iter()
            .map(|&edge| self.other_end(edge, asset))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Deepest pool between two assets; ties go to the lower fee, then the
    /// lower address
    pub fn best_pool_between(&self, a: AssetId, b: AssetId) -> Option<EdgeId> {
        self.pools_between(a, b).iter().copied().max_by(|&x, &y| {
            self.edge_liquidity[x]
                .partial_cmp(&self.edge_liquidity[y])
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.pools[y].fee_bps.cmp(&self.pools[x].fee_bps))
                .then_with(|| self.pools[y].address.cmp(&self.pools[x].address))
        })
    }

    /// Lowest-weight pool between two assets whose liquidity is at least
    /// `min_liquidity`
    pub fn lightest_edge_between(
        &self,
        a: AssetId,
        b: AssetId,
        min_liquidity: Option<f64>,
    ) -> Option<EdgeId> {
        self.pools_between(a, b)
            .iter()
            .copied()
            .filter(|&edge| min_liquidity.map_or(true, |min| self.edge_liquidity[edge] >= min))
            .min_by(|&x, &y| {
                self.edge_weight[x]
                    .partial_cmp(&self.edge_weight[y])
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| self.pools[x].address.cmp(&self.pools[y].address))
            })
    }

    /// Share of asset pairs directly connected by at least one pool
    pub fn connectivity_score(&self) -> f64 {
        let n = self.assets.len() as f64;
        if n <= 1.0 {
            return 0.0;
        }
        let possible_pairs = n * (n - 1.0) / 2.0;
        (self.pair_index.len() as f64 / possible_pairs).min(1.0)
    }

    pub fn stats(&self) -> GraphStats {
        let total_liquidity: f64 = self.edge_liquidity.iter().sum();
        GraphStats {
            asset_count: self.assets.len(),
            pool_count: self.pools.len(),
            edge_count: self.pair_index.len(),
            skipped_pools: self.skipped_pools,
            total_liquidity,
            average_liquidity: if self.pools.is_empty() {
                0.0
            } else {
                total_liquidity / self.pools.len() as f64
            },
            connectivity_score: self.connectivity_score(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asset, core_assets, cp_pool, cp_pool_labelled, two_hop_pools};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_indexes_assets_and_edges() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let (usdc, sol, token) = core_assets();

        assert_eq!(graph.asset_count(), 3);
        assert_eq!(graph.pool_count(), 2);

        let u = graph.asset_id(&usdc.mint).unwrap();
        let s = graph.asset_id(&sol.mint).unwrap();
        let t = graph.asset_id(&token.mint).unwrap();
        let mut expected = vec![t, u];
        expected.sort();
        assert_eq!(graph.neighbors(s), expected);
        assert_eq!(graph.pools_between(u, s).len(), 1);
        assert_eq!(graph.pools_between(s, u).len(), 1);
        assert!(graph.pools_between(u, t).is_empty());
    }

    #[test]
    fn test_asset_ids_follow_mint_order() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let mints: Vec<Pubkey> = graph.assets().iter().map(|a| a.mint).collect();
        let mut sorted = mints.clone();
        sorted.sort();
        assert_eq!(mints, sorted);
    }

    #[test]
    fn test_edge_weight_monotonic() {
        assert!(edge_weight(0.003, 1_000.0) > edge_weight(0.003, 1_000_000.0));
        assert!(edge_weight(0.01, 1_000.0) > edge_weight(0.003, 1_000.0));
        assert!(edge_weight(0.0, f64::MAX / 2.0) > 0.0);
        assert!(edge_weight(0.0, 0.0) > 0.0);
        assert!(edge_weight(0.0, f64::INFINITY) >= MIN_EDGE_WEIGHT);
    }

    #[test]
    fn test_huge_reserves_keep_weights_positive() {
        let (usdc, sol, _) = core_assets();
        let pool = cp_pool(&usdc, &sol, 1e200, 1e200, 0);
        assert!(pool.liquidity().is_finite());
        assert!((pool.liquidity() / 1e200 - 1.0).abs() < 1e-12);

        let graph = RoutingGraph::build(&[pool]);
        assert_eq!(graph.pool_count(), 1);
        assert!(graph.edge_liquidity(0).is_finite());
        assert!(graph.edge_weight(0) > 0.0);
    }

    #[test]
    fn test_degenerate_snapshots_build_empty_graphs() {
        assert!(RoutingGraph::build(&[]).is_empty());

        let usdc = asset("USDC", 6);
        let self_pool = cp_pool(&usdc, &usdc, 100.0, 100.0, 30);
        let graph = RoutingGraph::build(&[self_pool]);
        assert!(graph.is_empty());
        assert_eq!(graph.asset_count(), 0);
        assert_eq!(graph.stats().skipped_pools, 1);
    }

    #[test]
    fn test_parallel_pools_and_best_selection() {
        let (usdc, sol, _) = core_assets();
        let shallow = cp_pool_labelled("shallow", &usdc, &sol, 10_000.0, 100.0, 5);
        let deep = cp_pool_labelled("deep", &usdc, &sol, 1_000_000.0, 10_000.0, 30);
        let graph = RoutingGraph::build(&[shallow.clone(), deep.clone()]);

        let u = graph.asset_id(&usdc.mint).unwrap();
        let s = graph.asset_id(&sol.mint).unwrap();
        assert_eq!(graph.pools_between(u, s).len(), 2);

        let best = graph.best_pool_between(u, s).unwrap();
        assert_eq!(graph.pool(best).address, deep.address);

        let filtered = graph.lightest_edge_between(u, s, Some(50_000.0)).unwrap();
        assert_eq!(graph.pool(filtered).address, deep.address);
        assert!(graph.lightest_edge_between(u, s, Some(1e9)).is_none());
    }

    #[test]
    fn test_duplicate_addresses_are_skipped() {
        let pools = two_hop_pools();
        let doubled: Vec<Pool> = pools.iter().chain(pools.iter()).cloned().collect();
        let graph = RoutingGraph::build(&doubled);
        assert_eq!(graph.pool_count(), 2);
        assert_eq!(graph.stats().skipped_pools, 2);
    }

    #[test]
    fn test_input_pools_unchanged() {
        let pools = two_hop_pools();
        let before = pools.clone();
        let _ = RoutingGraph::build(&pools);
        assert_eq!(pools, before);
    }

    #[test]
    fn test_connectivity_score() {
        let graph = RoutingGraph::build(&two_hop_pools());
        let stats = graph.stats();
        assert_eq!(stats.edge_count, 2);
        assert!((stats.connectivity_score - 2.0 / 3.0).abs() < 1e-12);
    }
}
