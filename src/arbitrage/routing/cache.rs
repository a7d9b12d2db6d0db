// src/arbitrage/routing/cache.rs
//! Pool snapshot cache and short-lived route cache.
//!
//! The pool cache owns the only mutable state in routing: an
//! `Arc<PoolSnapshot>` replaced wholesale on refresh, so readers always see a
//! complete snapshot and its graph together. Time comes from an injected
//! `Clock` so expiry is testable.

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::evaluator::Route;
use super::graph::RoutingGraph;
use crate::config::Config;
use crate::dex::pool::{Asset, Pool, PoolKind};
use crate::error::{Result, RoutingError};

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Source of pool snapshots
#[async_trait]
pub trait PoolDataProvider: Send + Sync {
    async fn load_pools(&self) -> Result<Vec<Pool>>;
}

/// In-memory provider; pools can be replaced between loads
#[derive(Debug, Default)]
pub struct StaticPoolProvider {
    pools: std::sync::RwLock<Vec<Pool>>,
    loads: AtomicUsize,
    latency_ms: AtomicU64,
}

impl StaticPoolProvider {
    pub fn new(pools: Vec<Pool>) -> Self {
        Self {
            pools: std::sync::RwLock::new(pools),
            loads: AtomicUsize::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn set_pools(&self, pools: Vec<Pool>) {
        match self.pools.write() {
            Ok(mut guard) => *guard = pools,
            Err(poisoned) => *poisoned.into_inner() = pools,
        }
    }

    /// Delay every later load by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolDataProvider for StaticPoolProvider {
    async fn load_pools(&self) -> Result<Vec<Pool>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let pools = match self.pools.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(pools)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
}

/// On-disk pool layout with base58 keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub address: String,
    pub asset_a: AssetRecord,
    pub asset_b: AssetRecord,
    pub reserve_a: f64,
    pub reserve_b: f64,
    pub fee_bps: u16,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub last_update_timestamp: u64,
    #[serde(default = "default_kind")]
    pub kind: PoolKind,
}

fn default_kind() -> PoolKind {
    PoolKind::ConstantProduct
}

fn parse_key(raw: &str, what: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw).map_err(|e| {
        RoutingError::PoolDataUnavailable(format!("invalid {} key '{}': {}", what, raw, e))
    })
}

impl AssetRecord {
    fn into_asset(self) -> Result<Asset> {
        Ok(Asset::new(parse_key(&self.mint, "mint")?, self.symbol, self.decimals))
    }
}

impl PoolRecord {
    pub fn into_pool(self) -> Result<Pool> {
        Ok(Pool {
            address: parse_key(&self.address, "pool")?,
            asset_a: self.asset_a.into_asset()?,
            asset_b: self.asset_b.into_asset()?,
            reserve_a: self.reserve_a,
            reserve_b: self.reserve_b,
            fee_bps: self.fee_bps,
            volume_24h: self.volume_24h,
            last_update_timestamp: self.last_update_timestamp,
            kind: self.kind,
        })
    }

    pub fn from_pool(pool: &Pool) -> Self {
        let record = |asset: &Asset| AssetRecord {
            mint: asset.mint.to_string(),
            symbol: asset.symbol.clone(),
            decimals: asset.decimals,
        };
        Self {
            address: pool.address.to_string(),
            asset_a: record(&pool.asset_a),
            asset_b: record(&pool.asset_b),
            reserve_a: pool.reserve_a,
            reserve_b: pool.reserve_b,
            fee_bps: pool.fee_bps,
            volume_24h: pool.volume_24h,
            last_update_timestamp: pool.last_update_timestamp,
            kind: pool.kind,
        }
    }
}

/// Reads a JSON array of `PoolRecord`s on every load
#[derive(Debug, Clone)]
pub struct JsonFilePoolProvider {
    path: PathBuf,
}

impl JsonFilePoolProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PoolDataProvider for JsonFilePoolProvider {
    async fn load_pools(&self) -> Result<Vec<Pool>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading pool file {}", self.path.display()))?;
        let records: Vec<PoolRecord> = serde_json::from_str(&raw)?;
        let pools = records
            .into_iter()
            .map(PoolRecord::into_pool)
            .collect::<Result<Vec<_>>>()?;
        debug!("Loaded {} pools from {}", pools.len(), self.path.display());
        Ok(pools)
    }
}

/// An immutable pool snapshot and the graph built from it
#[derive(Debug)]
pub struct PoolSnapshot {
    pub graph: RoutingGraph,
    pub fetched_at_ms: u64,
    pub version: u64,
}

impl PoolSnapshot {
    pub fn pools(&self) -> &[Pool] {
        self.graph.pools()
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.fetched_at_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub pool_ttl: Duration,
    pub route_ttl: Duration,
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_ttl: Duration::from_millis(5_000),
            route_ttl: Duration::from_millis(2_000),
            fetch_timeout: Duration::from_millis(3_000),
        }
    }
}

impl CacheConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pool_ttl: config.pool_cache_ttl(),
            route_ttl: config.route_cache_ttl(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

pub struct PoolDataCache {
    provider: Arc<dyn PoolDataProvider>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    current: RwLock<Option<Arc<PoolSnapshot>>>,
    refresh_lock: Mutex<()>,
    stale: AtomicBool,
    next_version: AtomicU64,
}

impl std::fmt::Debug for PoolDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolDataCache")
            .field("config", &self.config)
            .field("stale", &self.stale.load(Ordering::SeqCst))
            .field("next_version", &self.next_version.load(Ordering::SeqCst))
            .finish()
    }
}

impl PoolDataCache {
    pub fn new(provider: Arc<dyn PoolDataProvider>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            provider,
            clock,
            config,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            stale: AtomicBool::new(false),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Latest snapshot without refreshing
    pub async fn current(&self) -> Option<Arc<PoolSnapshot>> {
        self.current.read().await.clone()
    }

    /// Marks the current snapshot stale; the next read reloads pools
    pub fn invalidate(&self) {
        debug!("Pool snapshot invalidated");
        self.stale.store(true, Ordering::SeqCst);
    }

    async fn fresh_snapshot(&self) -> Option<Arc<PoolSnapshot>> {
        if self.stale.load(Ordering::SeqCst) {
            return None;
        }
        let now = self.clock.now_ms();
        let ttl = self.config.pool_ttl.as_millis() as u64;
        self.current
            .read()
            .await
            .as_ref()
            .filter(|snapshot| snapshot.age_ms(now) < ttl)
            .cloned()
    }

    /// Current snapshot if younger than the TTL, otherwise a freshly loaded
    /// one. Concurrent callers share a single reload.
    pub async fn get_or_refresh(&self) -> Result<Arc<PoolSnapshot>> {
        if let Some(snapshot) = self.fresh_snapshot().await {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(snapshot) = self.fresh_snapshot().await {
            return Ok(snapshot);
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<Arc<PoolSnapshot>> {
        self.stale.store(false, Ordering::SeqCst);
        let pools = match tokio::time::timeout(self.config.fetch_timeout, self.provider.load_pools())
            .await
        {
            Ok(Ok(pools)) => pools,
            Ok(Err(e)) => {
                warn!("Pool refresh failed: {}", e);
                self.stale.store(true, Ordering::SeqCst);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "Pool refresh timed out after {}ms",
                    self.config.fetch_timeout.as_millis()
                );
                self.stale.store(true, Ordering::SeqCst);
                return Err(RoutingError::Timeout(format!(
                    "pool data fetch exceeded {}ms",
                    self.config.fetch_timeout.as_millis()
                )));
            }
        };

        let graph = RoutingGraph::build(&pools);
        let snapshot = Arc::new(PoolSnapshot {
            graph,
            fetched_at_ms: self.clock.now_ms(),
            version: self.next_version.fetch_add(1, Ordering::SeqCst),
        });
        *self.current.write().await = Some(snapshot.clone());

        info!(
            "Pool snapshot v{} loaded: {} pools, {} assets",
            snapshot.version,
            snapshot.graph.pool_count(),
            snapshot.graph.asset_count()
        );
        Ok(snapshot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteCacheKey {
    pub from: Pubkey,
    pub to: Pubkey,
    pub amount_bits: u64,
    pub max_hops: usize,
    pub min_liquidity_bits: Option<u64>,
}

impl RouteCacheKey {
    pub fn new(from: Pubkey, to: Pubkey, amount: f64, max_hops: usize, min_liquidity: Option<f64>) -> Self {
        Self {
            from,
            to,
            amount_bits: amount.to_bits(),
            max_hops,
            min_liquidity_bits: min_liquidity.map(f64::to_bits),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedRoutes {
    routes: Vec<Route>,
    cached_at_ms: u64,
}

/// Evaluated routes keyed by request, valid for one snapshot version and TTL
pub struct RouteCache {
    entries: DashMap<RouteCacheKey, CachedRoutes>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot_version: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

impl RouteCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            ttl,
            snapshot_version: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Drops everything when `version` differs from the one cached against
    fn sync_version(&self, version: u64) {
        let previous = self.snapshot_version.swap(version, Ordering::SeqCst);
        if previous != version {
            self.entries.clear();
        }
    }

    pub fn get(&self, key: &RouteCacheKey, snapshot_version: u64) -> Option<Vec<Route>> {
        self.sync_version(snapshot_version);
        let now = self.clock.now_ms();
        let ttl = self.ttl.as_millis() as u64;

        let hit = self
            .entries
            .get(key)
            .filter(|entry| now.saturating_sub(entry.cached_at_ms) < ttl)
            .map(|entry| entry.routes.clone());

        match hit {
            Some(routes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(routes)
            }
            None => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: RouteCacheKey, routes: Vec<Route>, snapshot_version: u64) {
        self.sync_version(snapshot_version);
        self.entries.insert(
            key,
            CachedRoutes {
                routes,
                cached_at_ms: self.clock.now_ms(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
