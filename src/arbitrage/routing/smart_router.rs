// src/arbitrage/routing/smart_router.rs
//! Smart Router - single entry point tying the routing components together
//!
//! Pool snapshots come from the `PoolDataCache`; every request runs against
//! one immutable snapshot:
//! - candidate paths from the `PathFinder`
//! - pricing and constraint filtering through the `RouteEvaluator`
//! - order splitting through the `RouteSplitter`
//! - simulate-then-execute through the `RouteExecutor`
//! - cycle scans through the `CycleDetector`

use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::cache::{
    CacheConfig, Clock, PoolDataCache, PoolDataProvider, PoolSnapshot, RouteCache,
    RouteCacheKey, SystemClock,
};
use super::evaluator::{EvaluatorConfig, Route, RouteEvaluator};
use super::executor::{
    check_tolerance, ExecutionResult, ExecutionStatus, ExecutorConfig, RouteExecutor, RoutePlan,
    SimulationOutcome, TradeExecutor,
};
use super::pathfinder::{PathFinder, PathfinderConfig};
use super::splitter::{RouteSplitter, SplitPlan, SplitterConfig};
use crate::arbitrage::detector::{CycleDetector, ProfitableCycle};
use crate::config::Config;
use crate::error::{Result, RoutingError};
use crate::utils::timing::Timer;

/// Smart router configuration combining all sub-component configs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartRouterConfig {
    pub pathfinder: PathfinderConfig,
    pub evaluator: EvaluatorConfig,
    pub splitter: SplitterConfig,
    pub executor: ExecutorConfig,
    pub cache: CacheConfig,
    /// Routes handed to the splitter by default
    pub max_routes: usize,
    pub default_slippage_tolerance: f64,
    /// Input size used to price arbitrage cycles
    pub arbitrage_probe_amount: f64,
}

impl Default for SmartRouterConfig {
    fn default() -> Self {
        Self {
            pathfinder: PathfinderConfig::default(),
            evaluator: EvaluatorConfig::default(),
            splitter: SplitterConfig::default(),
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
            max_routes: 4,
            default_slippage_tolerance: 0.01,
            arbitrage_probe_amount: 100.0,
        }
    }
}

impl SmartRouterConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pathfinder: PathfinderConfig::from_config(config),
            evaluator: EvaluatorConfig::from_config(config),
            splitter: SplitterConfig::from_config(config),
            executor: ExecutorConfig::from_config(config),
            cache: CacheConfig::from_config(config),
            max_routes: config.max_routes,
            default_slippage_tolerance: config.slippage_tolerance,
            ..Self::default()
        }
    }
}

/// Filters applied to evaluated routes. Percentages are on a 0-100 scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConstraints {
    pub max_price_impact_pct: Option<f64>,
    pub min_output: Option<f64>,
    /// Every pool on the route must be at least this deep
    pub min_liquidity: Option<f64>,
    pub max_fee_pct: Option<f64>,
}

impl RouteConstraints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_price_impact_pct(mut self, pct: f64) -> Self {
        self.max_price_impact_pct = Some(pct);
        self
    }

    pub fn with_min_output(mut self, amount: f64) -> Self {
        self.min_output = Some(amount);
        self
    }

    pub fn with_min_liquidity(mut self, liquidity: f64) -> Self {
        self.min_liquidity = Some(liquidity);
        self
    }

    pub fn with_max_fee_pct(mut self, pct: f64) -> Self {
        self.max_fee_pct = Some(pct);
        self
    }

    /// Why `route` is rejected, if it is
    pub fn check(&self, route: &Route) -> Result<()> {
        if let Some(limit) = self.max_price_impact_pct {
            if route.total_price_impact_pct > limit {
                return Err(RoutingError::ExcessivePriceImpact {
                    impact_pct: route.total_price_impact_pct,
                    limit_pct: limit,
                });
            }
        }
        if let Some(min) = self.min_liquidity {
            if route.min_pool_liquidity() < min {
                return Err(RoutingError::InsufficientLiquidity(format!(
                    "shallowest pool holds {:.2}, need {:.2}",
                    route.min_pool_liquidity(),
                    min
                )));
            }
        }
        if let Some(min) = self.min_output {
            if route.expected_output < min {
                return Err(RoutingError::InsufficientLiquidity(format!(
                    "output {:.6} below minimum {:.6}",
                    route.expected_output, min
                )));
            }
        }
        if let Some(max) = self.max_fee_pct {
            if route.total_fee_pct > max {
                return Err(RoutingError::NoRouteFound(format!(
                    "fees {:.4}% above limit {:.4}%",
                    route.total_fee_pct, max
                )));
            }
        }
        Ok(())
    }

    pub fn accepts(&self, route: &Route) -> bool {
        self.check(route).is_ok()
    }
}

/// Point-in-time copy of the router counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterMetrics {
    pub route_requests: u64,
    pub route_cache_hits: u64,
    pub route_cache_misses: u64,
    pub routes_found: u64,
    pub no_route: u64,
    pub executions: u64,
    pub confirmed: u64,
    pub partial_fills: u64,
    pub failed: u64,
    pub needs_reconciliation: u64,
    pub arbitrage_scans: u64,
}

#[derive(Debug, Default)]
struct Counters {
    route_requests: AtomicU64,
    routes_found: AtomicU64,
    no_route: AtomicU64,
    executions: AtomicU64,
    confirmed: AtomicU64,
    partial_fills: AtomicU64,
    failed: AtomicU64,
    needs_reconciliation: AtomicU64,
    arbitrage_scans: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Best route: highest output, then highest confidence, then path order
fn compare_routes(a: &Route, b: &Route) -> CmpOrdering {
    b.expected_output
        .partial_cmp(&a.expected_output)
        .unwrap_or(CmpOrdering::Equal)
        .then_with(|| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(CmpOrdering::Equal)
        })
        .then_with(|| a.path.cmp(&b.path))
}

/// Smart Router - main coordination system
pub struct SmartRouter {
    config: SmartRouterConfig,
    pool_cache: PoolDataCache,
    route_cache: RouteCache,
    pathfinder: PathFinder,
    evaluator: RouteEvaluator,
    splitter: RouteSplitter,
    executor: RouteExecutor,
    detector: CycleDetector,
    counters: Counters,
}

impl std::fmt::Debug for SmartRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRouter")
            .field("config", &self.config)
            .field("pool_cache", &self.pool_cache)
            .field("route_cache", &self.route_cache)
            .finish()
    }
}

impl SmartRouter {
    pub fn new(
        config: SmartRouterConfig,
        provider: Arc<dyn PoolDataProvider>,
        trade_executor: Arc<dyn TradeExecutor>,
    ) -> Self {
        Self::with_clock(config, provider, trade_executor, Arc::new(SystemClock))
    }

    /// Same as `new` with an explicit clock for cache expiry
    pub fn with_clock(
        config: SmartRouterConfig,
        provider: Arc<dyn PoolDataProvider>,
        trade_executor: Arc<dyn TradeExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let evaluator = RouteEvaluator::new(config.evaluator.clone());
        info!(
            "SmartRouter initialized: max_hops={}, max_paths={}, max_splits={}, drift limit={:.2}%",
            config.pathfinder.max_hops,
            config.pathfinder.max_paths,
            config.splitter.max_splits,
            config.executor.max_simulation_drift * 100.0
        );
        Self {
            pool_cache: PoolDataCache::new(provider, clock.clone(), config.cache.clone()),
            route_cache: RouteCache::new(clock, config.cache.route_ttl),
            pathfinder: PathFinder::new(config.pathfinder.clone()),
            splitter: RouteSplitter::new(config.splitter.clone(), evaluator.clone()),
            executor: RouteExecutor::new(config.executor.clone(), evaluator.clone(), trade_executor),
            detector: CycleDetector::new(evaluator.clone()),
            evaluator,
            counters: Counters::default(),
            config,
        }
    }

    pub fn config(&self) -> &SmartRouterConfig {
        &self.config
    }

    /// Latest pool snapshot, reloading it if expired or invalidated
    pub async fn snapshot(&self) -> Result<Arc<PoolSnapshot>> {
        self.pool_cache.get_or_refresh().await
    }

    /// Signals that pool data changed; the next request reloads pools and
    /// drops cached routes
    pub fn invalidate_pools(&self) {
        self.pool_cache.invalidate();
        self.route_cache.clear();
    }

    fn validate_amount(amount: f64) -> Result<()> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(RoutingError::InvalidAmount(format!(
                "trade amount must be positive, got {}",
                amount
            )));
        }
        Ok(())
    }

    /// Every viable route for the request, best first
    async fn ranked_routes(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        amount: f64,
        max_hops: usize,
        min_liquidity: Option<f64>,
    ) -> Result<Vec<Route>> {
        bump(&self.counters.route_requests);
        Self::validate_amount(amount)?;
        let snapshot = self.snapshot().await?;
        if let Some(missing) = [from, to]
            .into_iter()
            .find(|mint| snapshot.graph.asset_id(mint).is_none())
        {
            debug!("No pool in the snapshot touches {}", missing);
            return Ok(Vec::new());
        }

        let min_liquidity = min_liquidity.or(self.config.pathfinder.min_liquidity);
        let key = RouteCacheKey::new(*from, *to, amount, max_hops, min_liquidity);
        if let Some(routes) = self.route_cache.get(&key, snapshot.version) {
            debug!("Route cache hit for {} -> {} ({})", from, to, amount);
            return Ok(routes);
        }

        let timer = Timer::start("route search");
        let paths = self
            .pathfinder
            .find_paths(&snapshot.graph, from, to, max_hops, min_liquidity);
        let mut routes = self.evaluator.evaluate_all(&snapshot.graph, &paths, amount);
        routes.sort_by(compare_routes);
        timer.finish();

        debug!(
            "{} paths, {} viable routes for {} -> {}",
            paths.len(),
            routes.len(),
            from,
            to
        );
        self.route_cache.insert(key, routes.clone(), snapshot.version);
        Ok(routes)
    }

    /// Best route satisfying `constraints`; `Ok(None)` when nothing qualifies
    pub async fn find_best_route(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        amount: f64,
        max_hops: usize,
        constraints: &RouteConstraints,
    ) -> Result<Option<Route>> {
        let routes = self
            .ranked_routes(from, to, amount, max_hops, constraints.min_liquidity)
            .await?;
        let rejection = routes.first().and_then(|route| constraints.check(route).err());
        let best = routes.into_iter().find(|route| constraints.accepts(route));

        match &best {
            Some(route) => {
                bump(&self.counters.routes_found);
                info!(
                    "Best route {} -> {}: {} hops, {:.6} out, impact {:.4}%, confidence {:.1}",
                    from,
                    to,
                    route.hop_count(),
                    route.expected_output,
                    route.total_price_impact_pct,
                    route.confidence_score
                );
            }
            None => {
                bump(&self.counters.no_route);
                match rejection {
                    Some(reason) => info!(
                        "No route {} -> {} for {} satisfies constraints; best candidate: {}",
                        from, to, amount, reason
                    ),
                    None => info!("No path {} -> {} for {}", from, to, amount),
                }
            }
        }
        Ok(best)
    }

    /// Up to `max_routes` viable routes on distinct paths, best first
    pub async fn find_routes_for_split(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        amount: f64,
        max_routes: usize,
        max_hops: usize,
    ) -> Result<Vec<Route>> {
        let routes: Vec<Route> = self
            .ranked_routes(from, to, amount, max_hops, None)
            .await?
            .into_iter()
            .unique_by(|route| route.path.clone())
            .take(max_routes)
            .collect();
        if routes.is_empty() {
            bump(&self.counters.no_route);
        } else {
            bump(&self.counters.routes_found);
        }
        Ok(routes)
    }

    pub async fn optimize_split(&self, routes: &[Route], total_amount: f64) -> Result<SplitPlan> {
        let snapshot = self.snapshot().await?;
        let plan = self.splitter.split(&snapshot.graph, routes, total_amount)?;
        info!(
            "Split plan {}: {} allocation(s), {:.6} out ({:+.4}% vs single route)",
            plan.id,
            plan.allocations.len(),
            plan.total_expected_output,
            plan.improvement_over_single_pct
        );
        Ok(plan)
    }

    /// Re-prices a route or plan against the latest pool data
    pub async fn simulate(&self, plan: &RoutePlan) -> Result<SimulationOutcome> {
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e @ RoutingError::Timeout(_)) => return Ok(SimulationOutcome::failed(e)),
            Err(e) => return Err(e),
        };
        Ok(self.executor.simulate(plan, &snapshot.graph))
    }

    /// Simulates and executes `plan`; `None` uses the configured tolerance
    pub async fn execute(
        &self,
        plan: &RoutePlan,
        slippage_tolerance: Option<f64>,
    ) -> Result<ExecutionResult> {
        let tolerance = slippage_tolerance.unwrap_or(self.config.default_slippage_tolerance);
        check_tolerance(tolerance)?;
        bump(&self.counters.executions);

        let timer = Timer::start("route execution");
        let result = match self.snapshot().await {
            Ok(snapshot) => self.executor.execute(plan, &snapshot.graph, tolerance).await?,
            Err(e @ RoutingError::Timeout(_)) => self.executor.reject(plan, e),
            Err(e) => return Err(e),
        };
        timer.finish_with_threshold(self.config.executor.confirm_timeout);
        match result.status {
            ExecutionStatus::Confirmed => bump(&self.counters.confirmed),
            ExecutionStatus::PartialFill => bump(&self.counters.partial_fills),
            ExecutionStatus::Failed => bump(&self.counters.failed),
            ExecutionStatus::NeedsReconciliation => bump(&self.counters.needs_reconciliation),
        }
        if !result.receipts.is_empty() {
            // funds moved, so cached quotes no longer describe the pools
            self.invalidate_pools();
        }
        if !result.is_success() {
            warn!(
                "Execution {} finished {:?} after {} retries",
                result.id, result.status, result.retries_used
            );
        }
        Ok(result)
    }

    /// Cycles through `start` of up to `max_hops` edges that return at least
    /// `min_profit_bps` on the configured probe amount
    pub async fn find_arbitrage(
        &self,
        start: &Pubkey,
        min_profit_bps: f64,
        max_hops: usize,
    ) -> Result<Vec<ProfitableCycle>> {
        bump(&self.counters.arbitrage_scans);
        let snapshot = self.snapshot().await?;
        if snapshot.graph.asset_id(start).is_none() {
            debug!("No pool in the snapshot touches {}", start);
            return Ok(Vec::new());
        }
        Ok(self.detector.profitable_cycles(
            &snapshot.graph,
            start,
            max_hops,
            self.config.arbitrage_probe_amount,
            min_profit_bps,
        ))
    }

    pub fn metrics(&self) -> RouterMetrics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RouterMetrics {
            route_requests: load(&self.counters.route_requests),
            route_cache_hits: self.route_cache.hits(),
            route_cache_misses: self.route_cache.misses(),
            routes_found: load(&self.counters.routes_found),
            no_route: load(&self.counters.no_route),
            executions: load(&self.counters.executions),
            confirmed: load(&self.counters.confirmed),
            partial_fills: load(&self.counters.partial_fills),
            failed: load(&self.counters.failed),
            needs_reconciliation: load(&self.counters.needs_reconciliation),
            arbitrage_scans: load(&self.counters.arbitrage_scans),
        }
    }
}
