// src/arbitrage/routing/executor.rs
//! Simulate-then-execute protocol for routes and split plans.
//!
//! A route moves `Pending -> Simulating -> Simulated -> Executing ->
//! Confirmed`, or ends in `SimulationFailed` / `Failed`. Hops are submitted
//! one at a time in path order through a `TradeExecutor`; the realized output
//! of each hop funds the next. Split plans run their sub-routes concurrently,
//! each with its own retry state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::evaluator::{Route, RouteEvaluator};
use super::graph::RoutingGraph;
use super::splitter::SplitPlan;
use crate::config::Config;
use crate::dex::pool::Pool;
use crate::error::{Result, RetryPolicy, RoutingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionState {
    Pending,
    Simulating,
    Simulated,
    SimulationFailed,
    Executing,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Confirmed,
    /// Some hops or sub-routes settled and others did not
    PartialFill,
    /// Nothing settled
    Failed,
    /// A confirmation timed out; the outcome on the venue is unknown
    NeedsReconciliation,
}

/// One hop handed to the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopOrder {
    pub execution_id: Uuid,
    pub leg_index: usize,
    pub hop_index: usize,
    pub pool: Pubkey,
    pub asset_in: Pubkey,
    pub asset_out: Pubkey,
    pub amount_in: f64,
    pub expected_amount_out: f64,
    pub min_amount_out: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopReceipt {
    pub signature: String,
    pub pool: Pubkey,
    pub hop_index: usize,
    pub amount_in: f64,
    pub amount_out: f64,
    pub confirmed_at: DateTime<Utc>,
}

/// Venue that submits a single hop and waits for its confirmation.
/// Errors must be classified as `ExecutionTransient` (retried) or
/// `ExecutionFatal`.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute_hop(&self, order: &HopOrder) -> Result<HopReceipt>;
}

/// What to execute: one route or a split plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoutePlan {
    Single(Route),
    Split(SplitPlan),
}

impl RoutePlan {
    pub fn routes(&self) -> Vec<&Route> {
        match self {
            RoutePlan::Single(route) => vec![route],
            RoutePlan::Split(plan) => plan.allocations.iter().map(|a| &a.route).collect(),
        }
    }

    pub fn amount_in(&self) -> f64 {
        match self {
            RoutePlan::Single(route) => route.amount_in,
            RoutePlan::Split(plan) => plan.total_amount,
        }
    }

    pub fn expected_output(&self) -> f64 {
        match self {
            RoutePlan::Single(route) => route.expected_output,
            RoutePlan::Split(plan) => plan.total_expected_output,
        }
    }
}

impl From<Route> for RoutePlan {
    fn from(route: Route) -> Self {
        RoutePlan::Single(route)
    }
}

impl From<SplitPlan> for RoutePlan {
    fn from(plan: SplitPlan) -> Self {
        RoutePlan::Split(plan)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegSimulation {
    pub leg_index: usize,
    /// The route re-priced against the latest snapshot
    pub route: Option<Route>,
    pub expected_output: f64,
    /// Relative change of expected output since the route was priced
    pub drift: f64,
    pub error: Option<RoutingError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub state: ExecutionState,
    pub legs: Vec<LegSimulation>,
    pub expected_output: f64,
    pub drift: f64,
    pub error: Option<RoutingError>,
}

impl SimulationOutcome {
    pub fn is_ok(&self) -> bool {
        self.state == ExecutionState::Simulated
    }

    pub fn failed(error: RoutingError) -> Self {
        Self {
            state: ExecutionState::SimulationFailed,
            legs: Vec::new(),
            expected_output: 0.0,
            drift: 0.0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegResult {
    pub leg_index: usize,
    pub status: ExecutionStatus,
    /// States the leg passed through, in order
    pub states: Vec<ExecutionState>,
    pub receipts: Vec<HopReceipt>,
    pub hop_count: usize,
    /// Destination-asset amount received; zero unless confirmed
    pub realized_output: f64,
    pub retries: u32,
    pub error: Option<RoutingError>,
}

impl LegResult {
    pub fn final_state(&self) -> Option<ExecutionState> {
        self.states.last().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: Uuid,
    pub status: ExecutionStatus,
    pub amount_in: f64,
    pub expected_output: f64,
    pub realized_output: f64,
    pub receipts: Vec<HopReceipt>,
    pub retries_used: u32,
    pub error: Option<RoutingError>,
    pub legs: Vec<LegResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Confirmed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Largest tolerated relative change of expected output at simulation
    pub max_simulation_drift: f64,
    pub retry: RetryPolicy,
    pub confirm_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_simulation_drift: 0.02,
            retry: RetryPolicy::default(),
            confirm_timeout: Duration::from_millis(10_000),
        }
    }
}

impl ExecutorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_simulation_drift: config.max_simulation_drift,
            retry: config.retry_policy(),
            confirm_timeout: config.confirm_timeout(),
        }
    }
}

pub struct RouteExecutor {
    config: ExecutorConfig,
    evaluator: RouteEvaluator,
    trade_executor: Arc<dyn TradeExecutor>,
}

impl std::fmt::Debug for RouteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteExecutor")
            .field("config", &self.config)
            .finish()
    }
}

impl RouteExecutor {
    pub fn new(
        config: ExecutorConfig,
        evaluator: RouteEvaluator,
        trade_executor: Arc<dyn TradeExecutor>,
    ) -> Self {
        Self {
            config,
            evaluator,
            trade_executor,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Re-prices `route` against `graph` and checks the drift limit
    pub fn simulate_route(&self, graph: &RoutingGraph, route: &Route) -> Result<(Route, f64)> {
        let fresh = self
            .evaluator
            .try_evaluate(graph, &route.path, route.amount_in)
            .map_err(|e| match e {
                RoutingError::InsufficientLiquidity(_) => e,
                other => RoutingError::InsufficientLiquidity(other.to_string()),
            })?;

        let drift = if route.expected_output > 0.0 {
            (fresh.expected_output - route.expected_output) / route.expected_output
        } else {
            0.0
        };
        if drift.abs() > self.config.max_simulation_drift {
            return Err(RoutingError::SimulationStale(format!(
                "expected output moved {:+.4}% (limit {:.4}%)",
                drift * 100.0,
                self.config.max_simulation_drift * 100.0
            )));
        }
        Ok((fresh, drift))
    }

    /// Simulates every route of `plan` against the latest graph
    pub fn simulate(&self, plan: &RoutePlan, graph: &RoutingGraph) -> SimulationOutcome {
        let mut legs = Vec::new();
        let mut first_error = None;

        for (leg_index, route) in plan.routes().into_iter().enumerate() {
            match self.simulate_route(graph, route) {
                Ok((fresh, drift)) => legs.push(LegSimulation {
                    leg_index,
                    expected_output: fresh.expected_output,
                    route: Some(fresh),
                    drift,
                    error: None,
                }),
                Err(e) => {
                    debug!("Simulation of leg {} failed: {}", leg_index, e);
                    first_error.get_or_insert_with(|| e.clone());
                    legs.push(LegSimulation {
                        leg_index,
                        route: None,
                        expected_output: 0.0,
                        drift: 0.0,
                        error: Some(e),
                    });
                }
            }
        }

        let expected_output: f64 = legs.iter().map(|leg| leg.expected_output).sum();
        let original = plan.expected_output();
        let drift = if original > 0.0 && first_error.is_none() {
            (expected_output - original) / original
        } else {
            0.0
        };

        SimulationOutcome {
            state: if first_error.is_some() {
                ExecutionState::SimulationFailed
            } else {
                ExecutionState::Simulated
            },
            legs,
            expected_output,
            drift,
            error: first_error,
        }
    }

    /// Simulates `plan` and, if every route passes, executes it.
    /// `slippage_tolerance` is the fraction below the simulated output a hop
    /// may realize before the remaining hops are abandoned.
    pub async fn execute(
        &self,
        plan: &RoutePlan,
        graph: &RoutingGraph,
        slippage_tolerance: f64,
    ) -> Result<ExecutionResult> {
        check_tolerance(slippage_tolerance)?;

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let routes = plan.routes();
        info!(
            "Execution {}: {} route(s), {} in, {:.6} expected",
            id,
            routes.len(),
            plan.amount_in(),
            plan.expected_output()
        );

        let simulated: Vec<Result<(Route, f64)>> = routes
            .iter()
            .map(|route| self.simulate_route(graph, route))
            .collect();

        let abort = simulated.iter().find_map(|s| s.as_ref().err()).cloned();
        let legs = if let Some(error) = abort {
            warn!("Execution {} aborted at simulation: {}", id, error);
            simulated
                .iter()
                .zip(&routes)
                .enumerate()
                .map(|(leg_index, (sim, route))| {
                    let (last_state, leg_error) = match sim {
                        Ok(_) => (ExecutionState::Simulated, None),
                        Err(e) => (ExecutionState::SimulationFailed, Some(e.clone())),
                    };
                    let leg_error = leg_error.unwrap_or_else(|| error.clone());
                    unsubmitted_leg(leg_index, route, last_state, leg_error)
                })
                .collect()
        } else {
            let fresh: Vec<Route> = simulated
                .into_iter()
                .filter_map(|s| s.ok().map(|(route, _)| route))
                .collect();
            join_all(
                fresh
                    .iter()
                    .enumerate()
                    .map(|(leg_index, route)| self.execute_leg(id, leg_index, route, slippage_tolerance)),
            )
            .await
        };

        Ok(finish(id, started_at, plan, legs))
    }

    /// Result for a plan that could not be simulated at all, e.g. because
    /// pool data was unavailable. Nothing is submitted.
    pub fn reject(&self, plan: &RoutePlan, error: RoutingError) -> ExecutionResult {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        warn!("Execution {} rejected before simulation: {}", id, error);
        let legs = plan
            .routes()
            .into_iter()
            .enumerate()
            .map(|(leg_index, route)| {
                unsubmitted_leg(leg_index, route, ExecutionState::SimulationFailed, error.clone())
            })
            .collect();
        finish(id, started_at, plan, legs)
    }

    async fn submit(&self, order: &HopOrder) -> Result<HopReceipt> {
        match tokio::time::timeout(self.config.confirm_timeout, self.trade_executor.execute_hop(order))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RoutingError::Timeout(format!(
                "hop {} of leg {} unconfirmed after {}ms",
                order.hop_index,
                order.leg_index,
                self.config.confirm_timeout.as_millis()
            ))),
        }
    }

    /// Executes an already simulated route hop by hop
    async fn execute_leg(
        &self,
        execution_id: Uuid,
        leg_index: usize,
        route: &Route,
        tolerance: f64,
    ) -> LegResult {
        let mut leg = LegResult {
            leg_index,
            status: ExecutionStatus::Failed,
            states: vec![
                ExecutionState::Pending,
                ExecutionState::Simulating,
                ExecutionState::Simulated,
                ExecutionState::Executing,
            ],
            receipts: Vec::new(),
            hop_count: route.hop_count(),
            realized_output: 0.0,
            retries: 0,
            error: None,
        };
        let mut amount_in = route.amount_in;

        for (hop_index, hop) in route.hops.iter().enumerate() {
            // simulated amounts are re-scaled to what the previous hop realized
            let scale = if hop.amount_in > 0.0 {
                amount_in / hop.amount_in
            } else {
                1.0
            };
            let expected = hop.amount_out * scale;
            let order = HopOrder {
                execution_id,
                leg_index,
                hop_index,
                pool: hop.pool,
                asset_in: hop.asset_in,
                asset_out: hop.asset_out,
                amount_in,
                expected_amount_out: expected,
                min_amount_out: expected * (1.0 - tolerance),
            };

            let outcome = self.config.retry.run(|| self.submit(&order)).await;
            leg.retries += outcome.retries();

            match outcome.result {
                Ok(receipt) => {
                    let realized = receipt.amount_out;
                    leg.receipts.push(receipt);
                    if realized < order.min_amount_out {
                        warn!(
                            "Leg {} hop {} realized {:.6} below minimum {:.6}; abandoning route",
                            leg_index, hop_index, realized, order.min_amount_out
                        );
                        leg.states.push(ExecutionState::Failed);
                        leg.status = ExecutionStatus::PartialFill;
                        leg.error = Some(RoutingError::SlippageExceeded {
                            hop_index,
                            minimum: order.min_amount_out,
                            realized,
                        });
                        return leg;
                    }
                    amount_in = realized;
                }
                Err(RoutingError::Timeout(msg)) => {
                    warn!("Leg {} hop {} needs reconciliation: {}", leg_index, hop_index, msg);
                    leg.status = ExecutionStatus::NeedsReconciliation;
                    leg.error = Some(RoutingError::Timeout(msg));
                    return leg;
                }
                Err(e) => {
                    warn!("Leg {} hop {} failed: {}", leg_index, hop_index, e);
                    leg.states.push(ExecutionState::Failed);
                    leg.status = if leg.receipts.is_empty() {
                        ExecutionStatus::Failed
                    } else {
                        ExecutionStatus::PartialFill
                    };
                    leg.error = Some(e);
                    return leg;
                }
            }
        }

        leg.states.push(ExecutionState::Confirmed);
        leg.status = ExecutionStatus::Confirmed;
        leg.realized_output = amount_in;
        debug!("Leg {} confirmed with {:.6} out", leg_index, amount_in);
        leg
    }
}

pub(crate) fn check_tolerance(slippage_tolerance: f64) -> Result<()> {
    if !(0.0..1.0).contains(&slippage_tolerance) {
        return Err(RoutingError::ConfigError(format!(
            "slippage tolerance must be in [0, 1), got {}",
            slippage_tolerance
        )));
    }
    Ok(())
}

fn unsubmitted_leg(
    leg_index: usize,
    route: &Route,
    last_state: ExecutionState,
    error: RoutingError,
) -> LegResult {
    LegResult {
        leg_index,
        status: ExecutionStatus::Failed,
        states: vec![ExecutionState::Pending, ExecutionState::Simulating, last_state],
        receipts: Vec::new(),
        hop_count: route.hop_count(),
        realized_output: 0.0,
        retries: 0,
        error: Some(error),
    }
}

fn finish(id: Uuid, started_at: DateTime<Utc>, plan: &RoutePlan, legs: Vec<LegResult>) -> ExecutionResult {
    let (status, error) = aggregate(&legs);
    let result = ExecutionResult {
        id,
        status,
        amount_in: plan.amount_in(),
        expected_output: plan.expected_output(),
        realized_output: legs
            .iter()
            .filter(|leg| leg.status == ExecutionStatus::Confirmed)
            .map(|leg| leg.realized_output)
            .sum(),
        receipts: legs.iter().flat_map(|leg| leg.receipts.clone()).collect(),
        retries_used: legs.iter().map(|leg| leg.retries).sum(),
        error,
        legs,
        started_at,
        finished_at: Utc::now(),
    };

    match result.status {
        ExecutionStatus::Confirmed => info!(
            "Execution {} confirmed: realized {:.6} (expected {:.6})",
            id, result.realized_output, result.expected_output
        ),
        status => error!("Execution {} ended {:?}: {}", id, status, describe(&result.error)),
    }
    result
}

fn aggregate(legs: &[LegResult]) -> (ExecutionStatus, Option<RoutingError>) {
    let confirmed: Vec<usize> = legs
        .iter()
        .filter(|leg| leg.status == ExecutionStatus::Confirmed)
        .map(|leg| leg.leg_index)
        .collect();
    if confirmed.len() == legs.len() {
        return (ExecutionStatus::Confirmed, None);
    }

    let first_error = legs.iter().find_map(|leg| leg.error.clone());

    if confirmed.is_empty() {
        if let Some(leg) = legs
            .iter()
            .find(|leg| leg.status == ExecutionStatus::NeedsReconciliation)
        {
            return (ExecutionStatus::NeedsReconciliation, leg.error.clone());
        }
    }

    if let [leg] = legs {
        return match leg.status {
            ExecutionStatus::PartialFill => {
                let settled = leg.receipts.len();
                (
                    ExecutionStatus::PartialFill,
                    Some(RoutingError::PartialFill {
                        confirmed: (0..settled).collect(),
                        unconfirmed: (settled..leg.hop_count).collect(),
                        detail: describe(&leg.error),
                    }),
                )
            }
            status => (status, leg.error.clone()),
        };
    }

    let funds_moved = legs.iter().any(|leg| !leg.receipts.is_empty());
    if !funds_moved {
        return (ExecutionStatus::Failed, first_error);
    }

    let unconfirmed = legs
        .iter()
        .filter(|leg| leg.status != ExecutionStatus::Confirmed)
        .map(|leg| leg.leg_index)
        .collect();
    (
        ExecutionStatus::PartialFill,
        Some(RoutingError::PartialFill {
            confirmed,
            unconfirmed,
            detail: describe(&first_error),
        }),
    )
}

fn describe(error: &Option<RoutingError>) -> String {
    error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown cause".to_string())
}

/// Fills every hop at the pool-model price of a captured pool snapshot
#[derive(Debug, Default)]
pub struct PaperTradeExecutor {
    pools: HashMap<Pubkey, Pool>,
    fills: AtomicUsize,
}

impl PaperTradeExecutor {
    pub fn new(pools: &[Pool]) -> Self {
        Self {
            pools: pools.iter().map(|pool| (pool.address, pool.clone())).collect(),
            fills: AtomicUsize::new(0),
        }
    }

    pub fn fill_count(&self) -> usize {
        self.fills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeExecutor for PaperTradeExecutor {
    async fn execute_hop(&self, order: &HopOrder) -> Result<HopReceipt> {
        let pool = self.pools.get(&order.pool).ok_or_else(|| {
            RoutingError::ExecutionFatal(format!("pool {} unknown to paper venue", order.pool))
        })?;
        let quote = pool
            .quote(&order.asset_in, order.amount_in)
            .map_err(|e| RoutingError::ExecutionFatal(e.to_string()))?;

        self.fills.fetch_add(1, Ordering::SeqCst);
        Ok(HopReceipt {
            signature: format!("paper-{}", Uuid::new_v4()),
            pool: order.pool,
            hop_index: order.hop_index,
            amount_in: order.amount_in,
            amount_out: quote.amount_out,
            confirmed_at: Utc::now(),
        })
    }
}
