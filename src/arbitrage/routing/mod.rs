// src/arbitrage/routing/mod.rs
//! Multi-hop routing over a snapshot of exchange pools
//!
//! Pool data flows through the stages in order:
//! - `cache`: pool snapshots, injected clock, route cache
//! - `graph`: asset/pool arena with weighted edges
//! - `pathfinder`: weighted shortest path plus bounded enumeration
//! - `evaluator`: hop-by-hop pricing and confidence
//! - `splitter`: water-filling across several routes
//! - `executor`: simulate-then-execute with retries
//! - `smart_router`: the public entry point

pub mod cache;
pub mod evaluator;
pub mod executor;
pub mod graph;
pub mod pathfinder;
pub mod smart_router;
pub mod splitter;

pub use cache::{
    Clock, JsonFilePoolProvider, ManualClock, PoolDataCache, PoolDataProvider, PoolRecord,
    PoolSnapshot, RouteCache, StaticPoolProvider, SystemClock,
};

pub use evaluator::{Hop, Route, RouteEvaluator};

pub use executor::{
    ExecutionResult, ExecutionState, ExecutionStatus, HopOrder, HopReceipt, PaperTradeExecutor,
    RouteExecutor, RoutePlan, SimulationOutcome, TradeExecutor,
};

pub use graph::{GraphStats, RoutingGraph};

pub use pathfinder::{Path, PathFinder, PathfinderConfig};

pub use splitter::{OptimizationGoal, RouteSplitter, SplitAllocation, SplitPlan, SplitterConfig};

pub use smart_router::{RouteConstraints, RouterMetrics, SmartRouter, SmartRouterConfig};
