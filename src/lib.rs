pub mod arbitrage;
pub mod config;
pub mod dex;
pub mod error;
pub mod testing; // Fixtures and a scripted venue for tests
pub mod utils;

pub use arbitrage::routing::{
    Route, RouteConstraints, RoutePlan, SmartRouter, SmartRouterConfig, SplitPlan,
};
pub use error::{Result, RoutingError};
