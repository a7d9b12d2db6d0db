//! Route discovery, split optimization, execution and cycle detection.

pub mod detector;
pub mod routing;

pub use detector::{is_connected, CycleDetector, ProfitableCycle};
