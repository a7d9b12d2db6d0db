use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RetryPolicy, RoutingError};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_hops: usize,
    pub max_routes: usize,
    pub pool_cache_ttl_ms: u64,
    pub route_cache_ttl_ms: u64,
    pub min_liquidity: Option<f64>,
    pub low_liquidity_floor: f64,
    pub slippage_tolerance: f64,
    pub max_simulation_drift: f64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub fetch_timeout_ms: u64,
    pub confirm_timeout_ms: u64,
    pub split_max_iterations: usize,
    pub pools_file: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_hops: 3,
            max_routes: 4,
            pool_cache_ttl_ms: 5_000,
            route_cache_ttl_ms: 2_000,
            min_liquidity: None,
            low_liquidity_floor: 10_000.0,
            slippage_tolerance: 0.01,
            max_simulation_drift: 0.02,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            fetch_timeout_ms: 3_000,
            confirm_timeout_ms: 10_000,
            split_max_iterations: 200,
            pools_file: None,
            log_level: "info".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Reads every setting from the environment, falling back to defaults
    /// for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            max_hops: env_or("ROUTER_MAX_HOPS", defaults.max_hops),
            max_routes: env_or("ROUTER_MAX_ROUTES", defaults.max_routes),
            pool_cache_ttl_ms: env_or("ROUTER_POOL_CACHE_TTL_MS", defaults.pool_cache_ttl_ms),
            route_cache_ttl_ms: env_or("ROUTER_ROUTE_CACHE_TTL_MS", defaults.route_cache_ttl_ms),
            min_liquidity: env_opt("ROUTER_MIN_LIQUIDITY"),
            low_liquidity_floor: env_or(
                "ROUTER_LOW_LIQUIDITY_FLOOR",
                defaults.low_liquidity_floor,
            ),
            slippage_tolerance: env_or("ROUTER_SLIPPAGE_TOLERANCE", defaults.slippage_tolerance),
            max_simulation_drift: env_or(
                "ROUTER_MAX_SIMULATION_DRIFT",
                defaults.max_simulation_drift,
            ),
            retry_max_attempts: env_or("ROUTER_RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_base_delay_ms: env_or(
                "ROUTER_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            ),
            retry_max_delay_ms: env_or("ROUTER_RETRY_MAX_DELAY_MS", defaults.retry_max_delay_ms),
            fetch_timeout_ms: env_or("ROUTER_FETCH_TIMEOUT_MS", defaults.fetch_timeout_ms),
            confirm_timeout_ms: env_or("ROUTER_CONFIRM_TIMEOUT_MS", defaults.confirm_timeout_ms),
            split_max_iterations: env_or(
                "ROUTER_SPLIT_MAX_ITERATIONS",
                defaults.split_max_iterations,
            ),
            pools_file: env::var("ROUTER_POOLS_FILE").ok().filter(|p| !p.is_empty()),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.max_hops == 0 {
            return Err(RoutingError::ConfigError(
                "ROUTER_MAX_HOPS must be at least 1".to_string(),
            ));
        }
        if self.max_routes == 0 {
            return Err(RoutingError::ConfigError(
                "ROUTER_MAX_ROUTES must be at least 1".to_string(),
            ));
        }
        if !(self.slippage_tolerance > 0.0 && self.slippage_tolerance < 1.0) {
            return Err(RoutingError::ConfigError(format!(
                "ROUTER_SLIPPAGE_TOLERANCE must be in (0, 1), got {}",
                self.slippage_tolerance
            )));
        }
        if !(self.max_simulation_drift >= 0.0 && self.max_simulation_drift.is_finite()) {
            return Err(RoutingError::ConfigError(format!(
                "ROUTER_MAX_SIMULATION_DRIFT must be non-negative, got {}",
                self.max_simulation_drift
            )));
        }
        if let Some(min) = self.min_liquidity {
            if !(min >= 0.0 && min.is_finite()) {
                return Err(RoutingError::ConfigError(format!(
                    "ROUTER_MIN_LIQUIDITY must be non-negative, got {}",
                    min
                )));
            }
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(RoutingError::ConfigError(
                "ROUTER_RETRY_BASE_DELAY_MS exceeds ROUTER_RETRY_MAX_DELAY_MS".to_string(),
            ));
        }
        Ok(())
    }

    /// One-line description of the limits that shape routing and execution
    pub fn summary(&self) -> String {
        format!(
            "max_hops={} max_routes={} slippage={:.2}% drift={:.2}% retries={} fetch_timeout={}ms confirm_timeout={}ms pools={}",
            self.max_hops,
            self.max_routes,
            self.slippage_tolerance * 100.0,
            self.max_simulation_drift * 100.0,
            self.retry_max_attempts,
            self.fetch_timeout_ms,
            self.confirm_timeout_ms,
            self.pools_file.as_deref().unwrap_or("built-in")
        )
    }

    pub fn log_settings(&self) {
        log::info!("Router configuration loaded: {}", self.summary());
        log::debug!("Full configuration: {:?}", self);
    }

    pub fn pool_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.pool_cache_ttl_ms)
    }

    pub fn route_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.route_cache_ttl_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}
