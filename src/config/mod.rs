pub mod settings;

pub use settings::Config;

use crate::error::RoutingError;
use std::sync::Arc;

/// Loads the router configuration from the environment (and `.env` when
/// present), validates it and returns it shared. Logging is usually not set
/// up yet; call `Config::log_settings` once it is.
pub fn load_config() -> Result<Arc<Config>, RoutingError> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    config.validate()?;

    Ok(Arc::new(config))
}
