pub mod timing;

pub use timing::Timer;

use log::{info, LevelFilter};

/// Parses a `LOG_LEVEL` style string, defaulting to `Info` on anything unknown.
pub fn parse_log_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

pub fn setup_logging(level: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Utc::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("solana_sdk", LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized at {}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_log_level(" warn "), LevelFilter::Warn);
        assert_eq!(parse_log_level("off"), LevelFilter::Off);
        assert_eq!(parse_log_level("verbose"), LevelFilter::Info);
    }
}
