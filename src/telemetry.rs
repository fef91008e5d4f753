use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Installs the global stderr subscriber. `RUST_LOG` wins over `APP_LOG_LEVEL`.
pub fn init(log_level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(log_level)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}

fn filter_for(log_level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(log_level)
        .with_context(|| format!("APP_LOG_LEVEL '{log_level}' is not a valid filter"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_level_and_directive_filters() {
        assert!(filter_for("debug").is_ok());
        assert!(filter_for("journey_classifier=trace,sqlx=warn").is_ok());
    }
}
