use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. JSON output goes to stdout,
/// the compact human format to stderr.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("motif_runner=info,warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(fmt::layer().with_writer(std::io::stdout).json())
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .compact(),
            )
            .try_init()?;
    }
    Ok(())
}
