//! Log subscriber setup

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// Level comes from `RUST_LOG`, defaulting to `info`. Output goes to stdout.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout);

    // A second init (tests) keeps the first subscriber
    let result = match format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "log subscriber already installed");
    }
}
