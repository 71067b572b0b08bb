// warehouse-copilot/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Interactive mode keeps the console clean: only errors reach stderr unless
/// verbose is requested. Batch commands default to `info`. `RUST_LOG` wins
/// over both when set.
pub fn init_tracing(verbose: bool, interactive: bool) {
    let default_filter = if verbose {
        "debug"
    } else if interactive {
        "error"
    } else {
        "info"
    };

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
