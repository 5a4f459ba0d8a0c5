//! Configuration for the demo harness binary. The aggregation library
//! itself takes no configuration beyond `PoolContainerHandles` and an
//! epoch range (spec.md §6: "the aggregation core is not a CLI"); this
//! is only for `main.rs`, grounded in the teacher's `src/main.rs::Args`.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Demo harness driving the EC aggregation engine against mock adapters"
)]
pub struct Args {
    /// How often to run a pass of `ec_aggregate`, in seconds.
    #[arg(long, env = "EC_AGG_POLL_INTERVAL_SECONDS", default_value_t = 30)]
    pub poll_interval_seconds: u64,

    /// Lower bound of the epoch range scanned each pass.
    #[arg(long, env = "EC_AGG_EPOCH_LO", default_value_t = 0)]
    pub epoch_lo: u64,

    /// Upper bound of the epoch range scanned each pass.
    #[arg(long, env = "EC_AGG_EPOCH_HI", default_value_t = u64::MAX)]
    pub epoch_hi: u64,

    /// Run a single pass and exit, instead of looping.
    #[arg(long, env = "EC_AGG_ONCE", default_value_t = false)]
    pub once: bool,

    /// Address the Prometheus `/metrics` endpoint listens on.
    #[arg(long, env = "EC_AGG_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_addr: String,

    /// Address the health endpoint (`/healthz`) listens on.
    #[arg(long, env = "EC_AGG_HEALTH_ADDR", default_value = "0.0.0.0:9091")]
    pub health_addr: String,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, env = "EC_AGG_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit structured JSON logs instead of plain text.
    #[arg(long, env = "EC_AGG_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Maps the CLI/env log level string to a `tracing` filter directive,
/// mirroring the teacher's `main.rs::init_logging`.
pub fn init_logging(args: &Args) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().expect("valid directive"));

    if args.log_json {
        let layer = fmt::layer().json();
        tracing_subscriber::registry().with(filter).with(layer).init();
    } else {
        let layer = fmt::layer().with_target(true);
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}
