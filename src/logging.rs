use std::fs::File;
use std::io;
use std::path::PathBuf;
/// Structured logging and cache metrics for catalog builds
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// DEBUG on stderr instead of INFO
    pub verbose: bool,
    /// JSON lines on stderr
    pub json: bool,
    /// Extra DEBUG-level log file
    pub log_file: Option<PathBuf>,
}

/// Initialize stderr logging plus an optional debug log file
pub fn init_logging(options: &LogOptions) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("catalogsmith=debug"));
    let stderr_level = if options.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stderr_layer = if options.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(io::stderr)
            .with_filter(stderr_level)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(stderr_level)
            .boxed()
    };

    let file_layer = match &options.log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .with_filter(LevelFilter::DEBUG)
                    .boxed(),
            )
        }
        None => None,
    };

    Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Counters kept by the digest cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub coalesced: u64,
    pub builds: u64,
    pub failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            ((self.hits + self.coalesced) as f64) / (self.lookups as f64)
        }
    }
}

#[macro_export]
macro_rules! log_digest_hit {
    ($reference:expr, $digest:expr) => {
        tracing::info!(reference = %$reference, digest = %$digest, "Already built");
    };
}

#[macro_export]
macro_rules! log_digest_build {
    ($reference:expr) => {
        tracing::info!(reference = %$reference, "Building and pushing");
    };
}

#[macro_export]
macro_rules! log_digest_failure {
    ($reference:expr, $error:expr) => {
        tracing::error!(reference = %$reference, error = %$error, "Image build failed");
    };
}
