/// Catalog error types and handling utilities
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// Main error type for catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Bundle sources are missing, unreadable or lack required fields
    #[error("Malformed bundle at {}: {reason}", .path.display())]
    MalformedBundle { path: PathBuf, reason: String },

    /// Versions were compared across package boundaries
    #[error("{left} cannot be compared to {right} by version: packages differ ({left_package} vs {right_package})")]
    IncomparableVersions {
        left: String,
        left_package: String,
        right: String,
        right_package: String,
    },

    /// A bundle declares a dependency type the catalog schema has no property for
    #[error("Dependency of type {kind} declared by {bundle} is not supported")]
    UnsupportedDependencyType { bundle: String, kind: String },

    /// A digest was requested for a reference that has not been built
    #[error("Unable to get digest for unbuilt related image {reference} of {bundle}")]
    UnresolvedReference { bundle: String, reference: String },

    /// The image publisher reported a failed build, push or inspect
    #[error("External build failed for {image} (exit code {}): {command}{}", describe_code(.code), describe_last_line(.last_line))]
    ExternalBuildFailure {
        image: String,
        command: String,
        code: Option<i32>,
        last_line: Option<String>,
    },

    /// The reference failed to build earlier in this run
    #[error("Image {reference} already failed to build in this run: {reason}")]
    PreviouslyFailed { reference: String, reason: String },

    /// A bundle's predecessor is itself or belongs to another package
    #[error("Bundle {bundle} cannot replace {replaces}: {reason}")]
    InvalidReplaces {
        bundle: String,
        replaces: String,
        reason: String,
    },

    /// Catalog operation requires a prior render
    #[error("Catalog {catalog} has not been rendered")]
    NotRendered { catalog: String },

    /// One or more packages failed; the catalog was not committed
    #[error("Catalog {catalog} is incomplete, failed packages: {}", describe_failures(.failed))]
    IncompleteCatalog {
        catalog: String,
        failed: Vec<(String, String)>,
    },

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapped anyhow error for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedBundle {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// True when the error points at bad input rather than a failing run
    pub fn is_data_error(&self) -> bool {
        match self {
            Self::MalformedBundle { .. }
            | Self::IncomparableVersions { .. }
            | Self::UnsupportedDependencyType { .. }
            | Self::InvalidReplaces { .. } => true,
            Self::UnresolvedReference { .. }
            | Self::ExternalBuildFailure { .. }
            | Self::PreviouslyFailed { .. }
            | Self::NotRendered { .. }
            | Self::IncompleteCatalog { .. }
            | Self::Io { .. }
            | Self::Yaml(_)
            | Self::Json(_)
            | Self::Other(_) => false,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn describe_last_line(line: &Option<String>) -> String {
    line.as_ref()
        .map(|l| format!(" [{}]", l))
        .unwrap_or_default()
}

fn describe_failures(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(package, reason)| format!("{}: {}", package, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Helper to determine if a publisher error is worth retrying
pub fn is_retryable(err: &CatalogError) -> bool {
    matches!(err, CatalogError::ExternalBuildFailure { .. })
}

/// Retry configuration for the publisher collaborator
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: crate::constants::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: crate::constants::DEFAULT_MAX_BACKOFF_MS,
            backoff_multiplier: 2.0,
        }
    }
}

/// Delay before retry `attempt` (zero based): exponential growth capped at
/// `max_backoff_ms`, then up to 20% jitter either way, still capped.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> u64 {
    let cap = config.max_backoff_ms as f64;
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = (config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(exponent)).min(cap);

    let spread = 1.0 + (rand::random::<f64>() - 0.5) * 0.4;
    (base * spread).clamp(0.0, cap) as u64
}
