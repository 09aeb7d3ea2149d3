use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Builds a container image from a context directory, pushes it and reports
/// the content digest the registry assigned.
#[async_trait]
pub trait ImagePublisher: Send + Sync {
    async fn build_and_push(
        &self,
        context: &Path,
        image: &str,
        extra_args: &[String],
    ) -> Result<String>;
}

pub mod dry_run;
pub mod retry;
pub mod runtime;

pub use dry_run::DryRunPublisher;
pub use retry::RetryingPublisher;
pub use runtime::ContainerRuntimePublisher;
