//! catalogsmith - render and publish operator catalogs
//!
//! Reads bundle sources from `<operator-dir>/bundles`, assembles each requested
//! catalog, publishes every image it references and prints the CatalogSource.

use anyhow::{anyhow, Context, Result};
use catalogsmith::config::PublishConfig;
use catalogsmith::definitions::{catalog_name, CatalogDefinitions};
use catalogsmith::error::RetryConfig;
use catalogsmith::logging::{init_logging, LogOptions};
use catalogsmith::publisher::{
    ContainerRuntimePublisher, DryRunPublisher, ImagePublisher, RetryingPublisher,
};
use catalogsmith::{CatalogError, CatalogGraph, DocumentLayout, ImageTarget, PublishContext};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Parser, Debug)]
#[command(
    name = "catalogsmith",
    version,
    about = "Analyze bundle manifests and prepare catalog indexes, publishing all images",
    after_help = "The inspector (skopeo by default) is required regardless of the runtime used for building and pushing."
)]
struct Cli {
    /// Apply the named catalog to a cluster using the oc cli
    #[arg(short, long)]
    apply: Option<String>,

    /// Comma-separated list of catalogs to build
    #[arg(short, long, value_delimiter = ',', default_value = "latest,diff,prune,prune-diff")]
    catalogs: Vec<String>,

    /// Keep the temporary working directories
    #[arg(short, long)]
    keep: bool,

    /// Log file for debug logging
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Don't build and publish the images, simply render them
    #[arg(short, long)]
    no_build: bool,

    /// Container runtime used for building and pushing
    #[arg(short, long, env = "CONTAINER_RUNTIME", default_value = catalogsmith::constants::DEFAULT_RUNTIME)]
    runtime: String,

    /// Also build split catalogs, with folders and indexes per package
    #[arg(short, long)]
    split: bool,

    /// Increase output verbosity
    #[arg(short, long)]
    verbose: bool,

    /// Registry images are published to
    #[arg(long, env = "REGISTRY", default_value = catalogsmith::constants::DEFAULT_REGISTRY)]
    registry: String,

    /// Namespace within the registry
    #[arg(long, env = "CATALOG_NAMESPACE", default_value = catalogsmith::constants::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Directory holding `bundles/` and `related_image/` (defaults to current directory)
    #[arg(long)]
    operator_dir: Option<PathBuf>,

    /// YAML file of catalog definitions replacing the built-in ones
    #[arg(long)]
    definitions: Option<PathBuf>,

    /// Compute digests locally instead of publishing anything
    #[arg(long)]
    dry_run: bool,

    /// Emit JSON logs on stderr
    #[arg(long)]
    json_logs: bool,

    /// Extra attempts for a failed build or push
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Tool used to read digests back from the registry
    #[arg(long, default_value = catalogsmith::constants::DEFAULT_INSPECTOR)]
    inspector: String,
}

impl Cli {
    fn publish_config(&self) -> PublishConfig {
        PublishConfig {
            target: ImageTarget::new(&self.registry, &self.namespace),
            runtime: self.runtime.clone(),
            inspector: self.inspector.clone(),
            retry: RetryConfig {
                max_attempts: self.retries + 1,
                ..RetryConfig::default()
            },
        }
    }
}

fn make_publisher(cli: &Cli, config: &PublishConfig) -> Arc<dyn ImagePublisher> {
    if cli.dry_run {
        return Arc::new(DryRunPublisher::new());
    }
    let runtime = ContainerRuntimePublisher::new(&config.runtime, &config.inspector);
    if config.retry.max_attempts > 1 {
        Arc::new(RetryingPublisher::new(runtime, config.retry.clone()))
    } else {
        Arc::new(runtime)
    }
}

/// Working directory for one catalog, removed on drop unless kept
struct DataDirectory {
    dir: Option<TempDir>,
    keep: bool,
}

impl DataDirectory {
    fn new(operator_dir: &Path, label: &str, keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("operator-build-{}-", label))
            .tempdir_in(operator_dir)
            .with_context(|| format!("creating working directory in {}", operator_dir.display()))?;
        Ok(Self {
            dir: Some(dir),
            keep,
        })
    }

    fn path(&self) -> &Path {
        self.dir.as_ref().map(|d| d.path()).unwrap_or(Path::new("."))
    }
}

impl Drop for DataDirectory {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if self.keep {
                tracing::debug!(path = %dir.path().display(), "Keeping working directory");
                let _ = dir.keep();
            } else {
                tracing::info!(path = %dir.path().display(), "Cleaning up working directory");
            }
        }
    }
}

async fn apply_catalog_source(catalog: &CatalogGraph) -> Result<()> {
    let path = catalog.catalog_source_path()?;
    tracing::info!(catalog = %catalog.name(), "Applying catalog to cluster");
    let output = tokio::process::Command::new("oc")
        .arg("apply")
        .arg("-f")
        .arg(&path)
        .output()
        .await
        .context("running oc apply")?;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        tracing::debug!("{}", line);
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "oc apply exited with {}: {}",
            output.status,
            stderr.lines().last().unwrap_or_default()
        ));
    }
    Ok(())
}

async fn run_catalog(
    cli: &Cli,
    definition: &str,
    definitions: &CatalogDefinitions,
    operator_dir: &Path,
    ctx: &PublishContext,
) -> Result<()> {
    let selections = definitions
        .get(definition)
        .cloned()
        .ok_or_else(|| anyhow!("no catalog definition named {}", definition))?;
    let bundle_source_dir = operator_dir.join(catalogsmith::constants::BUNDLES_DIR);

    let mut catalog = CatalogGraph::new(
        catalog_name(definition),
        selections,
        &bundle_source_dir,
        DocumentLayout::Single,
        ctx.clone(),
    )?;

    {
        let data_dir = DataDirectory::new(operator_dir, definition, cli.keep)?;
        catalog.render(operator_dir, data_dir.path()).await?;
        if !cli.no_build {
            catalog.build_and_publish(false).await?;
        }
        println!("{}", catalog.catalog_source()?);

        if cli.apply.as_deref() == Some(definition) {
            if let Err(e) = apply_catalog_source(&catalog).await {
                tracing::error!(catalog = %catalog.name(), error = %e, "Unable to apply catalogSource to cluster");
            }
        } else {
            tracing::debug!(catalog = %catalog.name(), "Not applying");
        }
    }

    if cli.split {
        let split_label = format!("{}-split", definition);
        let mut split = catalog.respin(catalog_name(&split_label), DocumentLayout::PerPackage);
        let data_dir = DataDirectory::new(operator_dir, &split_label, cli.keep)?;
        split.render(operator_dir, data_dir.path()).await?;
        if !cli.no_build {
            split.build_and_publish(true).await?;
        }
        println!("{}", split.catalog_source()?);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_options = LogOptions {
        verbose: cli.verbose,
        json: cli.json_logs,
        log_file: cli.log.clone(),
    };
    if let Err(e) = init_logging(&log_options) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let operator_dir = match cli.operator_dir.clone() {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(error = %e, "Unable to determine the operator directory");
                return ExitCode::FAILURE;
            }
        },
    };

    let definitions = match &cli.definitions {
        Some(path) => match CatalogDefinitions::from_file(path) {
            Ok(defs) => defs,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Unable to load catalog definitions");
                return ExitCode::FAILURE;
            }
        },
        None => CatalogDefinitions::builtin(),
    };

    let config = cli.publish_config();
    let ctx = PublishContext::new(config.target.clone(), make_publisher(&cli, &config));

    let mut failed = Vec::new();
    for definition in &cli.catalogs {
        if let Err(e) = run_catalog(&cli, definition, &definitions, &operator_dir, &ctx).await {
            let data_error = e
                .downcast_ref::<CatalogError>()
                .map(CatalogError::is_data_error)
                .unwrap_or(false);
            tracing::error!(catalog = %definition, data_error, error = %e, "Catalog failed");
            failed.push(definition.clone());
        }
    }

    let stats = ctx.cache.stats();
    tracing::info!(
        lookups = stats.lookups,
        hits = stats.hits,
        coalesced = stats.coalesced,
        builds = stats.builds,
        failures = stats.failures,
        "Digest cache summary"
    );

    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        tracing::error!(failed = %failed.join(","), "Some catalogs failed");
        ExitCode::FAILURE
    }
}
