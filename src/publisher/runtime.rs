use crate::error::{CatalogError, Result};
use crate::publisher::ImagePublisher;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Publishes through a container runtime CLI (`podman`, `docker`) and reads
/// digests back with an image inspector (`skopeo`).
pub struct ContainerRuntimePublisher {
    pub runtime: String,
    pub inspector: String,
}

#[derive(Debug, Deserialize)]
struct InspectOutput {
    #[serde(rename = "Digest")]
    digest: String,
}

struct CommandOutput {
    exit_code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ContainerRuntimePublisher {
    pub fn new(runtime: impl Into<String>, inspector: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            inspector: inspector.into(),
        }
    }

    async fn run(&self, program: &str, args: &[String], cwd: &Path, image: &str) -> Result<Vec<u8>> {
        let command = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!(command = %command, cwd = %cwd.display(), "Running");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map(|o| CommandOutput {
                exit_code: o.status.code(),
                stdout: o.stdout,
                stderr: o.stderr,
            })
            .map_err(|e| CatalogError::ExternalBuildFailure {
                image: image.to_string(),
                command: command.clone(),
                code: None,
                last_line: Some(e.to_string()),
            })?;

        if output.exit_code == Some(0) {
            return Ok(output.stdout);
        }

        let last_line = last_line(&output.stderr).or_else(|| last_line(&output.stdout));
        tracing::error!(command = %command, code = ?output.exit_code, "Command failed");
        Err(CatalogError::ExternalBuildFailure {
            image: image.to_string(),
            command,
            code: output.exit_code,
            last_line,
        })
    }
}

fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[async_trait]
impl ImagePublisher for ContainerRuntimePublisher {
    async fn build_and_push(
        &self,
        context: &Path,
        image: &str,
        extra_args: &[String],
    ) -> Result<String> {
        let cwd: PathBuf = context.to_path_buf();

        let mut build = to_args(&["build", ".", "--format=docker", "-t", image]);
        build.extend(extra_args.iter().cloned());
        self.run(&self.runtime, &build, &cwd, image).await?;

        let push = to_args(&["push", "--format=docker", image]);
        self.run(&self.runtime, &push, &cwd, image).await?;

        let reference = format!("docker://{}", image);
        let inspect = to_args(&["inspect", &reference]);
        let stdout = self.run(&self.inspector, &inspect, &cwd, image).await?;

        let parsed: InspectOutput = serde_json::from_slice(&stdout)?;
        tracing::info!(image, digest = %parsed.digest, "Image published");
        Ok(parsed.digest)
    }
}
