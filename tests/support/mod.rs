//! Shared fixtures for integration tests: bundle source trees and a
//! publisher that records what it was asked to build.
#![allow(dead_code)]

use async_trait::async_trait;
use catalogsmith::{CatalogError, ImagePublisher, ImageTarget, PublishContext, Result};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const REGISTRY: &str = "quay.io";
pub const NAMESPACE: &str = "test/ns";

pub fn target() -> ImageTarget {
    ImageTarget::new(REGISTRY, NAMESPACE)
}

/// `quay.io/test/ns:<tag>`
pub fn image(tag: &str) -> String {
    format!("{}/{}:{}", REGISTRY, NAMESPACE, tag)
}

/// Digest the recording publisher returns for the `build`-th build of `image`
pub fn digest_for(image: &str, build: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}#{}", image, build).as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// `<repository>@<digest>` for the first build of the image tagged `tag`
pub fn pinned(tag: &str) -> String {
    format!("{}/{}@{}", REGISTRY, NAMESPACE, digest_for(&image(tag), 1))
}

/// Publisher returning deterministic digests and counting calls per image.
#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<HashMap<String, usize>>,
    order: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make every build of `image` fail
    pub fn fail_on(&self, image: &str) {
        self.failing.lock().insert(image.to_string());
    }

    pub fn builds_of(&self, image: &str) -> usize {
        self.calls.lock().get(image).copied().unwrap_or(0)
    }

    pub fn total_builds(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn published(&self) -> Vec<String> {
        self.order.lock().clone()
    }
}

#[async_trait]
impl ImagePublisher for RecordingPublisher {
    async fn build_and_push(
        &self,
        _context: &Path,
        image: &str,
        _extra_args: &[String],
    ) -> Result<String> {
        let count = {
            let mut calls = self.calls.lock();
            let count = calls.entry(image.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.order.lock().push(image.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(image) {
            return Err(CatalogError::ExternalBuildFailure {
                image: image.to_string(),
                command: format!("podman push --format=docker {}", image),
                code: Some(125),
                last_line: Some("Error: unauthorized".to_string()),
            });
        }
        Ok(digest_for(image, count))
    }
}

pub fn context(publisher: Arc<RecordingPublisher>) -> PublishContext {
    PublishContext::new(target(), publisher)
}

/// Operator directory holding `bundles/` and `related_image/`.
pub struct OperatorDir {
    pub dir: TempDir,
}

impl OperatorDir {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create operator dir");
        let related = dir.path().join("related_image");
        fs::create_dir_all(&related).unwrap();
        fs::write(
            related.join("Dockerfile"),
            "FROM registry.access.redhat.com/ubi8/ubi-minimal\nARG RELATED_IMAGE\nLABEL related=$RELATED_IMAGE\n",
        )
        .unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn bundles(&self) -> PathBuf {
        self.dir.path().join("bundles")
    }

    /// Fresh output directory inside the operator dir
    pub fn output(&self, name: &str) -> PathBuf {
        let out = self.dir.path().join("out").join(name);
        fs::create_dir_all(&out).unwrap();
        out
    }

    pub fn add(&self, bundle: Bundle) -> &Self {
        bundle.write(&self.bundles());
        self
    }
}

/// One bundle source tree under `<bundles>/<package>/<package>-bundle-v<version>`
#[derive(Debug, Clone)]
pub struct Bundle {
    package: String,
    version: String,
    channels: Vec<String>,
    default_channel: Option<String>,
    replaces: Option<String>,
    related: Vec<(String, String)>,
}

impl Bundle {
    pub fn new(package: &str, version: &str) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
            channels: vec!["stable".to_string()],
            default_channel: Some("stable".to_string()),
            replaces: None,
            related: vec![(
                "operator".to_string(),
                format!("{}-operator-v{}", package, version),
            )],
        }
    }

    pub fn channels(mut self, channels: &[&str]) -> Self {
        self.channels = channels.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn replaces(mut self, bundle: &str) -> Self {
        self.replaces = Some(bundle.to_string());
        self
    }

    /// Replace the related images with `(name, tag)` pairs
    pub fn related(mut self, images: &[(&str, &str)]) -> Self {
        self.related = images
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect();
        self
    }

    pub fn write(&self, bundles_from: &Path) -> PathBuf {
        let package_dir = bundles_from.join(&self.package);
        fs::create_dir_all(&package_dir).unwrap();
        fs::write(
            package_dir.join("README.md"),
            format!("The {} operator.\n", self.package),
        )
        .unwrap();
        fs::write(
            package_dir.join(format!("{}.svg", self.package)),
            "<svg xmlns=\"http://www.w3.org/2000/svg\"/>",
        )
        .unwrap();

        let dir = package_dir.join(format!("{}-bundle-v{}", self.package, self.version));
        fs::create_dir_all(dir.join("manifests")).unwrap();
        fs::create_dir_all(dir.join("metadata")).unwrap();

        let mut csv = format!(
            "apiVersion: operators.coreos.com/v1alpha1\nkind: ClusterServiceVersion\nmetadata:\n  name: {p}.v{v}\n  annotations:\n    containerImage: REGISTRY_CATALOGNAMESPACE:{p}-operator-v{v}\nspec:\n  version: {v}\n",
            p = self.package,
            v = self.version
        );
        if let Some(replaces) = &self.replaces {
            csv.push_str(&format!("  replaces: {}\n", replaces));
        }
        csv.push_str(&format!(
            "  customresourcedefinitions:\n    owned:\n      - group: {p}.example.com\n        version: v1\n        kind: {kind}\n",
            p = self.package,
            kind = capitalize(&self.package)
        ));
        csv.push_str("  relatedImages:\n");
        for (name, tag) in &self.related {
            csv.push_str(&format!(
                "    - name: {}\n      image: REGISTRY_CATALOGNAMESPACE:{}\n",
                name, tag
            ));
        }
        fs::write(
            dir.join("manifests").join(format!("{}.csv.yaml", self.package)),
            csv,
        )
        .unwrap();
        fs::write(
            dir.join("manifests").join(format!("{}s.crd.yaml", self.package)),
            format!(
                "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: {p}s.{p}.example.com\n",
                p = self.package
            ),
        )
        .unwrap();

        let mut annotations = format!(
            "annotations:\n  operators.operatorframework.io.bundle.package.v1: {}\n  operators.operatorframework.io.bundle.channels.v1: {}\n",
            self.package,
            self.channels.join(",")
        );
        if let Some(default) = &self.default_channel {
            annotations.push_str(&format!(
                "  operators.operatorframework.io.bundle.channel.default.v1: {}\n",
                default
            ));
        }
        fs::write(dir.join("metadata").join("annotations.yaml"), annotations).unwrap();
        dir
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The foo/bar packages behind the stock test catalogs.
pub fn stock_operator_dir() -> OperatorDir {
    let dir = OperatorDir::new();
    dir.add(Bundle::new("foo", "0.1.0"))
        .add(Bundle::new("foo", "0.1.1").replaces("foo.v0.1.0"))
        .add(Bundle::new("foo", "0.2.0").replaces("foo.v0.1.0"))
        .add(Bundle::new("foo", "0.3.0").replaces("foo.v0.2.0"))
        .add(Bundle::new("foo", "0.3.1").replaces("foo.v0.3.0"))
        .add(Bundle::new("bar", "0.1.0"))
        .add(Bundle::new("bar", "0.2.0").replaces("bar.v0.1.0"));
    dir
}
