use crate::bundle::BundleDescriptor;
use crate::catalog::PublishContext;
use crate::channel::ChannelGraph;
use crate::constants::{ICON_MEDIA_TYPE, PACKAGE_README};
use crate::document::{BundleDocument, CatalogDocument, Icon, PackageDocument};
use crate::error::{CatalogError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-bundle progress within one catalog build
#[derive(Debug, Clone, Default)]
pub struct BundleProgress {
    /// Destination directory -> document produced when rendered there
    pub rendered: HashMap<PathBuf, BundleDocument>,
    /// Digest of the published bundle image
    pub digest: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PackageMetadata {
    name: String,
    versions: Vec<String>,
    bundles_from: PathBuf,
    default_channel: Option<String>,
    bundles: IndexMap<String, Arc<BundleDescriptor>>,
    channels: IndexMap<String, ChannelGraph>,
    progress: HashMap<String, BundleProgress>,
}

impl PackageMetadata {
    /// Discover `<bundles_from>/<name>/<name>-bundle-v<version>` for each
    /// requested version. Missing versions are skipped with a warning.
    pub fn discover(name: &str, versions: &[String], bundles_from: &Path) -> Result<Self> {
        let mut package = Self {
            name: name.to_string(),
            versions: versions.to_vec(),
            bundles_from: bundles_from.to_path_buf(),
            default_channel: None,
            bundles: IndexMap::new(),
            channels: IndexMap::new(),
            progress: HashMap::new(),
        };

        for version in versions {
            let bundle_dir = package.dir().join(format!("{}-bundle-v{}", name, version));
            if !bundle_dir.is_dir() {
                tracing::warn!(path = %bundle_dir.display(), package = name, "Bundle directory not present, skipping");
                continue;
            }
            let bundle = BundleDescriptor::load(&bundle_dir)?;
            if bundle.package() != name {
                return Err(CatalogError::malformed(
                    &bundle_dir,
                    format!(
                        "annotated as package {} but stored under package {}",
                        bundle.package(),
                        name
                    ),
                ));
            }
            package.add_bundle(bundle)?;
        }

        Ok(package)
    }

    /// Register a bundle and its channel memberships. Idempotent by bundle name.
    pub fn add_bundle(&mut self, bundle: BundleDescriptor) -> Result<()> {
        if self.bundles.contains_key(bundle.name()) {
            return Ok(());
        }
        if let Some(existing) = self.bundles.values().next() {
            existing.try_cmp(&bundle)?;
        }

        let bundle = Arc::new(bundle);
        for channel in bundle.channels() {
            if !self.channels.contains_key(channel) {
                tracing::debug!(channel = %channel, package = %self.name, "Adding channel to package");
            }
            self.channels
                .entry(channel.clone())
                .or_insert_with(|| ChannelGraph::new(channel.clone()))
                .add_bundle(bundle.clone())?;
        }
        self.bundles.insert(bundle.name().to_string(), bundle);
        self.default_channel = self.highest_declared_default();
        Ok(())
    }

    /// Default channel annotation of the highest-version bundle declaring one
    fn highest_declared_default(&self) -> Option<String> {
        self.bundles
            .values()
            .filter(|b| b.default_channel().is_some())
            .max_by(|a, b| a.version().cmp(b.version()))
            .and_then(|b| b.default_channel().map(String::from))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn default_channel(&self) -> Option<&str> {
        self.default_channel.as_deref()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelGraph> {
        self.channels.get(name)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelGraph> {
        self.channels.values()
    }

    pub fn bundle(&self, name: &str) -> Option<&Arc<BundleDescriptor>> {
        self.bundles.get(name)
    }

    pub fn bundles(&self) -> impl Iterator<Item = &Arc<BundleDescriptor>> {
        self.bundles.values()
    }

    pub fn progress(&self, bundle: &str) -> Option<&BundleProgress> {
        self.progress.get(bundle)
    }

    /// Source directory of the package
    pub fn dir(&self) -> PathBuf {
        self.bundles_from.join(&self.name)
    }

    fn icon_file(&self) -> String {
        format!("{}.svg", self.name)
    }

    pub fn description(&self) -> Result<String> {
        let path = self.dir().join(PACKAGE_README);
        fs::read_to_string(&path)
            .map_err(|e| CatalogError::io(format!("reading {}", path.display()), e))
    }

    /// Icon, base64 encoded
    pub fn icon(&self) -> Result<String> {
        let path = self.dir().join(self.icon_file());
        let data = fs::read(&path)
            .map_err(|e| CatalogError::io(format!("reading {}", path.display()), e))?;
        Ok(STANDARD.encode(data))
    }

    pub fn index_entry(&self) -> Result<PackageDocument> {
        Ok(PackageDocument {
            name: self.name.clone(),
            description: self.description()?,
            icon: Icon {
                base64data: self.icon()?,
                mediatype: ICON_MEDIA_TYPE.to_string(),
            },
            default_channel: self.default_channel.clone(),
        })
    }

    /// Every declared predecessor must name a bundle of this package.
    pub fn check_replaces(&self) -> Result<()> {
        self.bundles.values().try_for_each(|b| b.check_replaces())
    }

    /// Bundles in channel order, each once
    fn bundles_in_channel_order(&self) -> Vec<Arc<BundleDescriptor>> {
        let mut seen = HashSet::new();
        self.channels
            .values()
            .flat_map(|c| c.members().iter())
            .filter(|b| seen.insert(b.name().to_string()))
            .cloned()
            .collect()
    }

    /// Render every bundle not yet rendered to `dest` and return the
    /// package's documents. Nothing is written to the catalog index here.
    pub async fn render(
        &mut self,
        ctx: &PublishContext,
        dest: &Path,
        related_context: &Path,
    ) -> Result<Vec<CatalogDocument>> {
        tracing::info!(package = %self.name, "Rendering package");
        self.check_replaces()?;
        let package_entry = self.index_entry()?;

        let pending: Vec<Arc<BundleDescriptor>> = self
            .bundles_in_channel_order()
            .into_iter()
            .filter(|b| {
                self.progress
                    .get(b.name())
                    .map(|p| !p.rendered.contains_key(dest))
                    .unwrap_or(true)
            })
            .collect();

        let mut rendered = Vec::with_capacity(pending.len());
        for bundle in &pending {
            rendered.push(bundle.render_into(dest, &ctx.target)?);
        }

        futures::future::try_join_all(rendered.iter().map(|b| {
            b.resolve_related_images(
                &ctx.target,
                &ctx.cache,
                ctx.publisher.as_ref(),
                related_context,
            )
        }))
        .await?;

        for copy in &rendered {
            copy.write_manifest_with_digests(&ctx.target, &ctx.cache)?;
            let entry = copy.index_entry(&ctx.target, &ctx.cache)?;
            self.progress
                .entry(copy.name().to_string())
                .or_default()
                .rendered
                .insert(dest.to_path_buf(), entry);
        }

        let mut documents = vec![CatalogDocument::Package(package_entry)];
        let mut emitted = HashSet::new();
        for channel in self.channels.values() {
            documents.push(CatalogDocument::Channel(channel.index_entry()?));
            for bundle in channel.members() {
                if !emitted.insert(bundle.name().to_string()) {
                    continue;
                }
                let entry = self
                    .progress
                    .get(bundle.name())
                    .and_then(|p| p.rendered.get(dest))
                    .cloned()
                    .ok_or_else(|| {
                        CatalogError::Other(anyhow::anyhow!(
                            "bundle {} has no document for {}",
                            bundle.name(),
                            dest.display()
                        ))
                    })?;
                documents.push(CatalogDocument::Bundle(entry));
            }
        }

        for file in [self.icon_file(), PACKAGE_README.to_string()] {
            let from = self.dir().join(&file);
            let to = dest.join(&file);
            tracing::debug!(from = %from.display(), to = %to.display(), "Copying package asset");
            fs::copy(&from, &to)
                .map_err(|e| CatalogError::io(format!("copying {}", from.display()), e))?;
        }

        Ok(documents)
    }

    /// Build and push every bundle image not yet published.
    pub async fn build_and_publish(&mut self, ctx: &PublishContext, bundle_root: &Path) -> Result<()> {
        let bundles: Vec<Arc<BundleDescriptor>> = self.bundles_in_channel_order();
        for bundle in bundles {
            let image = bundle.image(&ctx.target);
            let progress = self.progress.entry(bundle.name().to_string()).or_default();
            if progress.digest.is_some() {
                tracing::debug!(image = %image, "Bundle image appears to already be built");
                continue;
            }

            tracing::info!(image = %image, "Building and pushing bundle image");
            let context = bundle_root.join(bundle.dir_name());
            let digest = ctx.publisher.build_and_push(&context, &image, &[]).await?;
            tracing::debug!(image = %image, digest = %digest, "Bundle image published");
            progress.digest = Some(digest);
        }
        Ok(())
    }
}

/// Packages are the same package when their names match.
impl PartialEq for PackageMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
