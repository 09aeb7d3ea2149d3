//! Catalog assembly and the render/build state machine.
//!
//! `Constructed --render--> Rendered --build_and_publish--> Built`.
//! Rendering may be repeated from any state; building requires a render.

use crate::cache::DigestCache;
use crate::config::ImageTarget;
use crate::constants::{
    BUNDLES_DIR, CATALOG_DIR, CATALOG_SOURCE_FILE, DOCKERFILE, INDEX_FILE, RELATED_IMAGE_DIR,
};
use crate::document::{to_yaml_stream, CatalogDocument};
use crate::error::{CatalogError, Result};
use crate::package::PackageMetadata;
use crate::publisher::ImagePublisher;
use crate::render;
use crate::templates;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a catalog needs from the outside world, shared by all
/// catalogs of a run.
#[derive(Clone)]
pub struct PublishContext {
    pub target: ImageTarget,
    pub cache: Arc<DigestCache>,
    pub publisher: Arc<dyn ImagePublisher>,
}

impl PublishContext {
    pub fn new(target: ImageTarget, publisher: Arc<dyn ImagePublisher>) -> Self {
        Self {
            target,
            cache: Arc::new(DigestCache::new()),
            publisher,
        }
    }
}

/// Where package documents are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLayout {
    /// `catalog/<name>/index.yaml`
    Single,
    /// `catalog/<name>/<package>/index.yaml`
    PerPackage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogState {
    Constructed,
    Rendered { root: PathBuf },
    Built { root: PathBuf, digest: String },
}

pub struct CatalogGraph {
    name: String,
    selections: IndexMap<String, Vec<String>>,
    bundles_from: PathBuf,
    layout: DocumentLayout,
    packages: IndexMap<String, PackageMetadata>,
    state: CatalogState,
    ctx: PublishContext,
}

impl CatalogGraph {
    /// Discover every selected package under `bundles_from`.
    pub fn new(
        name: impl Into<String>,
        selections: IndexMap<String, Vec<String>>,
        bundles_from: &Path,
        layout: DocumentLayout,
        ctx: PublishContext,
    ) -> Result<Self> {
        let name = name.into();
        let mut packages = IndexMap::new();
        for (package, versions) in &selections {
            if packages.contains_key(package) {
                continue;
            }
            tracing::debug!(package = %package, catalog = %name, "Adding package to catalog");
            packages.insert(
                package.clone(),
                PackageMetadata::discover(package, versions, bundles_from)?,
            );
        }

        Ok(Self {
            name,
            selections,
            bundles_from: bundles_from.to_path_buf(),
            layout,
            packages,
            state: CatalogState::Constructed,
            ctx,
        })
    }

    /// Same packages and progress under a new name and layout, back in
    /// `Constructed`.
    pub fn respin(&self, name: impl Into<String>, layout: DocumentLayout) -> Self {
        Self {
            name: name.into(),
            selections: self.selections.clone(),
            bundles_from: self.bundles_from.clone(),
            layout,
            packages: self.packages.clone(),
            state: CatalogState::Constructed,
            ctx: self.ctx.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> DocumentLayout {
        self.layout
    }

    pub fn state(&self) -> &CatalogState {
        &self.state
    }

    pub fn is_rendered(&self) -> bool {
        !matches!(self.state, CatalogState::Constructed)
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, CatalogState::Built { .. })
    }

    pub fn package(&self, name: &str) -> Option<&PackageMetadata> {
        self.packages.get(name)
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageMetadata> {
        self.packages.values()
    }

    pub fn image(&self) -> String {
        self.ctx.target.catalog_image(&self.name)
    }

    fn index_dir(&self, root: &Path) -> PathBuf {
        root.join(CATALOG_DIR).join(&self.name)
    }

    /// Reject any bundle whose predecessor is owned by another package.
    fn check_replaces(&self) -> Result<()> {
        let owners: HashMap<&str, &str> = self
            .packages
            .values()
            .flat_map(|p| p.bundles().map(move |b| (b.name(), p.name())))
            .collect();
        for package in self.packages.values() {
            for bundle in package.bundles() {
                let Some(target) = bundle.replaces() else {
                    continue;
                };
                match owners.get(target) {
                    Some(owner) if *owner != package.name() => {
                        return Err(CatalogError::InvalidReplaces {
                            bundle: bundle.name().to_string(),
                            replaces: target.to_string(),
                            reason: format!("owned by package {}", owner),
                        });
                    }
                    _ => {}
                }
            }
            package.check_replaces()?;
        }
        Ok(())
    }

    /// Render bundles, documents, Dockerfile and CatalogSource from
    /// `source_root` into `dest_root`.
    ///
    /// Packages render concurrently into their own buffers; index files are
    /// only written when every package succeeded.
    pub async fn render(&mut self, source_root: &Path, dest_root: &Path) -> Result<()> {
        tracing::info!(catalog = %self.name, "Rendering catalog indexes");
        self.check_replaces()?;
        let bundle_root = dest_root.join(BUNDLES_DIR);
        let catalog_dir = dest_root.join(CATALOG_DIR);
        let index_dir = self.index_dir(dest_root);
        for dir in [&bundle_root, &catalog_dir, &index_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| CatalogError::io(format!("creating {}", dir.display()), e))?;
        }

        let related_context = dest_root.join(RELATED_IMAGE_DIR);
        if !related_context.exists() {
            render::copy_verbatim(&source_root.join(RELATED_IMAGE_DIR), &related_context)?;
        }

        for package in self.packages.keys() {
            let dir = bundle_root.join(package);
            fs::create_dir_all(&dir)
                .map_err(|e| CatalogError::io(format!("creating {}", dir.display()), e))?;
        }

        let ctx = &self.ctx;
        let outcomes = futures::future::join_all(self.packages.values_mut().map(|package| {
            let dest = bundle_root.join(package.name());
            let related_context = related_context.clone();
            async move {
                tracing::info!(package = %package.name(), "Processing package index");
                let outcome = package.render(ctx, &dest, &related_context).await;
                (package.name().to_string(), outcome)
            }
        }))
        .await;

        let mut rendered: Vec<(String, Vec<CatalogDocument>)> = Vec::new();
        let mut failed = Vec::new();
        for (package, outcome) in outcomes {
            match outcome {
                Ok(documents) => rendered.push((package, documents)),
                Err(e) => {
                    tracing::error!(package = %package, error = %e, "Package render failed");
                    failed.push((package, e.to_string()));
                }
            }
        }
        if !failed.is_empty() {
            return Err(CatalogError::IncompleteCatalog {
                catalog: self.name.clone(),
                failed,
            });
        }

        self.write_indexes(&index_dir, &rendered)?;

        let files = [
            (DOCKERFILE, templates::catalog_dockerfile(&self.name)),
            (
                CATALOG_SOURCE_FILE,
                templates::catalog_source(&self.name, &self.image()),
            ),
        ];
        for (file, contents) in files {
            let path = catalog_dir.join(file);
            tracing::debug!(path = %path.display(), "Rendering catalog file");
            fs::write(&path, contents)
                .map_err(|e| CatalogError::io(format!("writing {}", path.display()), e))?;
        }

        self.state = CatalogState::Rendered {
            root: dest_root.to_path_buf(),
        };
        Ok(())
    }

    fn write_indexes(&self, index_dir: &Path, rendered: &[(String, Vec<CatalogDocument>)]) -> Result<()> {
        let write = |path: &Path, documents: &[CatalogDocument]| -> Result<()> {
            fs::write(path, to_yaml_stream(documents)?)
                .map_err(|e| CatalogError::io(format!("writing {}", path.display()), e))
        };

        match self.layout {
            DocumentLayout::Single => {
                let all: Vec<CatalogDocument> = rendered
                    .iter()
                    .flat_map(|(_, documents)| documents.iter().cloned())
                    .collect();
                write(&index_dir.join(INDEX_FILE), &all)
            }
            DocumentLayout::PerPackage => {
                for (package, documents) in rendered {
                    let dir = index_dir.join(package);
                    fs::create_dir_all(&dir)
                        .map_err(|e| CatalogError::io(format!("creating {}", dir.display()), e))?;
                    write(&dir.join(INDEX_FILE), documents)?;
                }
                Ok(())
            }
        }
    }

    fn rendered_root(&self) -> Result<PathBuf> {
        match &self.state {
            CatalogState::Constructed => Err(CatalogError::NotRendered {
                catalog: self.name.clone(),
            }),
            CatalogState::Rendered { root } | CatalogState::Built { root, .. } => Ok(root.clone()),
        }
    }

    /// Publish the catalog image and, unless `catalog_only`, every bundle
    /// image not yet published.
    pub async fn build_and_publish(&mut self, catalog_only: bool) -> Result<()> {
        let root = self.rendered_root()?;
        tracing::info!(catalog = %self.name, "Building images for catalog");

        let image = self.image();
        tracing::info!(image = %image, "Building and pushing catalog image");
        let digest = self
            .ctx
            .publisher
            .build_and_push(&root.join(CATALOG_DIR), &image, &[])
            .await?;

        if !catalog_only {
            let bundle_root = root.join(BUNDLES_DIR);
            let ctx = &self.ctx;
            let outcomes = futures::future::join_all(self.packages.values_mut().map(|package| {
                let context = bundle_root.join(package.name());
                async move {
                    let outcome = package.build_and_publish(ctx, &context).await;
                    (package.name().to_string(), outcome)
                }
            }))
            .await;

            let failed: Vec<(String, String)> = outcomes
                .into_iter()
                .filter_map(|(package, outcome)| outcome.err().map(|e| (package, e.to_string())))
                .collect();
            if !failed.is_empty() {
                return Err(CatalogError::IncompleteCatalog {
                    catalog: self.name.clone(),
                    failed,
                });
            }
        }

        self.state = CatalogState::Built { root, digest };
        Ok(())
    }

    pub fn catalog_source_path(&self) -> Result<PathBuf> {
        Ok(self.rendered_root()?.join(CATALOG_DIR).join(CATALOG_SOURCE_FILE))
    }

    /// The rendered CatalogSource manifest.
    pub fn catalog_source(&self) -> Result<String> {
        let path = self.catalog_source_path()?;
        if !self.is_built() {
            tracing::warn!(
                catalog = %self.name,
                "CatalogSource will be invalid without published images, and they have not yet been published"
            );
        }
        fs::read_to_string(&path)
            .map_err(|e| CatalogError::io(format!("reading {}", path.display()), e))
    }
}
