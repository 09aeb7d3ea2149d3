//! One versioned operator release and its catalog properties.

use crate::cache::DigestCache;
use crate::config::ImageTarget;
use crate::constants::{
    ANNOTATIONS_FILE, ANNOTATION_CHANNELS, ANNOTATION_DEFAULT_CHANNEL, ANNOTATION_PACKAGE,
    ANNOTATION_SKIP_RANGE, CRD_GLOB, CSV_GLOB, DEPENDENCIES_FILE, MANIFESTS_DIR, METADATA_DIR,
};
use crate::document::{
    BundleDocument, BundleObject, GroupVersionKind, PackageProperty, PackageRequirement,
    Property, RelatedImage,
};
use crate::error::{CatalogError, Result};
use crate::publisher::ImagePublisher;
use crate::reference::pin_to_digest;
use crate::render;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// A dependency as declared in `metadata/dependencies.yaml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Default, Deserialize)]
struct DependencyFile {
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotationFile {
    #[serde(default)]
    annotations: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageDependencyValue {
    package_name: String,
    version: String,
}

#[derive(Debug, Clone)]
pub struct BundleDescriptor {
    path: PathBuf,
    manifest_path: PathBuf,
    name: String,
    package: String,
    version: semver::Version,
    channels: Vec<String>,
    default_channel: Option<String>,
    replaces: Option<String>,
    skips: Vec<String>,
    skip_range: Option<String>,
    owned: Vec<GroupVersionKind>,
    dependencies: Vec<Dependency>,
    related_images: Vec<RelatedImage>,
    manifest: Value,
    resource_definitions: Vec<Value>,
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path, bundle: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .map_err(|e| CatalogError::malformed(bundle, format!("reading {}: {}", path.display(), e)))?;
    serde_yaml::from_str(&text)
        .map_err(|e| CatalogError::malformed(bundle, format!("parsing {}: {}", path.display(), e)))
}

fn matching_files(dir: &Path, pattern: &str, bundle: &Path) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(pattern);
    let mut files = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| CatalogError::malformed(bundle, e.to_string()))?
        .filter_map(|entry| entry.ok())
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

fn string_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

impl BundleDescriptor {
    /// Parse a bundle source directory.
    pub fn load(path: &Path) -> Result<Self> {
        let manifests = path.join(MANIFESTS_DIR);
        let metadata = path.join(METADATA_DIR);

        let manifest_path = matching_files(&manifests, CSV_GLOB, path)?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::malformed(path, "no manifests/*.csv.yaml found"))?;
        let manifest: Value = read_yaml(&manifest_path, path)?;

        let name = string_at(&manifest, "/metadata/name")
            .ok_or_else(|| CatalogError::malformed(path, "manifest has no metadata.name"))?
            .to_string();
        let raw_version = string_at(&manifest, "/spec/version")
            .ok_or_else(|| CatalogError::malformed(path, "manifest has no spec.version"))?;
        let version = semver::Version::parse(raw_version).map_err(|e| {
            CatalogError::malformed(path, format!("invalid version {}: {}", raw_version, e))
        })?;

        let annotations: AnnotationFile = read_yaml(&metadata.join(ANNOTATIONS_FILE), path)?;
        let annotations = annotations.annotations;
        let package = annotations
            .get(ANNOTATION_PACKAGE)
            .map(|p| p.split('.').next().unwrap_or(p).to_string())
            .ok_or_else(|| CatalogError::malformed(path, "package annotation missing"))?;
        let channels: Vec<String> = annotations
            .get(ANNOTATION_CHANNELS)
            .ok_or_else(|| CatalogError::malformed(path, "channels annotation missing"))?
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if channels.is_empty() {
            return Err(CatalogError::malformed(path, "channels annotation is empty"));
        }
        let default_channel = annotations.get(ANNOTATION_DEFAULT_CHANNEL).cloned();

        let dependencies_path = metadata.join(DEPENDENCIES_FILE);
        let dependencies = if dependencies_path.is_file() {
            read_yaml::<DependencyFile>(&dependencies_path, path)?.dependencies
        } else {
            Vec::new()
        };

        let related_images = match manifest.pointer("/spec/relatedImages") {
            Some(images) => serde_json::from_value(images.clone()).map_err(|e| {
                CatalogError::malformed(path, format!("invalid spec.relatedImages: {}", e))
            })?,
            None => Vec::new(),
        };
        let owned = match manifest.pointer("/spec/customresourcedefinitions/owned") {
            Some(owned) => serde_json::from_value(owned.clone()).map_err(|e| {
                CatalogError::malformed(path, format!("invalid owned resource kinds: {}", e))
            })?,
            None => Vec::new(),
        };
        let skips = match manifest.pointer("/spec/skips") {
            Some(skips) => serde_json::from_value(skips.clone())
                .map_err(|e| CatalogError::malformed(path, format!("invalid spec.skips: {}", e)))?,
            None => Vec::new(),
        };

        let mut resource_definitions = Vec::new();
        for crd in matching_files(&manifests, CRD_GLOB, path)? {
            resource_definitions.push(read_yaml(&crd, path)?);
        }

        Ok(Self {
            path: path.to_path_buf(),
            replaces: string_at(&manifest, "/spec/replaces").map(String::from),
            skip_range: manifest
                .pointer("/metadata/annotations")
                .and_then(|a| a.get(ANNOTATION_SKIP_RANGE))
                .and_then(Value::as_str)
                .map(String::from),
            manifest_path,
            name,
            package,
            version,
            channels,
            default_channel,
            skips,
            owned,
            dependencies,
            related_images,
            manifest,
            resource_definitions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used for the bundle image tag
    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn default_channel(&self) -> Option<&str> {
        self.default_channel.as_deref()
    }

    pub fn replaces(&self) -> Option<&str> {
        self.replaces.as_deref()
    }

    /// A predecessor must be another bundle of the same package.
    pub fn check_replaces(&self) -> Result<()> {
        let Some(target) = self.replaces.as_deref() else {
            return Ok(());
        };
        let invalid = |reason: &str| CatalogError::InvalidReplaces {
            bundle: self.name.clone(),
            replaces: target.to_string(),
            reason: reason.to_string(),
        };
        if target == self.name {
            return Err(invalid("a bundle cannot replace itself"));
        }
        if !target.starts_with(&format!("{}.", self.package)) {
            return Err(invalid(&format!("not a bundle of package {}", self.package)));
        }
        Ok(())
    }

    pub fn skips(&self) -> &[String] {
        &self.skips
    }

    pub fn skip_range(&self) -> Option<&str> {
        self.skip_range.as_deref()
    }

    pub fn owned_kinds(&self) -> &[GroupVersionKind] {
        &self.owned
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    pub fn image(&self, target: &ImageTarget) -> String {
        target.bundle_image(&self.dir_name())
    }

    /// Version ordering, defined only within one package.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering> {
        if self.package != other.package {
            return Err(CatalogError::IncomparableVersions {
                left: self.name.clone(),
                left_package: self.package.clone(),
                right: other.name.clone(),
                right_package: other.package.clone(),
            });
        }
        Ok(self.version.cmp(&other.version))
    }

    pub fn is_older_than(&self, other: &Self) -> Result<bool> {
        Ok(self.try_cmp(other)? == Ordering::Less)
    }

    pub fn is_newer_than(&self, other: &Self) -> Result<bool> {
        Ok(self.try_cmp(other)? == Ordering::Greater)
    }

    /// Related images with the registry placeholder substituted.
    pub fn related_images<'a>(
        &'a self,
        target: &'a ImageTarget,
    ) -> impl Iterator<Item = RelatedImage> + 'a {
        self.related_images.iter().map(move |img| RelatedImage {
            name: img.name.clone(),
            image: target.rename(&img.image),
        })
    }

    /// Build or look up one related image through the shared cache.
    pub async fn resolve_related_image(
        &self,
        reference: &str,
        cache: &DigestCache,
        publisher: &dyn ImagePublisher,
        context: &Path,
    ) -> Result<String> {
        cache
            .resolve(reference, |image| async move {
                let build_arg = format!("RELATED_IMAGE={}", image);
                publisher
                    .build_and_push(context, &image, &["--build-arg".to_string(), build_arg])
                    .await
            })
            .await
    }

    /// Resolve every related image, concurrently; duplicates collapse in the cache.
    pub async fn resolve_related_images(
        &self,
        target: &ImageTarget,
        cache: &DigestCache,
        publisher: &dyn ImagePublisher,
        context: &Path,
    ) -> Result<BTreeMap<String, String>> {
        tracing::info!(bundle = %self.name, "Building and pushing related images to resolve manifest references");
        let references: Vec<String> = self.related_images(target).map(|i| i.image).collect();
        let digests = futures::future::try_join_all(
            references
                .iter()
                .map(|r| self.resolve_related_image(r, cache, publisher, context)),
        )
        .await?;
        Ok(references.into_iter().zip(digests).collect())
    }

    fn digest_for(&self, reference: &str, cache: &DigestCache) -> Result<String> {
        cache
            .lookup(reference)
            .ok_or_else(|| CatalogError::UnresolvedReference {
                bundle: self.name.clone(),
                reference: reference.to_string(),
            })
    }

    /// Related images pinned to their resolved digests.
    pub fn related_images_by_digest(
        &self,
        target: &ImageTarget,
        cache: &DigestCache,
    ) -> Result<Vec<RelatedImage>> {
        self.related_images(target)
            .map(|img| {
                let digest = self.digest_for(&img.image, cache)?;
                Ok(RelatedImage {
                    name: img.name,
                    image: pin_to_digest(&img.image, &digest),
                })
            })
            .collect()
    }

    /// `(tag reference, digest reference)` pairs, longest tag first so a
    /// reference that prefixes another is substituted after it.
    fn substitutions(&self, target: &ImageTarget, cache: &DigestCache) -> Result<Vec<(String, String)>> {
        let mut pairs: BTreeMap<String, String> = BTreeMap::new();
        for img in self.related_images(target) {
            let digest = self.digest_for(&img.image, cache)?;
            let pinned = pin_to_digest(&img.image, &digest);
            pairs.insert(img.image, pinned);
        }
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(pairs)
    }

    /// Serialized manifest with every related-image tag replaced by its digest form.
    pub fn manifest_json_with_digests(
        &self,
        target: &ImageTarget,
        cache: &DigestCache,
    ) -> Result<String> {
        let json = serde_json::to_string(&target_manifest(&self.manifest, target)?)?;
        let pairs = self.substitutions(target, cache)?;
        if pairs.is_empty() {
            return Ok(json);
        }

        // One pass over the text: a replacement is never rescanned, and a
        // reference only matches when no further reference character follows.
        let alternation = pairs
            .iter()
            .map(|(tag, _)| regex::escape(tag))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(
            r"(?P<reference>{})(?P<end>[^A-Za-z0-9._:/@\-]|$)",
            alternation
        ))
        .map_err(|e| CatalogError::Other(anyhow::anyhow!("reference pattern: {}", e)))?;

        let lookup: HashMap<&str, &str> = pairs
            .iter()
            .map(|(tag, pinned)| {
                tracing::debug!(from = %tag, to = %pinned, "Replacing manifest references");
                (tag.as_str(), pinned.as_str())
            })
            .collect();
        let replaced = pattern.replace_all(&json, |caps: &Captures| {
            let reference = &caps["reference"];
            let pinned = lookup.get(reference).copied().unwrap_or(reference);
            format!("{}{}", pinned, &caps["end"])
        });
        Ok(replaced.into_owned())
    }

    pub fn manifest_with_digests(&self, target: &ImageTarget, cache: &DigestCache) -> Result<Value> {
        Ok(serde_json::from_str(
            &self.manifest_json_with_digests(target, cache)?,
        )?)
    }

    /// Catalog properties: owned kinds, package identity, requirements, objects.
    pub fn properties(&self, target: &ImageTarget, cache: &DigestCache) -> Result<Vec<Property>> {
        let mut properties: Vec<Property> = self.owned.iter().cloned().map(Property::Gvk).collect();

        properties.push(Property::Package(PackageProperty {
            package_name: self.package.clone(),
            version: self.version.to_string(),
        }));

        for dependency in &self.dependencies {
            properties.push(self.requirement(dependency)?);
        }

        properties.push(objectify(&self.manifest_with_digests(target, cache)?)?);
        for definition in &self.resource_definitions {
            properties.push(objectify(definition)?);
        }

        Ok(properties)
    }

    fn requirement(&self, dependency: &Dependency) -> Result<Property> {
        let invalid = |e: serde_json::Error| {
            CatalogError::malformed(
                &self.path,
                format!("invalid {} dependency: {}", dependency.kind, e),
            )
        };
        match dependency.kind.as_str() {
            "olm.package" => {
                let value: PackageDependencyValue =
                    serde_json::from_value(dependency.value.clone()).map_err(invalid)?;
                Ok(Property::PackageRequired(PackageRequirement {
                    package_name: value.package_name,
                    version_range: value.version,
                }))
            }
            "olm.gvk" => Ok(Property::GvkRequired(
                serde_json::from_value(dependency.value.clone()).map_err(invalid)?,
            )),
            other => Err(CatalogError::UnsupportedDependencyType {
                bundle: self.name.clone(),
                kind: other.to_string(),
            }),
        }
    }

    /// The `olm.bundle` document for this bundle.
    pub fn index_entry(&self, target: &ImageTarget, cache: &DigestCache) -> Result<BundleDocument> {
        Ok(BundleDocument {
            package: self.package.clone(),
            name: self.name.clone(),
            image: self.image(target),
            csv_json: self.manifest_json_with_digests(target, cache)?,
            properties: self.properties(target, cache)?,
            related_images: self.related_images_by_digest(target, cache)?,
        })
    }

    /// Copy this bundle's sources under `dest` with placeholders substituted,
    /// returning a descriptor for the copy. `self` is left untouched.
    pub fn render_into(&self, dest: &Path, target: &ImageTarget) -> Result<BundleDescriptor> {
        tracing::info!(bundle = %self.name, "Rendering bundle");
        let rendered_dir = dest.join(self.dir_name());
        render::translate_tree(&self.path, &rendered_dir, target)?;
        BundleDescriptor::load(&rendered_dir)
    }

    /// Rewrite the manifest file on disk with digest references.
    pub fn write_manifest_with_digests(&self, target: &ImageTarget, cache: &DigestCache) -> Result<()> {
        let manifest = self.manifest_with_digests(target, cache)?;
        let yaml = format!("---\n{}", serde_yaml::to_string(&manifest)?);
        fs::write(&self.manifest_path, yaml).map_err(|e| {
            CatalogError::io(format!("writing {}", self.manifest_path.display()), e)
        })
    }
}

/// Manifest as seen from the target registry (placeholders substituted).
fn target_manifest(manifest: &Value, target: &ImageTarget) -> Result<Value> {
    let json = serde_json::to_string(manifest)?;
    Ok(serde_json::from_str(&target.rename(&json))?)
}

fn objectify(thing: &Value) -> Result<Property> {
    let json = serde_json::to_string(thing)?;
    Ok(Property::BundleObject(BundleObject {
        data: STANDARD.encode(json.as_bytes()),
    }))
}
