// Centralized constants for catalog construction to avoid magic strings

/// Token in bundle sources replaced by `<registry>/<namespace>` on render
pub const REGISTRY_PLACEHOLDER: &str = "REGISTRY_CATALOGNAMESPACE";

pub const DEFAULT_REGISTRY: &str = "quay.io";
pub const DEFAULT_NAMESPACE: &str = "redhatgov/oc-mirror-dev";
pub const DEFAULT_RUNTIME: &str = "podman";
pub const DEFAULT_INSPECTOR: &str = "skopeo";

/// File extensions never copied into a rendered bundle
pub const IGNORED_EXTENSIONS: &[&str] = &["swp"];

pub const ANNOTATION_PACKAGE: &str = "operators.operatorframework.io.bundle.package.v1";
pub const ANNOTATION_CHANNELS: &str = "operators.operatorframework.io.bundle.channels.v1";
pub const ANNOTATION_DEFAULT_CHANNEL: &str =
    "operators.operatorframework.io.bundle.channel.default.v1";
pub const ANNOTATION_SKIP_RANGE: &str = "olm.skipRange";

pub const MANIFESTS_DIR: &str = "manifests";
pub const METADATA_DIR: &str = "metadata";
pub const CSV_GLOB: &str = "*.csv.yaml";
pub const CRD_GLOB: &str = "*.crd.yaml";
pub const ANNOTATIONS_FILE: &str = "annotations.yaml";
pub const DEPENDENCIES_FILE: &str = "dependencies.yaml";

pub const BUNDLES_DIR: &str = "bundles";
pub const CATALOG_DIR: &str = "catalog";
pub const RELATED_IMAGE_DIR: &str = "related_image";
pub const INDEX_FILE: &str = "index.yaml";
pub const DOCKERFILE: &str = "Dockerfile";
pub const CATALOG_SOURCE_FILE: &str = "catalogSource.yaml";
pub const PACKAGE_README: &str = "README.md";

pub const ICON_MEDIA_TYPE: &str = "image/svg+xml";

/// Prefix of catalog names derived from definition names
pub const CATALOG_NAME_PREFIX: &str = "test-catalog-";

/// Default initial backoff for publisher retries in milliseconds
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

/// Default maximum backoff for publisher retries in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
