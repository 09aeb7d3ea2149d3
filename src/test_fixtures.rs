//! Bundle source trees for unit tests.
//!
//! ```ignore
//! let root = create_temp_dir();
//! BundleFixture::new("foo", "0.2.0").replaces("foo.v0.1.0").write(root.path());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[must_use]
pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Builder for `<root>/<package>/<package>-bundle-v<version>`
#[derive(Debug, Clone)]
pub struct BundleFixture {
    package: String,
    version: String,
    channels: Vec<String>,
    default_channel: Option<String>,
    replaces: Option<String>,
    skips: Vec<String>,
    related: Vec<(String, String)>,
}

impl BundleFixture {
    pub fn new(package: &str, version: &str) -> Self {
        Self {
            package: package.to_string(),
            version: version.to_string(),
            channels: vec!["stable".to_string()],
            default_channel: Some("stable".to_string()),
            replaces: None,
            skips: Vec::new(),
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

    pub fn default_channel(mut self, channel: Option<&str>) -> Self {
        self.default_channel = channel.map(String::from);
        self
    }

    pub fn replaces(mut self, bundle: &str) -> Self {
        self.replaces = Some(bundle.to_string());
        self
    }

    pub fn skips(mut self, bundle: &str) -> Self {
        self.skips.push(bundle.to_string());
        self
    }

    /// Add a related image tagged `<placeholder>:<tag>`
    pub fn related_image(mut self, name: &str, tag: &str) -> Self {
        self.related.push((name.to_string(), tag.to_string()));
        self
    }

    pub fn name(&self) -> String {
        format!("{}.v{}", self.package, self.version)
    }

    /// Write the bundle (and the package README/icon if missing); returns the bundle dir.
    pub fn write(&self, bundles_from: &Path) -> PathBuf {
        let package_dir = bundles_from.join(&self.package);
        write_package_assets(&package_dir, &self.package);

        let dir = package_dir.join(format!("{}-bundle-v{}", self.package, self.version));
        fs::create_dir_all(dir.join("manifests")).unwrap();
        fs::create_dir_all(dir.join("metadata")).unwrap();

        let mut csv = format!(
            "apiVersion: operators.coreos.com/v1alpha1\nkind: ClusterServiceVersion\nmetadata:\n  name: {}\nspec:\n  version: {}\n",
            self.name(),
            self.version
        );
        if let Some(replaces) = &self.replaces {
            csv.push_str(&format!("  replaces: {}\n", replaces));
        }
        if !self.skips.is_empty() {
            csv.push_str("  skips:\n");
            for skip in &self.skips {
                csv.push_str(&format!("    - {}\n", skip));
            }
        }
        csv.push_str("  relatedImages:\n");
        for (name, tag) in &self.related {
            csv.push_str(&format!(
                "    - name: {}\n      image: REGISTRY_CATALOGNAMESPACE:{}\n",
                name, tag
            ));
        }
        fs::write(dir.join("manifests").join(format!("{}.csv.yaml", self.package)), csv).unwrap();

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

fn write_package_assets(package_dir: &Path, package: &str) {
    fs::create_dir_all(package_dir).unwrap();
    let readme = package_dir.join("README.md");
    if !readme.exists() {
        fs::write(&readme, format!("# {}\n", package)).unwrap();
    }
    let icon = package_dir.join(format!("{}.svg", package));
    if !icon.exists() {
        fs::write(&icon, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();
    }
}
