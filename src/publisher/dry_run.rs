use crate::error::{CatalogError, Result};
use crate::publisher::ImagePublisher;
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Publishes nothing. The digest is a sha256 over the image name, the extra
/// arguments and every file in the context, so identical inputs always get
/// the same digest.
#[derive(Default)]
pub struct DryRunPublisher {
    published: Mutex<Vec<String>>,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images "published" so far, in call order
    pub fn published(&self) -> Vec<String> {
        self.published.lock().clone()
    }
}

fn digest_context(context: &Path, image: &str, extra_args: &[String]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(image.as_bytes());
    for arg in extra_args {
        hasher.update([0u8]);
        hasher.update(arg.as_bytes());
    }

    let mut files: Vec<_> = WalkDir::new(context)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for path in files {
        let rel = path.strip_prefix(context).unwrap_or(&path);
        hasher.update(rel.to_string_lossy().as_bytes());
        let data = fs::read(&path)
            .map_err(|e| CatalogError::io(format!("reading {}", path.display()), e))?;
        hasher.update(&data);
    }

    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[async_trait]
impl ImagePublisher for DryRunPublisher {
    async fn build_and_push(
        &self,
        context: &Path,
        image: &str,
        extra_args: &[String],
    ) -> Result<String> {
        let digest = digest_context(context, image, extra_args)?;
        tracing::info!(image, digest = %digest, context = %context.display(), "Dry run, not publishing");
        self.published.lock().push(image.to_string());
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_digest_tracks_context_contents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let publisher = DryRunPublisher::new();

        let first = publisher
            .build_and_push(dir.path(), "quay.io/ns:foo", &[])
            .await
            .unwrap();
        let again = publisher
            .build_and_push(dir.path(), "quay.io/ns:foo", &[])
            .await
            .unwrap();
        assert_eq!(first, again);
        assert!(first.starts_with("sha256:"));

        fs::write(dir.path().join("Dockerfile"), "FROM busybox\n").unwrap();
        let changed = publisher
            .build_and_push(dir.path(), "quay.io/ns:foo", &[])
            .await
            .unwrap();
        assert_ne!(first, changed);
        assert_eq!(publisher.published().len(), 3);
    }

    #[tokio::test]
    async fn test_build_args_change_digest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let publisher = DryRunPublisher::new();

        let a = publisher
            .build_and_push(dir.path(), "quay.io/ns:img", &["RELATED_IMAGE=a".to_string()])
            .await
            .unwrap();
        let b = publisher
            .build_and_push(dir.path(), "quay.io/ns:img", &["RELATED_IMAGE=b".to_string()])
            .await
            .unwrap();
        assert_ne!(a, b);
    }
}
