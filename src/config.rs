use crate::constants::{
    DEFAULT_INSPECTOR, DEFAULT_NAMESPACE, DEFAULT_REGISTRY, DEFAULT_RUNTIME, REGISTRY_PLACEHOLDER,
};
use crate::error::RetryConfig;
use serde::{Deserialize, Serialize};

/// Registry and namespace every rendered image is published under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTarget {
    pub registry: String,
    pub namespace: String,
}

impl Default for ImageTarget {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY, DEFAULT_NAMESPACE)
    }
}

impl ImageTarget {
    pub fn new(registry: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            namespace: namespace.into(),
        }
    }

    /// `<registry>/<namespace>`, the value substituted for the placeholder token
    pub fn repository(&self) -> String {
        format!("{}/{}", self.registry, self.namespace)
    }

    /// Substitute the registry placeholder in arbitrary text.
    pub fn rename(&self, text: &str) -> String {
        text.replace(REGISTRY_PLACEHOLDER, &self.repository())
    }

    pub fn catalog_image(&self, catalog_name: &str) -> String {
        format!("{}:{}", self.repository(), catalog_name)
    }

    pub fn bundle_image(&self, bundle_dir_name: &str) -> String {
        format!("{}:{}", self.repository(), bundle_dir_name)
    }
}

/// Settings for talking to the container tooling
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub target: ImageTarget,
    pub runtime: String,
    pub inspector: String,
    pub retry: RetryConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target: ImageTarget::default(),
            runtime: DEFAULT_RUNTIME.to_string(),
            inspector: DEFAULT_INSPECTOR.to_string(),
            retry: RetryConfig::default(),
        }
    }
}
