use crate::constants::CATALOG_NAME_PREFIX;
use crate::error::{CatalogError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// `package -> [versions]` selected for one catalog
pub type Selection = IndexMap<String, Vec<String>>;

/// Named catalog definitions, in declaration order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct CatalogDefinitions {
    definitions: IndexMap<String, Selection>,
}

fn selection(entries: &[(&str, &[&str])]) -> Selection {
    entries
        .iter()
        .map(|(package, versions)| {
            (
                package.to_string(),
                versions.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

impl CatalogDefinitions {
    /// The stock test catalogs.
    pub fn builtin() -> Self {
        let latest: &[(&str, &[&str])] = &[
            ("foo", &["0.1.0", "0.2.0", "0.3.0", "0.3.1"]),
            ("bar", &["0.1.0", "0.2.0", "1.0.0"]),
            ("baz", &["1.0.0", "1.0.1", "1.1.0"]),
        ];
        let diff: &[(&str, &[&str])] = &[
            ("foo", &["0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.3.2"]),
            ("bar", &["0.1.0", "0.2.0", "1.0.0"]),
            ("baz", &["1.0.0", "1.0.1", "1.1.0"]),
        ];
        let prune: &[(&str, &[&str])] = &[("foo", &["0.1.0", "0.1.1"]), ("bar", &["0.1.0"])];
        let prune_diff: &[(&str, &[&str])] = &[("foo", &["0.2.0"]), ("bar", &["0.1.0"])];

        let definitions = [
            ("latest", latest),
            ("diff", diff),
            ("prune", prune),
            ("prune-diff", prune_diff),
        ]
        .into_iter()
        .map(|(name, entries)| (name.to_string(), selection(entries)))
        .collect();

        Self { definitions }
    }

    /// Load `catalog -> package -> [versions]` from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CatalogError::io(format!("reading {}", path.display()), e))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn get(&self, definition: &str) -> Option<&Selection> {
        self.definitions.get(definition)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}

/// Published name of the catalog built from `definition`
pub fn catalog_name(definition: &str) -> String {
    format!("{}{}", CATALOG_NAME_PREFIX, definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_diff_adds_one_foo_version() {
        let defs = CatalogDefinitions::builtin();
        let latest = defs.get("latest").unwrap();
        let diff = defs.get("diff").unwrap();
        assert_eq!(diff["foo"].len(), latest["foo"].len() + 1);
        assert_eq!(diff["foo"].last().map(String::as_str), Some("0.3.2"));
        assert_eq!(diff["bar"], latest["bar"]);
        assert_eq!(
            defs.names().collect::<Vec<_>>(),
            vec!["latest", "diff", "prune", "prune-diff"]
        );
    }

    #[test]
    fn test_yaml_definitions_keep_package_order() {
        let defs = CatalogDefinitions::from_yaml(
            "small:\n  zed: [\"1.0.0\"]\n  alpha: [\"0.1.0\", \"0.2.0\"]\n",
        )
        .unwrap();
        let small = defs.get("small").unwrap();
        assert_eq!(small.keys().collect::<Vec<_>>(), vec!["zed", "alpha"]);
        assert!(defs.get("latest").is_none());
    }

    #[test]
    fn test_catalog_name() {
        assert_eq!(catalog_name("prune-diff"), "test-catalog-prune-diff");
    }
}
