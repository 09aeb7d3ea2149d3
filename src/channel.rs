use crate::bundle::BundleDescriptor;
use crate::document::{ChannelDocument, ChannelEntry};
use crate::error::{CatalogError, Result};
use std::sync::Arc;

/// An upgrade channel: its member bundles in version order.
#[derive(Debug, Clone)]
pub struct ChannelGraph {
    name: String,
    members: Vec<Arc<BundleDescriptor>>,
}

impl ChannelGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Arc<BundleDescriptor>] {
        &self.members
    }

    pub fn contains(&self, bundle_name: &str) -> bool {
        self.members.iter().any(|b| b.name() == bundle_name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Insert unless a member with the same name exists, then keep version order.
    /// Returns whether the bundle was added.
    pub fn add_bundle(&mut self, bundle: Arc<BundleDescriptor>) -> Result<bool> {
        if self.contains(bundle.name()) {
            return Ok(false);
        }
        if let Some(first) = self.members.first() {
            // rejects a foreign package before sort_by can hit it
            first.try_cmp(&bundle)?;
        }

        tracing::debug!(bundle = %bundle.name(), channel = %self.name, "Adding bundle to channel");
        self.members.push(bundle);
        self.members.sort_by(|a, b| a.version().cmp(b.version()));
        Ok(true)
    }

    /// Package of the members; `None` for an empty channel
    pub fn package(&self) -> Option<&str> {
        self.members.first().map(|b| b.package())
    }

    /// The `olm.channel` document for the current membership.
    pub fn index_entry(&self) -> Result<ChannelDocument> {
        let package = self
            .package()
            .ok_or_else(|| {
                CatalogError::Other(anyhow::anyhow!("channel {} has no bundles", self.name))
            })?
            .to_string();

        let mut entries = Vec::with_capacity(self.members.len());
        for bundle in &self.members {
            bundle.check_replaces()?;
            let replaces = match bundle.replaces() {
                Some(target) if self.contains(target) => Some(target.to_string()),
                Some(target) => {
                    tracing::warn!(
                        bundle = %bundle.name(),
                        replaces = %target,
                        channel = %self.name,
                        "Dropping replaces edge to a bundle of this package outside the channel"
                    );
                    None
                }
                None => None,
            };
            entries.push(ChannelEntry {
                name: bundle.name().to_string(),
                skip_range: bundle.skip_range().map(String::from),
                skips: bundle.skips().to_vec(),
                replaces,
            });
        }

        Ok(ChannelDocument {
            package,
            name: self.name.clone(),
            entries,
        })
    }
}

/// Channels are the same channel when their names match.
impl PartialEq for ChannelGraph {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ChannelGraph {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{create_temp_dir, BundleFixture};

    fn load(fixture: BundleFixture, root: &std::path::Path) -> Arc<BundleDescriptor> {
        Arc::new(BundleDescriptor::load(&fixture.write(root)).unwrap())
    }

    #[test]
    fn test_members_stay_in_version_order() {
        let root = create_temp_dir();
        let mut channel = ChannelGraph::new("stable");
        for version in ["0.3.0", "0.1.0", "0.2.0"] {
            assert!(channel
                .add_bundle(load(BundleFixture::new("foo", version), root.path()))
                .unwrap());
        }

        let names: Vec<_> = channel.members().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["foo.v0.1.0", "foo.v0.2.0", "foo.v0.3.0"]);
        assert_eq!(channel.package(), Some("foo"));
    }

    #[test]
    fn test_adding_same_bundle_twice_is_noop() {
        let root = create_temp_dir();
        let bundle = load(BundleFixture::new("foo", "0.1.0"), root.path());
        let mut channel = ChannelGraph::new("stable");

        assert!(channel.add_bundle(bundle.clone()).unwrap());
        assert!(!channel.add_bundle(bundle).unwrap());
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn test_foreign_package_is_rejected() {
        let root = create_temp_dir();
        let mut channel = ChannelGraph::new("stable");
        channel
            .add_bundle(load(BundleFixture::new("foo", "0.1.0"), root.path()))
            .unwrap();

        let err = channel
            .add_bundle(load(BundleFixture::new("bar", "0.1.0"), root.path()))
            .unwrap_err();
        assert!(matches!(err, CatalogError::IncomparableVersions { .. }));
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn test_replaces_outside_channel_is_dropped() {
        let root = create_temp_dir();
        let mut channel = ChannelGraph::new("stable");
        channel
            .add_bundle(load(
                BundleFixture::new("foo", "0.2.0").replaces("foo.v0.1.0"),
                root.path(),
            ))
            .unwrap();
        channel
            .add_bundle(load(
                BundleFixture::new("foo", "0.3.0").replaces("foo.v0.2.0"),
                root.path(),
            ))
            .unwrap();

        let doc = channel.index_entry().unwrap();
        assert_eq!(doc.package, "foo");
        assert_eq!(doc.entries[0].name, "foo.v0.2.0");
        assert_eq!(doc.entries[0].replaces, None);
        assert_eq!(doc.entries[1].replaces.as_deref(), Some("foo.v0.2.0"));
    }

    #[test]
    fn test_self_replaces_is_invalid() {
        let root = create_temp_dir();
        let mut channel = ChannelGraph::new("stable");
        channel
            .add_bundle(load(
                BundleFixture::new("foo", "0.1.0").replaces("foo.v0.1.0"),
                root.path(),
            ))
            .unwrap();

        assert!(matches!(
            channel.index_entry(),
            Err(CatalogError::InvalidReplaces { .. })
        ));
    }

    #[test]
    fn test_replaces_into_another_package_is_invalid() {
        let root = create_temp_dir();
        let mut channel = ChannelGraph::new("stable");
        channel
            .add_bundle(load(
                BundleFixture::new("foo", "0.2.0").replaces("bar.v0.1.0"),
                root.path(),
            ))
            .unwrap();

        match channel.index_entry() {
            Err(CatalogError::InvalidReplaces {
                bundle, replaces, ..
            }) => {
                assert_eq!(bundle, "foo.v0.2.0");
                assert_eq!(replaces, "bar.v0.1.0");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_empty_channel_has_no_document() {
        let channel = ChannelGraph::new("stable");
        assert!(channel.is_empty());
        assert!(channel.index_entry().is_err());
    }
}
