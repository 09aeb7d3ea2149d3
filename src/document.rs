//! File-based catalog documents.
//!
//! A catalog index is a YAML stream of documents discriminated by `schema`:
//! `olm.package`, `olm.channel` and `olm.bundle`.

use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum CatalogDocument {
    #[serde(rename = "olm.package")]
    Package(PackageDocument),
    #[serde(rename = "olm.channel")]
    Channel(ChannelDocument),
    #[serde(rename = "olm.bundle")]
    Bundle(BundleDocument),
}

impl CatalogDocument {
    pub fn name(&self) -> &str {
        match self {
            Self::Package(p) => &p.name,
            Self::Channel(c) => &c.name,
            Self::Bundle(b) => &b.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDocument {
    pub name: String,
    pub description: String,
    pub icon: Icon,
    pub default_channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub base64data: String,
    pub mediatype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDocument {
    pub package: String,
    pub name: String,
    pub entries: Vec<ChannelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDocument {
    pub package: String,
    pub name: String,
    pub image: String,
    pub csv_json: String,
    pub properties: Vec<Property>,
    pub related_images: Vec<RelatedImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedImage {
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub kind: String,
    pub version: String,
}

/// Typed bundle property, serialized as `{type, value}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Property {
    #[serde(rename = "olm.gvk")]
    Gvk(GroupVersionKind),
    #[serde(rename = "olm.package")]
    Package(PackageProperty),
    #[serde(rename = "olm.package.required")]
    PackageRequired(PackageRequirement),
    #[serde(rename = "olm.gvk.required")]
    GvkRequired(GroupVersionKind),
    #[serde(rename = "olm.bundle.object")]
    BundleObject(BundleObject),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageProperty {
    pub package_name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequirement {
    pub package_name: String,
    pub version_range: String,
}

/// Base64 of a manifest's serialized JSON bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleObject {
    pub data: String,
}

/// Render documents as a YAML stream, each one opened with `---`.
pub fn to_yaml_stream(documents: &[CatalogDocument]) -> Result<String> {
    let mut out = String::new();
    for document in documents {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(document)?);
    }
    Ok(out)
}

/// Parse every document of a YAML stream.
pub fn from_yaml_stream(stream: &str) -> Result<Vec<CatalogDocument>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(stream) {
        documents.push(CatalogDocument::deserialize(document)?);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> CatalogDocument {
        CatalogDocument::Channel(ChannelDocument {
            package: "foo".to_string(),
            name: "stable".to_string(),
            entries: vec![
                ChannelEntry {
                    name: "foo.v0.1.0".to_string(),
                    skip_range: None,
                    skips: vec![],
                    replaces: None,
                },
                ChannelEntry {
                    name: "foo.v0.2.0".to_string(),
                    skip_range: Some(">=0.1.0 <0.2.0".to_string()),
                    skips: vec!["foo.v0.1.1".to_string()],
                    replaces: Some("foo.v0.1.0".to_string()),
                },
            ],
        })
    }

    #[test]
    fn test_schema_discriminator_leads_document() {
        let yaml = to_yaml_stream(&[channel()]).unwrap();
        assert!(yaml.starts_with("---\nschema: olm.channel\n"));
        assert!(!yaml.contains("skips: []"));
        assert!(yaml.contains("replaces: foo.v0.1.0"));
    }

    #[test]
    fn test_property_shape() {
        let property = Property::PackageRequired(PackageRequirement {
            package_name: "bar".to_string(),
            version_range: ">=0.1.0".to_string(),
        });
        let json = serde_json::to_value(&property).unwrap();
        assert_eq!(json["type"], "olm.package.required");
        assert_eq!(json["value"]["packageName"], "bar");
        assert_eq!(json["value"]["versionRange"], ">=0.1.0");
    }

    #[test]
    fn test_stream_reads_back_all_documents() {
        let package = CatalogDocument::Package(PackageDocument {
            name: "foo".to_string(),
            description: "# foo\n".to_string(),
            icon: Icon {
                base64data: "PHN2Zy8+".to_string(),
                mediatype: "image/svg+xml".to_string(),
            },
            default_channel: Some("stable".to_string()),
        });
        let documents = vec![package, channel()];
        let parsed = from_yaml_stream(&to_yaml_stream(&documents).unwrap()).unwrap();
        assert_eq!(parsed, documents);
    }
}
