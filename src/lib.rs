pub mod bundle;
pub mod cache;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod constants;
pub mod definitions;
pub mod document;
pub mod error;
pub mod logging;
pub mod package;
pub mod publisher;
pub mod reference;
pub mod render;
pub mod templates;

#[cfg(test)]
mod test_fixtures;

pub use bundle::BundleDescriptor;
pub use cache::DigestCache;
pub use catalog::{CatalogGraph, CatalogState, DocumentLayout, PublishContext};
pub use channel::ChannelGraph;
pub use config::{ImageTarget, PublishConfig};
pub use definitions::CatalogDefinitions;
pub use error::{CatalogError, Result};
pub use package::PackageMetadata;
pub use publisher::ImagePublisher;
