//! Text of the files written next to a rendered catalog index.

/// Base image serving the file-based catalog
pub const OPM_IMAGE: &str = "quay.io/operator-framework/opm:latest";

/// Dockerfile for the catalog image; `catalog_name` is the index directory
/// inside the build context.
pub fn catalog_dockerfile(catalog_name: &str) -> String {
    format!(
        r#"FROM {opm}

ENTRYPOINT ["/bin/opm"]
CMD ["serve", "/configs"]

ADD {name} /configs

LABEL operators.operatorframework.io.index.configs.v1=/configs
"#,
        opm = OPM_IMAGE,
        name = catalog_name,
    )
}

/// CatalogSource pointing a cluster at the published catalog image.
pub fn catalog_source(catalog_name: &str, image: &str) -> String {
    format!(
        r#"---
apiVersion: operators.coreos.com/v1alpha1
kind: CatalogSource
metadata:
  name: {name}
  namespace: openshift-marketplace
spec:
  displayName: {name}
  image: {image}
  publisher: {name}
  sourceType: grpc
"#,
        name = catalog_name,
        image = image,
    )
}
