use tracing::debug;

use crate::registry::manifest::{
    Manifest, MEDIA_TYPE_MANIFEST_LIST, MEDIA_TYPE_OCI_ARTIFACT, MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_OCI_MANIFEST, MEDIA_TYPE_ORAS_ARTIFACT, MEDIA_TYPE_SCHEMA2_MANIFEST,
};
use crate::registry::manifest_store::{ManifestStore, ManifestUrls};
use crate::registry::oci::Descriptor;
use crate::registry::{Error, VerificationError};

const LAYER_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.layer.v1.tar",
    "application/vnd.oci.image.layer.v1.tar+gzip",
    "application/vnd.oci.image.layer.nondistributable.v1.tar",
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip",
    "application/vnd.docker.image.rootfs.diff.tar.gzip",
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip",
];

const DISTRIBUTABLE_LAYER_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.layer.v1.tar",
    "application/vnd.oci.image.layer.v1.tar+gzip",
    "application/vnd.docker.image.rootfs.diff.tar.gzip",
];

const MANIFEST_MEDIA_TYPES: &[&str] = &[
    MEDIA_TYPE_SCHEMA2_MANIFEST,
    MEDIA_TYPE_MANIFEST_LIST,
    MEDIA_TYPE_OCI_MANIFEST,
    MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_OCI_ARTIFACT,
    MEDIA_TYPE_ORAS_ARTIFACT,
];

/// Verifies a Docker schema2 or OCI image manifest: schema version,
/// layer/config presence, URL policy for foreign layers, and resolution
/// of manifest-typed references through the manifest service.
pub async fn verify_manifest(
    store: &ManifestStore,
    manifest: &Manifest,
    manifest_urls: &ManifestUrls,
    skip_dependency_verification: bool,
) -> Result<(), Error> {
    let schema_version = match manifest {
        Manifest::ImageV2(m) => m.schema_version,
        Manifest::OciImage(m) => m.schema_version,
        _ => {
            return Err(Error::Unsupported(format!(
                "non-image manifest put to image handler: {}",
                manifest.media_type()
            )))
        }
    };

    if schema_version != 2 {
        return Err(Error::ManifestVerification(vec![
            VerificationError::SchemaVersionInvalid(schema_version),
        ]));
    }

    if skip_dependency_verification {
        return Ok(());
    }

    let mut errors = Vec::new();

    for descriptor in manifest.references() {
        verify_reference(store, manifest_urls, &descriptor, &mut errors).await?;
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::ManifestVerification(errors))
    }
}

async fn verify_reference(
    store: &ManifestStore,
    manifest_urls: &ManifestUrls,
    descriptor: &Descriptor,
    errors: &mut Vec<VerificationError>,
) -> Result<(), Error> {
    let media_type = descriptor.media_type.as_str();

    if LAYER_MEDIA_TYPES.contains(&media_type) {
        for url in &descriptor.urls {
            if !url_allowed(manifest_urls, url) {
                errors.push(VerificationError::InvalidUrl(url.clone()));
                errors.push(VerificationError::ManifestBlobUnknown(
                    descriptor.digest.clone(),
                ));
                return Ok(());
            }
        }

        // Distributable layers must be present; non-distributable ones
        // may live solely behind their URLs.
        if descriptor.urls.is_empty() || DISTRIBUTABLE_LAYER_MEDIA_TYPES.contains(&media_type) {
            stat_blob(store, descriptor, errors).await?;
        }
        return Ok(());
    }

    if MANIFEST_MEDIA_TYPES.contains(&media_type) {
        match store.exists(&descriptor.digest).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    "Manifest reference {} does not resolve in the manifest service",
                    descriptor.digest
                );
                errors.push(VerificationError::ManifestBlobUnknown(
                    descriptor.digest.clone(),
                ));
            }
            Err(e) => return Err(e),
        }
        return Ok(());
    }

    stat_blob(store, descriptor, errors).await
}

async fn stat_blob(
    store: &ManifestStore,
    descriptor: &Descriptor,
    errors: &mut Vec<VerificationError>,
) -> Result<(), Error> {
    match store.blobs().stat(&descriptor.digest).await {
        Ok(_) => Ok(()),
        Err(Error::BlobUnknown(digest)) => {
            errors.push(VerificationError::ManifestBlobUnknown(digest));
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn url_allowed(manifest_urls: &ManifestUrls, url: &str) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) || url.contains('#') {
        return false;
    }

    if let Some(allow) = &manifest_urls.allow {
        if !allow.is_match(url) {
            return false;
        }
    }

    if let Some(deny) = &manifest_urls.deny {
        if deny.is_match(url) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::manifest::{self, MEDIA_TYPE_SCHEMA2_MANIFEST};
    use crate::registry::manifest_store::tests::{seed_blob, test_store};
    use crate::registry::oci::Digest;
    use regex::Regex;
    use serde_json::json;
    use tempfile::TempDir;

    fn foreign_layer_manifest(config_digest: &Digest, layer_digest: &Digest, url: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_SCHEMA2_MANIFEST,
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "digest": config_digest.to_string(),
                "size": 6
            },
            "layers": [{
                "mediaType": "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip",
                "digest": layer_digest.to_string(),
                "size": 5678,
                "urls": [url]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_url_policy() {
        let no_policy = ManifestUrls::default();
        assert!(url_allowed(&no_policy, "https://example.com/layer"));
        assert!(url_allowed(&no_policy, "http://example.com/layer"));
        assert!(!url_allowed(&no_policy, "ftp://example.com/layer"));
        assert!(!url_allowed(&no_policy, "https://example.com/layer#frag"));

        let restricted = ManifestUrls {
            allow: Some(Regex::new(r"^https://allowed\.example\.com/").unwrap()),
            deny: Some(Regex::new(r"secret").unwrap()),
        };
        assert!(url_allowed(&restricted, "https://allowed.example.com/x"));
        assert!(!url_allowed(&restricted, "https://other.example.com/x"));
        assert!(!url_allowed(
            &restricted,
            "https://allowed.example.com/secret"
        ));
    }

    #[tokio::test]
    async fn test_foreign_layer_with_bad_url_rejected() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let config = seed_blob(&store, b"config").await;
        let layer = Digest::from_bytes(b"foreign layer");

        let content =
            foreign_layer_manifest(&config.digest, &layer, "ftp://mirror.example.com/layer");
        let manifest = manifest::from_slice(&content).unwrap();

        match store.put(&manifest).await.unwrap_err() {
            Error::ManifestVerification(errors) => {
                assert!(errors.iter().any(|e| matches!(
                    e,
                    VerificationError::InvalidUrl(_)
                )));
            }
            other => panic!("expected verification aggregate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_foreign_layer_with_url_needs_no_blob() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let config = seed_blob(&store, b"config").await;
        let layer = Digest::from_bytes(b"foreign layer, never uploaded");

        let content =
            foreign_layer_manifest(&config.digest, &layer, "https://mirror.example.com/layer");
        let manifest = manifest::from_slice(&content).unwrap();

        assert!(store.put(&manifest).await.is_ok());
    }
}
