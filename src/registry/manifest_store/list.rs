use crate::registry::manifest::index::ImageIndex;
use crate::registry::manifest_store::ManifestStore;
use crate::registry::{Error, VerificationError};

/// Verifies a manifest list / image index: every child manifest
/// descriptor must resolve through the manifest service.
pub async fn verify_manifest(
    store: &ManifestStore,
    manifest: &ImageIndex,
    skip_dependency_verification: bool,
) -> Result<(), Error> {
    if manifest.schema_version != 2 {
        return Err(Error::ManifestVerification(vec![
            VerificationError::SchemaVersionInvalid(manifest.schema_version),
        ]));
    }

    if skip_dependency_verification {
        return Ok(());
    }

    let mut errors = Vec::new();

    for descriptor in manifest.references() {
        match store.exists(&descriptor.digest).await {
            Ok(true) => {}
            Ok(false) => {
                errors.push(VerificationError::ManifestBlobUnknown(descriptor.digest));
            }
            Err(e) => return Err(e),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::ManifestVerification(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::manifest::{self, Manifest, MEDIA_TYPE_OCI_INDEX};
    use crate::registry::manifest_store::tests::{put_image, test_store};
    use crate::registry::oci::Digest;
    use serde_json::json;
    use tempfile::TempDir;

    fn index_content(children: &[&Digest]) -> Vec<u8> {
        let manifests: Vec<serde_json::Value> = children
            .iter()
            .map(|digest| {
                json!({
                    "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                    "digest": digest.to_string(),
                    "size": 123,
                    "platform": { "architecture": "amd64", "os": "linux" }
                })
            })
            .collect();

        serde_json::to_vec(&json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_OCI_INDEX,
            "manifests": manifests
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_index_with_existing_children() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let (child, _) = put_image(&store, b"config", b"layer").await;
        let content = index_content(&[&child]);
        let parsed = manifest::from_slice(&content).unwrap();
        assert!(matches!(parsed, Manifest::Index(_)));

        let digest = store.put(&parsed).await.unwrap();
        assert!(store.exists(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_index_with_missing_child_rejected() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let missing = Digest::from_bytes(b"missing child");
        let content = index_content(&[&missing]);
        let parsed = manifest::from_slice(&content).unwrap();

        match store.put(&parsed).await.unwrap_err() {
            Error::ManifestVerification(errors) => {
                assert_eq!(
                    errors,
                    vec![VerificationError::ManifestBlobUnknown(missing)]
                );
            }
            other => panic!("expected verification aggregate, got {other:?}"),
        }
    }
}
