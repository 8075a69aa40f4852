use chrono::DateTime;

use crate::registry::manifest::{
    Manifest, CREATED_ANNOTATION, MEDIA_TYPE_OCI_ARTIFACT, MEDIA_TYPE_ORAS_ARTIFACT,
};
use crate::registry::manifest_store::ManifestStore;
use crate::registry::oci::Descriptor;
use crate::registry::{Error, VerificationError};

/// Verifies an OCI or ORAS artifact manifest. The registry only stores
/// valid content; trust policies over that content are the consumer's
/// concern.
pub async fn verify_manifest(
    store: &ManifestStore,
    manifest: &Manifest,
    skip_dependency_verification: bool,
) -> Result<(), Error> {
    let mut errors = Vec::new();

    let (media_type, expected_media_type, subject, blobs, annotations) = match manifest {
        Manifest::OciArtifact(m) => (
            m.media_type.as_deref(),
            MEDIA_TYPE_OCI_ARTIFACT,
            m.subject.as_ref(),
            &m.blobs,
            &m.annotations,
        ),
        Manifest::OrasArtifact(m) => {
            if m.artifact_type.is_empty() {
                errors.push(VerificationError::InvalidArtifactType(
                    "artifactType must not be empty".to_string(),
                ));
            }
            (
                m.media_type.as_deref(),
                MEDIA_TYPE_ORAS_ARTIFACT,
                Some(&m.subject),
                &m.blobs,
                &m.annotations,
            )
        }
        _ => {
            return Err(Error::Unsupported(format!(
                "non-artifact manifest put to artifact handler: {}",
                manifest.media_type()
            )))
        }
    };

    if media_type != Some(expected_media_type) {
        errors.push(VerificationError::InvalidMediaType(format!(
            "expected {expected_media_type}, got {}",
            media_type.unwrap_or("<none>")
        )));
    }

    if let Some(created) = annotations.get(CREATED_ANNOTATION) {
        if DateTime::parse_from_rfc3339(created).is_err() {
            errors.push(VerificationError::InvalidCreatedAnnotation(created.clone()));
        }
    }

    if !skip_dependency_verification {
        if let Some(subject) = subject {
            verify_subject(store, subject, &mut errors).await?;
        }

        for descriptor in blobs {
            match store.blobs().stat(&descriptor.digest).await {
                Ok(_) => {}
                Err(Error::BlobUnknown(digest)) => {
                    errors.push(VerificationError::ManifestBlobUnknown(digest));
                }
                Err(e) => return Err(e),
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::ManifestVerification(errors))
    }
}

/// The subject must exist as a manifest in the same repository; a subject
/// living elsewhere is permitted by the data model but cannot be verified
/// or indexed here.
async fn verify_subject(
    store: &ManifestStore,
    subject: &Descriptor,
    errors: &mut Vec<VerificationError>,
) -> Result<(), Error> {
    match store.exists(&subject.digest).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            errors.push(VerificationError::ManifestBlobUnknown(
                subject.digest.clone(),
            ));
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::manifest;
    use crate::registry::manifest_store::tests::{
        oras_artifact_content, put_image, seed_blob, test_store,
    };
    use crate::registry::oci::Digest;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_blob_aggregates() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let (subject, _) = put_image(&store, b"config", b"layer").await;
        let missing = Descriptor::from_digest(
            "application/octet-stream",
            Digest::from_bytes(b"deadbeef, never uploaded"),
            9,
        );

        let content =
            oras_artifact_content(&subject, &missing, "application/vnd.example.sbom", None);
        let parsed = manifest::from_slice(&content).unwrap();

        match store.put(&parsed).await.unwrap_err() {
            Error::ManifestVerification(errors) => {
                assert_eq!(
                    errors,
                    vec![VerificationError::ManifestBlobUnknown(missing.digest)]
                );
            }
            other => panic!("expected verification aggregate, got {other:?}"),
        }

        // No referrer link may exist after a failed PUT.
        let referrers =
            crate::registry::referrers::referrer_digests(&store.driver, "test-repo", &subject)
                .await
                .unwrap();
        assert!(referrers.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_created_annotation() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let (subject, _) = put_image(&store, b"config", b"layer").await;
        let blob = seed_blob(&store, b"payload").await;

        let content = oras_artifact_content(
            &subject,
            &blob,
            "application/vnd.example.sbom",
            Some("not-a-timestamp"),
        );
        let parsed = manifest::from_slice(&content).unwrap();

        match store.put(&parsed).await.unwrap_err() {
            Error::ManifestVerification(errors) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, VerificationError::InvalidCreatedAnnotation(_))));
            }
            other => panic!("expected verification aggregate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_artifact_type_rejected() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let (subject, _) = put_image(&store, b"config", b"layer").await;
        let blob = seed_blob(&store, b"payload").await;
        let content = oras_artifact_content(&subject, &blob, "", None);

        let parsed = manifest::from_slice(&content).unwrap();
        match store.put(&parsed).await.unwrap_err() {
            Error::ManifestVerification(errors) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, VerificationError::InvalidArtifactType(_))));
            }
            other => panic!("expected verification aggregate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oci_artifact_without_subject() {
        let tmp_dir = TempDir::new().unwrap();
        let store = test_store(&tmp_dir);

        let blob = seed_blob(&store, b"scan results").await;
        let content = serde_json::to_vec(&json!({
            "mediaType": MEDIA_TYPE_OCI_ARTIFACT,
            "artifactType": "application/vnd.example.scan",
            "blobs": [{
                "mediaType": blob.media_type,
                "digest": blob.digest.to_string(),
                "size": blob.size
            }]
        }))
        .unwrap();

        let parsed = manifest::from_slice(&content).unwrap();
        assert!(matches!(parsed, Manifest::OciArtifact(_)));
        let digest = store.put(&parsed).await.unwrap();
        assert!(store.exists(&digest).await.unwrap());
    }
}
