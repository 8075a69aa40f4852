use serde::Deserialize;
use std::collections::HashMap;

use crate::registry::manifest::MEDIA_TYPE_ORAS_ARTIFACT;
use crate::registry::oci::Descriptor;
use crate::registry::Error;

/// ORAS artifact manifest. The subject is mandatory here, unlike in the
/// OCI artifact schema, and the media type must be the ORAS one when
/// present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub artifact_type: String,
    #[serde(default)]
    pub blobs: Vec<Descriptor>,
    pub subject: Descriptor,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(skip)]
    canonical: Vec<u8>,
}

impl ArtifactManifest {
    pub fn from_slice(content: &[u8]) -> Result<Self, Error> {
        let mut manifest: Self = serde_json::from_slice(content)
            .map_err(|e| Error::ManifestInvalid(format!("undecodable ORAS artifact: {e}")))?;

        if let Some(media_type) = &manifest.media_type {
            if media_type != MEDIA_TYPE_ORAS_ARTIFACT {
                return Err(Error::ManifestInvalid(format!(
                    "if present, mediaType in ORAS artifact manifest should be '{MEDIA_TYPE_ORAS_ARTIFACT}' not '{media_type}'"
                )));
            }
        }

        manifest.canonical = content.to_vec();
        Ok(manifest)
    }

    pub fn payload(&self) -> &[u8] {
        &self.canonical
    }

    pub fn references(&self) -> Vec<Descriptor> {
        self.blobs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::manifest::tests::sample_oras_artifact;
    use crate::registry::oci::Digest;
    use serde_json::json;

    #[test]
    fn test_from_slice() {
        let subject = Digest::from_bytes(b"subject manifest");
        let content = sample_oras_artifact(&subject);

        let manifest = ArtifactManifest::from_slice(&content).unwrap();
        assert_eq!(manifest.artifact_type, "application/vnd.example.sbom.v1");
        assert_eq!(manifest.subject.digest, subject);
        assert_eq!(manifest.references().len(), 1);
        assert_eq!(
            manifest.annotations.get("io.cncf.oras.artifact.created"),
            Some(&"2022-01-01T10:00:00Z".to_string())
        );
    }

    #[test]
    fn test_wrong_media_type_is_rejected() {
        let content = serde_json::to_vec(&json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "artifactType": "application/vnd.example",
            "blobs": [],
            "subject": {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
                "size": 2
            }
        }))
        .unwrap();

        assert!(matches!(
            ArtifactManifest::from_slice(&content),
            Err(Error::ManifestInvalid(_))
        ));
    }

    #[test]
    fn test_missing_subject_is_rejected() {
        let content = serde_json::to_vec(&json!({
            "mediaType": MEDIA_TYPE_ORAS_ARTIFACT,
            "artifactType": "application/vnd.example",
            "blobs": []
        }))
        .unwrap();

        assert!(ArtifactManifest::from_slice(&content).is_err());
    }
}
