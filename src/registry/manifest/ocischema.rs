use serde::Deserialize;
use std::collections::HashMap;

use crate::registry::oci::Descriptor;
use crate::registry::Error;

/// OCI image manifest. Differs from the Docker schema2 manifest by the
/// optional `subject` and `artifactType` fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciManifest {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default)]
    pub subject: Option<Descriptor>,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(skip)]
    canonical: Vec<u8>,
}

impl OciManifest {
    pub fn from_slice(content: &[u8]) -> Result<Self, Error> {
        let mut manifest: Self = serde_json::from_slice(content)?;
        manifest.canonical = content.to_vec();
        Ok(manifest)
    }

    pub fn payload(&self) -> &[u8] {
        &self.canonical
    }

    /// Config, layers, then the subject if present.
    pub fn references(&self) -> Vec<Descriptor> {
        let mut references = Vec::with_capacity(2 + self.layers.len());
        references.push(self.config.clone());
        references.extend(self.layers.iter().cloned());
        if let Some(subject) = &self.subject {
            references.push(subject.clone());
        }
        references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::manifest::MEDIA_TYPE_OCI_MANIFEST;
    use crate::registry::oci::Digest;
    use serde_json::json;

    fn sample(subject: Option<&Digest>) -> Vec<u8> {
        let mut manifest = json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_OCI_MANIFEST,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": "sha256:1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
                "size": 7023
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": "sha256:abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890",
                "size": 32654
            }]
        });

        if let Some(subject) = subject {
            manifest["subject"] = json!({
                "mediaType": MEDIA_TYPE_OCI_MANIFEST,
                "digest": subject.to_string(),
                "size": 123
            });
        }

        serde_json::to_vec(&manifest).unwrap()
    }

    #[test]
    fn test_references_without_subject() {
        let manifest = OciManifest::from_slice(&sample(None)).unwrap();
        assert_eq!(manifest.references().len(), 2);
        assert!(manifest.subject.is_none());
    }

    #[test]
    fn test_references_include_subject() {
        let subject = Digest::from_bytes(b"subject");
        let manifest = OciManifest::from_slice(&sample(Some(&subject))).unwrap();

        let references = manifest.references();
        assert_eq!(references.len(), 3);
        assert_eq!(references[2].digest, subject);
    }
}
