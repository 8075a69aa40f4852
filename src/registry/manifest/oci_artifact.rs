use serde::Deserialize;
use std::collections::HashMap;

use crate::registry::oci::Descriptor;
use crate::registry::Error;

/// OCI artifact manifest: `artifactType` plus content blobs and an
/// optional subject. No config, no layers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    #[serde(default)]
    pub media_type: Option<String>,
    pub artifact_type: String,
    #[serde(default)]
    pub blobs: Vec<Descriptor>,
    #[serde(default)]
    pub subject: Option<Descriptor>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(skip)]
    canonical: Vec<u8>,
}

impl ArtifactManifest {
    pub fn from_slice(content: &[u8]) -> Result<Self, Error> {
        let mut manifest: Self = serde_json::from_slice(content)?;
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
