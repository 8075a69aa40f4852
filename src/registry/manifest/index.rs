use serde::Deserialize;
use std::collections::HashMap;

use crate::registry::manifest::{MEDIA_TYPE_MANIFEST_LIST, MEDIA_TYPE_OCI_INDEX};
use crate::registry::oci::Descriptor;
use crate::registry::Error;

/// Docker manifest list / OCI image index: an ordered list of
/// platform-specific manifest descriptors.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: Option<String>,
    // Option rather than default: the media-type-less dispatch fallback
    // distinguishes an index from an image by the field being present.
    pub manifests: Option<Vec<Descriptor>>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(skip)]
    canonical: Vec<u8>,
}

impl ImageIndex {
    pub fn from_slice(content: &[u8]) -> Result<Self, Error> {
        let mut manifest: Self = serde_json::from_slice(content)?;
        manifest.canonical = content.to_vec();
        Ok(manifest)
    }

    pub fn has_manifests(&self) -> bool {
        self.manifests.is_some()
    }

    pub fn media_type(&self) -> &str {
        match self.media_type.as_deref() {
            Some(MEDIA_TYPE_MANIFEST_LIST) => MEDIA_TYPE_MANIFEST_LIST,
            _ => MEDIA_TYPE_OCI_INDEX,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.canonical
    }

    pub fn references(&self) -> Vec<Descriptor> {
        self.manifests.clone().unwrap_or_default()
    }
}
