use serde::Deserialize;

use crate::registry::oci::Descriptor;
use crate::registry::Error;

/// Docker image manifest, schema version 2.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(skip)]
    canonical: Vec<u8>,
}

impl ImageManifest {
    pub fn from_slice(content: &[u8]) -> Result<Self, Error> {
        let mut manifest: Self = serde_json::from_slice(content)?;
        manifest.canonical = content.to_vec();
        Ok(manifest)
    }

    pub fn payload(&self) -> &[u8] {
        &self.canonical
    }

    /// Config first, then layers in manifest order.
    pub fn references(&self) -> Vec<Descriptor> {
        let mut references = Vec::with_capacity(1 + self.layers.len());
        references.push(self.config.clone());
        references.extend(self.layers.iter().cloned());
        references
    }
}
