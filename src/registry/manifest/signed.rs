use serde::Deserialize;

use crate::registry::oci::{Descriptor, Digest};
use crate::registry::Error;

const LAYER_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Legacy signed image manifest, schema version 1. Kept for read
/// compatibility only: the registry recognizes and serves these but does
/// not accept new ones and never verifies signatures.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedManifest {
    pub schema_version: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub fs_layers: Vec<FsLayer>,
    #[serde(skip)]
    canonical: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: Digest,
}

impl SignedManifest {
    pub fn from_slice(content: &[u8]) -> Result<Self, Error> {
        let mut manifest: Self = serde_json::from_slice(content)?;
        if manifest.schema_version != 1 {
            return Err(Error::ManifestInvalid(format!(
                "unexpected schema version {} in signed manifest",
                manifest.schema_version
            )));
        }
        manifest.canonical = content.to_vec();
        Ok(manifest)
    }

    pub fn payload(&self) -> &[u8] {
        &self.canonical
    }

    pub fn references(&self) -> Vec<Descriptor> {
        self.fs_layers
            .iter()
            .map(|layer| Descriptor::from_digest(LAYER_MEDIA_TYPE, layer.blob_sum.clone(), 0))
            .collect()
    }
}
