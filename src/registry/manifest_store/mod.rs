mod artifact;
mod image;
mod list;

use regex::Regex;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::registry::blob_store::{LinkKind, LinkedBlobStore};
use crate::registry::driver::StorageDriver;
use crate::registry::extension::ExtensionManifestHandler;
use crate::registry::manifest::{self, Manifest};
use crate::registry::oci::Digest;
use crate::registry::{referrers, Error};

/// Allow/deny policy for URLs carried by foreign and non-distributable
/// layers.
#[derive(Clone, Debug, Default)]
pub struct ManifestUrls {
    pub allow: Option<Regex>,
    pub deny: Option<Regex>,
}

/// Options accepted by [`ManifestStore::apply_option`]. Applying an option
/// the concrete store does not understand is a hard error, never a silent
/// no-op.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ManifestStoreOption {
    /// Allows a manifest to be put before its dependencies are on the
    /// filesystem.
    SkipDependencyVerification,
}

/// Stores and retrieves manifests of every supported schema, routing each
/// to its handler for verification, canonical-byte storage and referrer
/// indexing.
#[derive(Clone)]
pub struct ManifestStore {
    driver: Arc<dyn StorageDriver>,
    repository: String,
    revisions: LinkedBlobStore,
    blobs: LinkedBlobStore,
    manifest_urls: ManifestUrls,
    extension_handlers: Vec<Arc<dyn ExtensionManifestHandler>>,
    skip_dependency_verification: bool,
}

impl ManifestStore {
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        repository: &str,
        manifest_urls: ManifestUrls,
        extension_handlers: Vec<Arc<dyn ExtensionManifestHandler>>,
    ) -> Self {
        Self {
            revisions: LinkedBlobStore::new(
                driver.clone(),
                repository,
                vec![LinkKind::ManifestRevision],
            ),
            blobs: LinkedBlobStore::new(driver.clone(), repository, vec![LinkKind::Layer]),
            driver,
            repository: repository.to_string(),
            manifest_urls,
            extension_handlers,
            skip_dependency_verification: false,
        }
    }

    pub fn apply_option(&mut self, option: ManifestStoreOption) -> Result<(), Error> {
        match option {
            ManifestStoreOption::SkipDependencyVerification => {
                self.skip_dependency_verification = true;
                Ok(())
            }
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub(crate) fn blobs(&self) -> &LinkedBlobStore {
        &self.blobs
    }

    pub async fn exists(&self, digest: &Digest) -> Result<bool, Error> {
        match self.revisions.stat(digest).await {
            Ok(_) => Ok(true),
            Err(Error::BlobUnknown(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, digest: &Digest) -> Result<Manifest, Error> {
        let content = match self.revisions.get(digest).await {
            Ok(content) => content,
            Err(Error::BlobUnknown(_)) => {
                return Err(Error::ManifestUnknownRevision(digest.clone()))
            }
            Err(e) => return Err(e),
        };

        manifest::from_slice(&content)
    }

    /// Verifies the manifest, stores its canonical bytes as a
    /// content-addressed blob linked into this repository, indexes its
    /// subject in the referrers index, and returns the revision digest.
    ///
    /// The payload is persisted before the referrer link; a failure in
    /// between leaves an unlinked manifest for GC to reclaim rather than
    /// a dangling link.
    #[instrument(skip(self, manifest))]
    pub async fn put(&self, manifest: &Manifest) -> Result<Digest, Error> {
        let skip = self.skip_dependency_verification;

        match manifest {
            Manifest::SignedV1(_) => Err(Error::Unsupported(
                "pushing schema 1 signed manifests is no longer supported".to_string(),
            )),
            Manifest::ImageV2(_) | Manifest::OciImage(_) => {
                image::verify_manifest(self, manifest, &self.manifest_urls, skip).await?;
                self.store_and_index(manifest).await
            }
            Manifest::Index(m) => {
                list::verify_manifest(self, m, skip).await?;
                self.store_and_index(manifest).await
            }
            Manifest::OciArtifact(_) | Manifest::OrasArtifact(_) => {
                artifact::verify_manifest(self, manifest, skip).await?;
                self.store_and_index(manifest).await
            }
            Manifest::Extension(_) => {
                for handler in &self.extension_handlers {
                    if handler.handles(manifest) {
                        return handler.put(self, manifest, skip).await;
                    }
                }
                Err(Error::Unsupported(format!(
                    "unrecognized manifest type: {}",
                    manifest.media_type()
                )))
            }
        }
    }

    pub(crate) async fn store_and_index(&self, manifest: &Manifest) -> Result<Digest, Error> {
        let (media_type, payload) = manifest.payload();

        let descriptor = self.revisions.put(media_type, payload).await.map_err(|e| {
            error!("Error putting manifest payload into blob store: {e}");
            e
        })?;
        let revision = descriptor.digest;

        if let Some(subject) = manifest.subject() {
            referrers::link_referrer(&self.driver, &self.repository, &subject.digest, &revision)
                .await
                .map_err(|e| {
                    error!("Error indexing referrers for {revision}: {e}");
                    e
                })?;
        }

        debug!("Stored manifest revision {revision}");
        Ok(revision)
    }

    /// Removes the revision from this repository. The payload blob stays
    /// until GC.
    pub async fn delete(&self, digest: &Digest) -> Result<(), Error> {
        self.revisions.delete(digest).await
    }

    /// Every manifest revision digest linked in this repository.
    pub async fn enumerate(&self) -> Result<Vec<Digest>, Error> {
        self.revisions.enumerate().await
    }
}
