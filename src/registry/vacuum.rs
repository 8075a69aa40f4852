use std::sync::Arc;

use tracing::{info, warn};

use crate::registry::driver::StorageDriver;
use crate::registry::extension::GcExtensionHandler;
use crate::registry::oci::Digest;
use crate::registry::{path_spec, Error};

/// Low-level deletion helpers used by the garbage collector. These only
/// work reliably on strongly consistent storage.
pub struct Vacuum {
    driver: Arc<dyn StorageDriver>,
    gc_handlers: Vec<Arc<dyn GcExtensionHandler>>,
}

impl Vacuum {
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        gc_handlers: Vec<Arc<dyn GcExtensionHandler>>,
    ) -> Self {
        Self {
            driver,
            gc_handlers,
        }
    }

    pub async fn remove_blob(&self, digest: &Digest) -> Result<(), Error> {
        let blob_path = path_spec::blob_container_dir(digest);
        info!("Deleting blob: {blob_path}");
        self.driver.delete(&blob_path).await?;
        Ok(())
    }

    /// Removes a manifest revision together with any of the given tags
    /// still pointing at it in their history index, then runs every GC
    /// extension's per-manifest removal hook.
    pub async fn remove_manifest(
        &self,
        repository: &str,
        digest: &Digest,
        tags: &[String],
    ) -> Result<(), Error> {
        for tag in tags {
            let index_entry = path_spec::manifest_tag_index_entry_dir(repository, tag, digest);
            match self.driver.delete(&index_entry).await {
                Ok(()) => info!("Deleted manifest tag reference: {index_entry}"),
                Err(e) if e.is_path_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let revision_dir = path_spec::manifest_revision_dir(repository, digest);
        info!("Deleting manifest: {revision_dir}");
        match self.driver.delete(&revision_dir).await {
            Ok(()) => {}
            Err(e) if e.is_path_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let referrer_root = path_spec::referrers_subject_dir(repository, digest);
        match self.driver.delete(&referrer_root).await {
            Ok(()) => info!("Deleted referrer root: {referrer_root}"),
            Err(e) if e.is_path_not_found() => {}
            Err(e) => {
                warn!("Failed to delete referrer root {referrer_root}: {e}");
                return Err(e.into());
            }
        }

        for handler in &self.gc_handlers {
            handler
                .remove_manifest(&self.driver, repository, digest)
                .await
                .map_err(|e| {
                    Error::Internal(format!(
                        "failed to call remove manifest extension handler: {e}"
                    ))
                })?;
        }

        Ok(())
    }

    /// Removes an artifact manifest revision and its referrer root
    /// folder, so the artifact disappears both as content and as a
    /// subject.
    pub async fn remove_artifact_manifest(
        &self,
        repository: &str,
        digest: &Digest,
    ) -> Result<(), Error> {
        let revision_dir = path_spec::manifest_revision_dir(repository, digest);
        info!("Deleting artifact manifest: {revision_dir}");
        match self.driver.delete(&revision_dir).await {
            Ok(()) => {}
            Err(e) if e.is_path_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let referrer_root = path_spec::referrers_subject_dir(repository, digest);
        match self.driver.delete(&referrer_root).await {
            Ok(()) => info!("Deleted referrer root: {referrer_root}"),
            Err(e) if e.is_path_not_found() => {}
            Err(e) => {
                warn!("Failed to delete referrer root {referrer_root}: {e}");
                return Err(e.into());
            }
        }

        Ok(())
    }

    pub async fn remove_repository(&self, repository: &str) -> Result<(), Error> {
        let repository_dir = path_spec::repository_dir(repository);
        info!("Deleting repository: {repository_dir}");
        self.driver.delete(&repository_dir).await?;
        Ok(())
    }
}
