use std::sync::Arc;

use tracing::{debug, instrument};

use crate::registry::driver::StorageDriver;
use crate::registry::oci::Digest;
use crate::registry::{path_spec, Error};

/// Mutable (tag name -> digest) index over manifest revisions within one
/// repository. Tagging writes both the `current` link and a historical
/// `index` entry so that old revisions remain discoverable until GC.
#[derive(Clone)]
pub struct TagStore {
    driver: Arc<dyn StorageDriver>,
    repository: String,
}

impl TagStore {
    pub fn new(driver: Arc<dyn StorageDriver>, repository: &str) -> Self {
        Self {
            driver,
            repository: repository.to_string(),
        }
    }

    pub async fn resolve(&self, tag: &str) -> Result<Digest, Error> {
        let link_path = path_spec::manifest_tag_current_link_path(&self.repository, tag);
        let content = match self.driver.get_content(&link_path).await {
            Ok(content) => content,
            Err(e) if e.is_path_not_found() => {
                return Err(Error::ManifestUnknown(tag.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let linked = String::from_utf8(content)
            .map_err(|e| Error::Internal(format!("corrupt tag link: {e}")))?;
        Ok(Digest::try_from(linked.trim())?)
    }

    #[instrument(skip(self))]
    pub async fn tag(&self, tag: &str, digest: &Digest) -> Result<(), Error> {
        let current = path_spec::manifest_tag_current_link_path(&self.repository, tag);
        let index_entry =
            path_spec::manifest_tag_index_entry_link_path(&self.repository, tag, digest);

        let link = digest.to_string();
        self.driver.put_content(&current, link.as_bytes()).await?;
        self.driver
            .put_content(&index_entry, link.as_bytes())
            .await?;

        Ok(())
    }

    pub async fn untag(&self, tag: &str) -> Result<(), Error> {
        let tag_dir = path_spec::manifest_tag_dir(&self.repository, tag);
        debug!("Removing tag directory: {tag_dir}");
        match self.driver.delete(&tag_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_path_not_found() => Err(Error::ManifestUnknown(tag.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Every tag name in the repository, sorted.
    pub async fn all(&self) -> Result<Vec<String>, Error> {
        let tags_dir = path_spec::manifest_tags_dir(&self.repository);
        Ok(self.driver.list(&tags_dir).await?)
    }

    /// The tags whose current link points at `digest`.
    pub async fn lookup(&self, digest: &Digest) -> Result<Vec<String>, Error> {
        let mut tags = Vec::new();
        for tag in self.all().await? {
            match self.resolve(&tag).await {
                Ok(resolved) if &resolved == digest => tags.push(tag),
                Ok(_) => {}
                // A tag directory without a current link is a partial
                // delete; skip it.
                Err(Error::ManifestUnknown(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(tags)
    }
}
