use std::sync::Arc;

use tracing::{debug, instrument};

use crate::registry::driver::{Error as DriverError, StorageDriver};
use crate::registry::oci::{Descriptor, Digest};
use crate::registry::{path_spec, Error};

const OCTET_STREAM: &str = "application/octet-stream";

/// Global content-addressed blob store. Blobs have no repository scope;
/// repositories gain access through link files (see [`LinkedBlobStore`]).
#[derive(Clone)]
pub struct BlobStore {
    driver: Arc<dyn StorageDriver>,
}

impl BlobStore {
    pub fn new(driver: Arc<dyn StorageDriver>) -> Self {
        Self { driver }
    }

    /// Writes `content` at its digest-derived path if not already present.
    /// Idempotent for a given byte sequence.
    pub async fn put(&self, content: &[u8]) -> Result<Digest, Error> {
        let digest = Digest::from_bytes(content);
        let data_path = path_spec::blob_data_path(&digest);

        match self.driver.stat(&data_path).await {
            Ok(_) => return Ok(digest),
            Err(e) if e.is_path_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        self.driver.put_content(&data_path, content).await?;
        Ok(digest)
    }

    pub async fn get(&self, digest: &Digest) -> Result<Vec<u8>, Error> {
        let data_path = path_spec::blob_data_path(digest);
        match self.driver.get_content(&data_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.is_path_not_found() => Err(Error::BlobUnknown(digest.clone())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn stat(&self, digest: &Digest) -> Result<Descriptor, Error> {
        let data_path = path_spec::blob_data_path(digest);
        match self.driver.stat(&data_path).await {
            Ok(info) => Ok(Descriptor::from_digest(
                OCTET_STREAM,
                digest.clone(),
                info.size,
            )),
            Err(e) if e.is_path_not_found() => Err(Error::BlobUnknown(digest.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Visits every blob digest in the store, in path order. Used by the
    /// GC sweep phase.
    #[instrument(skip(self))]
    pub async fn enumerate(&self) -> Result<Vec<Digest>, Error> {
        let root = path_spec::blobs_root_dir();

        let entries = match self.driver.walk(&root).await {
            Ok(entries) => entries,
            Err(DriverError::PathNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut digests = Vec::new();
        for entry in entries {
            if entry.is_dir || !entry.path.ends_with("/data") {
                continue;
            }

            // <blobs root>/<alg>/<first2>/<hex>/data
            let parts: Vec<&str> = entry.path.split('/').collect();
            if parts.len() < 4 {
                continue;
            }
            let hash = parts[parts.len() - 2];
            let algorithm = parts[parts.len() - 4];

            match Digest::try_from(format!("{algorithm}:{hash}").as_str()) {
                Ok(digest) => digests.push(digest),
                Err(_) => debug!("Skipping malformed blob path: {}", entry.path),
            }
        }

        Ok(digests)
    }
}

/// The kinds of link files a repository-scoped store can maintain; each
/// maps to one path family under the repository root.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkKind {
    ManifestRevision,
    Layer,
}

impl LinkKind {
    fn link_path(self, name: &str, digest: &Digest) -> String {
        match self {
            LinkKind::ManifestRevision => path_spec::manifest_revision_link_path(name, digest),
            LinkKind::Layer => path_spec::layer_link_path(name, digest),
        }
    }

    fn link_dir(self, name: &str, digest: &Digest) -> String {
        match self {
            LinkKind::ManifestRevision => path_spec::manifest_revision_dir(name, digest),
            LinkKind::Layer => path_spec::layer_link_dir(name, digest),
        }
    }

    fn root_dir(self, name: &str) -> String {
        match self {
            LinkKind::ManifestRevision => path_spec::manifest_revisions_dir(name, "sha256"),
            LinkKind::Layer => path_spec::layers_root_dir(name),
        }
    }
}

/// Repository-scoped view over the global blob store. A blob is visible
/// through this store only if one of the configured link kinds resolves in
/// the repository; `put` records the link for the first configured kind.
///
/// Scoping an instance to exactly one link kind yields the read-only views
/// used by the manifest store and GC.
#[derive(Clone)]
pub struct LinkedBlobStore {
    blobs: BlobStore,
    driver: Arc<dyn StorageDriver>,
    repository: String,
    link_kinds: Vec<LinkKind>,
}

impl LinkedBlobStore {
    pub fn new(driver: Arc<dyn StorageDriver>, repository: &str, link_kinds: Vec<LinkKind>) -> Self {
        Self {
            blobs: BlobStore::new(driver.clone()),
            driver,
            repository: repository.to_string(),
            link_kinds,
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Writes the blob globally (if absent) and records the repository
    /// link, returning the resulting descriptor.
    #[instrument(skip(self, content))]
    pub async fn put(&self, media_type: &str, content: &[u8]) -> Result<Descriptor, Error> {
        let digest = self.blobs.put(content).await?;

        let kind = self.link_kinds.first().ok_or_else(|| {
            Error::Internal("linked blob store has no link kinds configured".to_string())
        })?;

        let link_path = kind.link_path(&self.repository, &digest);
        debug!("Linking blob {digest} at {link_path}");
        self.driver
            .put_content(&link_path, digest.to_string().as_bytes())
            .await?;

        Ok(Descriptor::from_digest(
            media_type,
            digest,
            content.len() as u64,
        ))
    }

    pub async fn get(&self, digest: &Digest) -> Result<Vec<u8>, Error> {
        self.stat(digest).await?;
        self.blobs.get(digest).await
    }

    /// Linked statter: a link for one of the configured kinds must resolve
    /// in this repository before the global blob is consulted.
    pub async fn stat(&self, digest: &Digest) -> Result<Descriptor, Error> {
        for kind in &self.link_kinds {
            let link_path = kind.link_path(&self.repository, digest);
            match self.driver.get_content(&link_path).await {
                Ok(content) => {
                    let linked = String::from_utf8(content)
                        .map_err(|e| Error::Internal(format!("corrupt link file: {e}")))?;
                    let linked = Digest::try_from(linked.trim())?;
                    if &linked != digest {
                        return Err(Error::Internal(format!(
                            "link at {link_path} points to {linked}, expected {digest}"
                        )));
                    }
                    return self.blobs.stat(digest).await;
                }
                Err(e) if e.is_path_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::BlobUnknown(digest.clone()))
    }

    /// Walks the link directory of the first configured kind and yields
    /// each linked digest. A missing root enumerates as empty.
    pub async fn enumerate(&self) -> Result<Vec<Digest>, Error> {
        let kind = self.link_kinds.first().ok_or_else(|| {
            Error::Internal("linked blob store has no link kinds configured".to_string())
        })?;

        let root = kind.root_dir(&self.repository);
        let entries = match self.driver.walk(&root).await {
            Ok(entries) => entries,
            Err(DriverError::PathNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut digests = Vec::new();
        for entry in entries {
            if entry.is_dir || !entry.path.ends_with("/link") {
                continue;
            }

            let content = self.driver.get_content(&entry.path).await?;
            let linked = String::from_utf8(content)
                .map_err(|e| Error::Internal(format!("corrupt link file: {e}")))?;
            digests.push(Digest::try_from(linked.trim())?);
        }

        Ok(digests)
    }

    /// Removes the repository links for `digest`. The global blob stays;
    /// reclaiming it is the garbage collector's job.
    pub async fn delete(&self, digest: &Digest) -> Result<(), Error> {
        for kind in &self.link_kinds {
            let link_dir = kind.link_dir(&self.repository, digest);
            match self.driver.delete(&link_dir).await {
                Ok(()) => {}
                Err(e) if e.is_path_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn global(&self) -> &BlobStore {
        &self.blobs
    }
}
