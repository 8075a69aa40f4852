mod error;
mod fs;

use async_trait::async_trait;
use std::fmt;
use std::fmt::{Debug, Formatter};

pub use error::Error;
pub use fs::FsDriver;

#[derive(Clone, Debug, PartialEq)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Byte-level key-value storage underneath the registry. Paths are
/// `/`-separated and rooted at the driver's own root; the path mapper is
/// the only component allowed to construct them.
///
/// Single-object writes are last-writer-wins; `put_content` replaces the
/// whole object atomically.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, Error>;

    async fn put_content(&self, path: &str, content: &[u8]) -> Result<(), Error>;

    async fn stat(&self, path: &str) -> Result<FileInfo, Error>;

    /// Returns the sorted child names of a directory. A missing directory
    /// lists as empty.
    async fn list(&self, path: &str) -> Result<Vec<String>, Error>;

    /// Depth-first traversal below `path`, yielding every file and
    /// directory. A missing root is `PathNotFound`; callers decide whether
    /// that is tolerable.
    async fn walk(&self, path: &str) -> Result<Vec<FileInfo>, Error>;

    /// Recursively deletes `path`. A missing target is `PathNotFound`.
    async fn delete(&self, path: &str) -> Result<(), Error>;
}

impl Debug for (dyn StorageDriver + 'static) {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageDriver").finish()
    }
}
