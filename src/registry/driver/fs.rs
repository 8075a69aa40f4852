use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::registry::driver::{Error, FileInfo, StorageDriver};

#[derive(Clone, Debug)]
pub struct FsDriver {
    root: PathBuf,
}

impl FsDriver {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn relative_path(&self, full: &Path) -> String {
        let relative = full.strip_prefix(&self.root).unwrap_or(full);
        format!("/{}", relative.to_string_lossy())
    }
}

#[async_trait]
impl StorageDriver for FsDriver {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, Error> {
        fs::read(self.full_path(path))
            .await
            .map_err(|e| Error::from_io(path, &e))
    }

    async fn put_content(&self, path: &str, content: &[u8]) -> Result<(), Error> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::from_io(path, &e))?;
        }

        let mut temp_file =
            tempfile::NamedTempFile::new_in(full_path.parent().unwrap_or(Path::new(".")))
                .map_err(|e| Error::from_io(path, &e))?;

        temp_file
            .write_all(content)
            .map_err(|e| Error::from_io(path, &e))?;

        temp_file
            .persist(full_path)
            .map_err(|e| Error::Io(format!("{path}: {e}")))?;

        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, Error> {
        let metadata = fs::metadata(self.full_path(path))
            .await
            .map_err(|e| Error::from_io(path, &e))?;

        Ok(FileInfo {
            path: path.to_string(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, Error> {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();

        let mut read_dir = match fs::read_dir(full_path).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(Error::from_io(path, &e)),
        };

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::from_io(path, &e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }

        entries.sort();
        Ok(entries)
    }

    async fn walk(&self, path: &str) -> Result<Vec<FileInfo>, Error> {
        let root = self.full_path(path);
        if !root.exists() {
            return Err(Error::PathNotFound(path.to_string()));
        }

        let mut collected = Vec::new();
        let mut stack = vec![root];

        while let Some(current) = stack.pop() {
            let mut read_dir = fs::read_dir(&current)
                .await
                .map_err(|e| Error::from_io(path, &e))?;

            let mut children = Vec::new();
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| Error::from_io(path, &e))?
            {
                children.push(entry.path());
            }
            children.sort();

            for child in children {
                let metadata = fs::metadata(&child)
                    .await
                    .map_err(|e| Error::from_io(path, &e))?;

                collected.push(FileInfo {
                    path: self.relative_path(&child),
                    size: if metadata.is_dir() { 0 } else { metadata.len() },
                    is_dir: metadata.is_dir(),
                });

                if metadata.is_dir() {
                    stack.push(child);
                }
            }
        }

        Ok(collected)
    }

    async fn delete(&self, path: &str) -> Result<(), Error> {
        let full_path = self.full_path(path);

        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|e| Error::from_io(path, &e))?;

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };

        result.map_err(|e| Error::from_io(path, &e))
    }
}
