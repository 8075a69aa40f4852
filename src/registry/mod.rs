pub mod api;
pub mod blob_store;
pub mod driver;
mod error;
pub mod extension;
pub mod gc;
pub mod manifest;
pub mod manifest_store;
pub mod oci;
pub mod path_spec;
pub mod referrers;
pub mod tag_store;
pub mod vacuum;

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::registry::blob_store::{BlobStore, LinkKind, LinkedBlobStore};
use crate::registry::driver::{FsDriver, StorageDriver};
use crate::registry::extension::{
    ExtensionManifestHandler, ExtensionNamespace, ExtensionRoute, GcExtensionHandler,
};
use crate::registry::manifest_store::{ManifestStore, ManifestStoreOption, ManifestUrls};
use crate::registry::tag_store::TagStore;

pub use error::{Error, VerificationError};

lazy_static! {
    static ref REPOSITORY_NAME_RE: Regex =
        Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$").unwrap();
}

/// The registry: a storage driver plus the process-wide codec and
/// extension state, handing out per-repository views.
pub struct Registry {
    driver: Arc<dyn StorageDriver>,
    manifest_urls: ManifestUrls,
    extensions: Vec<Arc<dyn ExtensionNamespace>>,
}

impl Registry {
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        manifest_urls: ManifestUrls,
        extension_configs: &BTreeMap<String, toml::Value>,
    ) -> Result<Self, Error> {
        manifest::register_builtin_codecs();

        // BTreeMap iteration keeps extension init order deterministic.
        let mut extensions = Vec::new();
        for (name, config) in extension_configs {
            let namespace = extension::init_extension(name, driver.clone(), config)?;
            extensions.push(namespace);
        }

        Ok(Self {
            driver,
            manifest_urls,
            extensions,
        })
    }

    /// A registry over a plain filesystem root with no extensions.
    pub fn for_path<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        Self::new(
            Arc::new(FsDriver::new(root)),
            ManifestUrls::default(),
            &BTreeMap::new(),
        )
    }

    pub fn driver(&self) -> &Arc<dyn StorageDriver> {
        &self.driver
    }

    pub fn validate_name(&self, name: &str) -> Result<(), Error> {
        if REPOSITORY_NAME_RE.is_match(name) {
            Ok(())
        } else {
            Err(Error::NameInvalid(name.to_string()))
        }
    }

    pub fn repository(&self, name: &str) -> Result<Repository, Error> {
        self.validate_name(name)?;

        let mut extension_manifest_handlers = Vec::new();
        for namespace in &self.extensions {
            extension_manifest_handlers.extend(namespace.manifest_handlers());
        }

        Ok(Repository {
            name: name.to_string(),
            driver: self.driver.clone(),
            manifest_urls: self.manifest_urls.clone(),
            extension_manifest_handlers,
        })
    }

    /// Global blob statter/provider, unscoped by repository.
    pub fn blobs(&self) -> BlobStore {
        BlobStore::new(self.driver.clone())
    }

    pub fn gc_handlers(&self) -> Vec<Arc<dyn GcExtensionHandler>> {
        self.extensions
            .iter()
            .flat_map(|namespace| namespace.gc_handlers())
            .collect()
    }

    pub fn extension_routes(&self) -> Vec<ExtensionRoute> {
        self.extensions
            .iter()
            .flat_map(|namespace| {
                let mut routes = namespace.registry_routes();
                routes.extend(namespace.repository_routes());
                routes
            })
            .collect()
    }

    /// Walks the repositories tree and returns every repository name,
    /// sorted. A directory is a repository once it contains one of the
    /// `_manifests`/`_layers`/`_refs` marker children.
    pub async fn enumerate_repositories(&self) -> Result<Vec<String>, Error> {
        let base_path = path_spec::repositories_root_dir();
        let mut repositories = Vec::new();
        let mut stack = vec![base_path.clone()];

        while let Some(current) = stack.pop() {
            let mut is_repository = false;
            for entry in self.driver.list(&current).await? {
                if entry.starts_with('_') {
                    is_repository = true;
                } else {
                    stack.push(format!("{current}/{entry}"));
                }
            }

            if is_repository {
                let name = current
                    .strip_prefix(&base_path)
                    .unwrap_or(&current)
                    .trim_start_matches('/');
                if !name.is_empty() {
                    debug!("Found repository: {name}");
                    repositories.push(name.to_string());
                }
            }
        }

        repositories.sort();
        repositories.dedup();
        Ok(repositories)
    }
}

/// A named collection scoping manifest revisions, tags, layer links and
/// referrer links. Repositories do not own blobs, only links to them.
pub struct Repository {
    name: String,
    driver: Arc<dyn StorageDriver>,
    manifest_urls: ManifestUrls,
    extension_manifest_handlers: Vec<Arc<dyn ExtensionManifestHandler>>,
}

impl Repository {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifests(&self) -> ManifestStore {
        ManifestStore::new(
            self.driver.clone(),
            &self.name,
            self.manifest_urls.clone(),
            self.extension_manifest_handlers.clone(),
        )
    }

    pub fn manifests_with_options(
        &self,
        options: &[ManifestStoreOption],
    ) -> Result<ManifestStore, Error> {
        let mut store = self.manifests();
        for option in options {
            store.apply_option(*option)?;
        }
        Ok(store)
    }

    pub fn tags(&self) -> TagStore {
        TagStore::new(self.driver.clone(), &self.name)
    }

    /// The repository's layer-scoped blob view, used both by uploads and
    /// by dependency verification.
    pub fn blobs(&self) -> LinkedBlobStore {
        LinkedBlobStore::new(self.driver.clone(), &self.name, vec![LinkKind::Layer])
    }
}
