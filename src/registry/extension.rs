use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Request, Response};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::registry::api::Body;
use crate::registry::driver::StorageDriver;
use crate::registry::manifest::Manifest;
use crate::registry::manifest_store::ManifestStore;
use crate::registry::oci::Digest;
use crate::registry::Error;

/// Handles manifests of media types the core does not know. Contributed
/// by extension namespaces at manifest-store construction time.
#[async_trait]
pub trait ExtensionManifestHandler: Send + Sync {
    fn handles(&self, manifest: &Manifest) -> bool;

    async fn put(
        &self,
        store: &ManifestStore,
        manifest: &Manifest,
        skip_dependency_verification: bool,
    ) -> Result<Digest, Error>;
}

/// GC hook surface. `mark_manifest` sees every manifest during the mark
/// phase and may claim it (the core then skips its own processing);
/// `sweep_blobs` contributes additional live digests before blobs are
/// deleted; `remove_manifest` runs for every manifest the vacuum removes.
#[async_trait]
pub trait GcExtensionHandler: Send + Sync {
    async fn mark_manifest(
        &self,
        repository: &str,
        digest: &Digest,
        manifest: &Manifest,
    ) -> Result<bool, Error>;

    async fn sweep_blobs(&self) -> Result<Vec<Digest>, Error>;

    async fn remove_manifest(
        &self,
        driver: &Arc<dyn StorageDriver>,
        repository: &str,
        digest: &Digest,
    ) -> Result<(), Error>;
}

#[async_trait]
pub trait ExtensionRouteDispatcher: Send + Sync {
    async fn dispatch(&self, request: Request<Bytes>) -> Result<Response<Body>, Error>;
}

/// An HTTP route contributed by an extension, served under
/// `_<namespace>/<extension>/<component>`.
#[derive(Clone)]
pub struct ExtensionRoute {
    pub namespace: String,
    pub extension: String,
    pub component: String,
    pub dispatcher: Arc<dyn ExtensionRouteDispatcher>,
}

impl ExtensionRoute {
    pub fn path(&self) -> String {
        format!("_{}/{}/{}", self.namespace, self.extension, self.component)
    }
}

/// One registered extension namespace, initialized once at process start
/// from its opaque configuration block.
pub trait ExtensionNamespace: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn manifest_handlers(&self) -> Vec<Arc<dyn ExtensionManifestHandler>> {
        Vec::new()
    }

    fn gc_handlers(&self) -> Vec<Arc<dyn GcExtensionHandler>> {
        Vec::new()
    }

    fn repository_routes(&self) -> Vec<ExtensionRoute> {
        Vec::new()
    }

    fn registry_routes(&self) -> Vec<ExtensionRoute> {
        Vec::new()
    }
}

pub type InitExtensionFn =
    fn(Arc<dyn StorageDriver>, &toml::Value) -> Result<Arc<dyn ExtensionNamespace>, Error>;

lazy_static! {
    static ref EXTENSIONS: RwLock<HashMap<String, InitExtensionFn>> = RwLock::new(HashMap::new());
}

/// Registers an extension init function under a namespace name. Written
/// only during startup; registering the same name twice aborts the
/// process.
pub fn register_extension(name: &str, init: InitExtensionFn) {
    let mut extensions = EXTENSIONS.write().expect("extension registry poisoned");
    if extensions.contains_key(name) {
        panic!("extension namespace already registered: {name}");
    }
    extensions.insert(name.to_string(), init);
}

/// Constructs the named extension with its configuration block.
pub fn init_extension(
    name: &str,
    driver: Arc<dyn StorageDriver>,
    config: &toml::Value,
) -> Result<Arc<dyn ExtensionNamespace>, Error> {
    let init = {
        let extensions = EXTENSIONS.read().expect("extension registry poisoned");
        extensions.get(name).copied()
    };

    match init {
        Some(init) => init(driver, config),
        None => Err(Error::Internal(format!(
            "no extension registered with name: {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullNamespace;

    impl ExtensionNamespace for NullNamespace {
        fn name(&self) -> &str {
            "null"
        }
    }

    fn init_null(
        _driver: Arc<dyn StorageDriver>,
        _config: &toml::Value,
    ) -> Result<Arc<dyn ExtensionNamespace>, Error> {
        Ok(Arc::new(NullNamespace))
    }

    #[tokio::test]
    async fn test_register_and_init() {
        register_extension("null-test", init_null);

        let tmp_dir = tempfile::TempDir::new().unwrap();
        let driver: Arc<dyn StorageDriver> =
            Arc::new(crate::registry::driver::FsDriver::new(tmp_dir.path()));

        let namespace =
            init_extension("null-test", driver.clone(), &toml::Value::Boolean(true)).unwrap();
        assert_eq!(namespace.name(), "null");
        assert!(namespace.manifest_handlers().is_empty());
        assert!(namespace.gc_handlers().is_empty());

        assert!(init_extension("unregistered", driver, &toml::Value::Boolean(true)).is_err());
    }
}
