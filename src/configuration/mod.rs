mod error;

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use crate::registry::manifest_store::ManifestUrls;

pub use error::Error;

#[derive(Clone, Debug, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub manifests: ManifestsConfig,
    /// Per-namespace extension configuration, opaque to the core and
    /// handed verbatim to each extension's init function.
    #[serde(default)]
    pub extensions: BTreeMap<String, toml::Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_bind_address() -> IpAddr {
        IpAddr::from(Ipv4Addr::UNSPECIFIED)
    }

    fn default_port() -> u16 {
        8000
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: Self::default_bind_address(),
            port: Self::default_port(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ManifestsConfig {
    /// Regex a foreign-layer URL must match to be accepted.
    #[serde(default)]
    pub url_allow: Option<String>,
    /// Regex rejecting foreign-layer URLs.
    #[serde(default)]
    pub url_deny: Option<String>,
}

impl ManifestsConfig {
    pub fn manifest_urls(&self) -> Result<ManifestUrls, Error> {
        let compile = |pattern: &Option<String>| -> Result<Option<Regex>, Error> {
            pattern
                .as_deref()
                .map(|p| Regex::new(p).map_err(|e| Error::Invalid(format!("bad URL regex: {e}"))))
                .transpose()
        };

        Ok(ManifestUrls {
            allow: compile(&self.url_allow)?,
            deny: compile(&self.url_deny)?,
        })
    }
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let config = r#"
            [storage]
            root_dir = "/var/lib/registry"
        "#;

        let config = Configuration::load_from_str(config).unwrap();
        assert_eq!(config.storage.root_dir, "/var/lib/registry");
        assert_eq!(config.server.port, 8000);
        assert_eq!(
            config.server.bind_address,
            IpAddr::from(Ipv4Addr::UNSPECIFIED)
        );
        assert!(config.extensions.is_empty());
    }

    #[test]
    fn test_load_full_config() {
        let config = r#"
            [server]
            bind_address = "127.0.0.1"
            port = 5000

            [storage]
            root_dir = "/srv/registry"

            [manifests]
            url_allow = "^https://mirror\\.example\\.com/"

            [extensions.oras]
            enabled = true
        "#;

        let config = Configuration::load_from_str(config).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.bind_address, "127.0.0.1".parse::<IpAddr>().unwrap());

        let urls = config.manifests.manifest_urls().unwrap();
        assert!(urls.allow.unwrap().is_match("https://mirror.example.com/x"));
        assert!(urls.deny.is_none());

        let oras = config.extensions.get("oras").unwrap();
        assert_eq!(oras.get("enabled"), Some(&toml::Value::Boolean(true)));
    }

    #[test]
    fn test_invalid_url_regex() {
        let config = r#"
            [storage]
            root_dir = "/srv/registry"

            [manifests]
            url_deny = "["
        "#;

        let config = Configuration::load_from_str(config).unwrap();
        assert!(config.manifests.manifest_urls().is_err());
    }

    #[test]
    fn test_missing_storage_section() {
        assert!(Configuration::load_from_str("[server]\nport = 1").is_err());
    }
}
