pub mod index;
pub mod oci_artifact;
pub mod ocischema;
pub mod oras_artifact;
pub mod schema2;
pub mod signed;

use lazy_static::lazy_static;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Once, RwLock};

use crate::registry::oci::{Descriptor, Digest};
use crate::registry::Error;

pub const MEDIA_TYPE_SIGNED_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const MEDIA_TYPE_SCHEMA2_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_OCI_ARTIFACT: &str = "application/vnd.oci.artifact.manifest.v1+json";
pub const MEDIA_TYPE_ORAS_ARTIFACT: &str = "application/vnd.cncf.oras.artifact.manifest.v1+json";

/// Annotation carrying an RFC3339 creation timestamp on artifact
/// manifests; the referrers API sorts on it.
pub const CREATED_ANNOTATION: &str = "io.cncf.oras.artifact.created";

/// Payload surface for manifests contributed by extensions for media types
/// the core does not know.
pub trait ManifestPayload: Debug + Send + Sync {
    fn media_type(&self) -> &str;
    fn payload(&self) -> &[u8];
    fn references(&self) -> Vec<Descriptor>;
    fn subject(&self) -> Option<&Descriptor> {
        None
    }
    fn artifact_type(&self) -> Option<&str> {
        None
    }
    fn annotations(&self) -> Option<&HashMap<String, String>> {
        None
    }
}

/// Every manifest schema the registry stores. All variants keep the
/// canonical client bytes; the digest is always computed over those bytes.
#[derive(Debug)]
pub enum Manifest {
    SignedV1(signed::SignedManifest),
    ImageV2(schema2::ImageManifest),
    Index(index::ImageIndex),
    OciImage(ocischema::OciManifest),
    OciArtifact(oci_artifact::ArtifactManifest),
    OrasArtifact(oras_artifact::ArtifactManifest),
    Extension(Box<dyn ManifestPayload>),
}

impl Manifest {
    /// The media type and canonical bytes, byte-for-byte as submitted.
    pub fn payload(&self) -> (&str, &[u8]) {
        match self {
            Manifest::SignedV1(m) => (MEDIA_TYPE_SIGNED_MANIFEST, m.payload()),
            Manifest::ImageV2(m) => (MEDIA_TYPE_SCHEMA2_MANIFEST, m.payload()),
            Manifest::Index(m) => (m.media_type(), m.payload()),
            Manifest::OciImage(m) => (MEDIA_TYPE_OCI_MANIFEST, m.payload()),
            Manifest::OciArtifact(m) => (MEDIA_TYPE_OCI_ARTIFACT, m.payload()),
            Manifest::OrasArtifact(m) => (MEDIA_TYPE_ORAS_ARTIFACT, m.payload()),
            Manifest::Extension(m) => (m.media_type(), m.payload()),
        }
    }

    pub fn media_type(&self) -> &str {
        self.payload().0
    }

    /// The descriptors this manifest directly depends on: config and
    /// layers for images, children for indexes, blobs for artifacts.
    pub fn references(&self) -> Vec<Descriptor> {
        match self {
            Manifest::SignedV1(m) => m.references(),
            Manifest::ImageV2(m) => m.references(),
            Manifest::Index(m) => m.references(),
            Manifest::OciImage(m) => m.references(),
            Manifest::OciArtifact(m) => m.references(),
            Manifest::OrasArtifact(m) => m.references(),
            Manifest::Extension(m) => m.references(),
        }
    }

    pub fn subject(&self) -> Option<&Descriptor> {
        match self {
            Manifest::OciImage(m) => m.subject.as_ref(),
            Manifest::OciArtifact(m) => m.subject.as_ref(),
            Manifest::OrasArtifact(m) => Some(&m.subject),
            Manifest::Extension(m) => m.subject(),
            _ => None,
        }
    }

    pub fn artifact_type(&self) -> Option<&str> {
        match self {
            Manifest::OciImage(m) => m.artifact_type.as_deref(),
            Manifest::OciArtifact(m) => Some(m.artifact_type.as_str()),
            Manifest::OrasArtifact(m) => Some(m.artifact_type.as_str()),
            Manifest::Extension(m) => m.artifact_type(),
            _ => None,
        }
    }

    pub fn annotations(&self) -> Option<&HashMap<String, String>> {
        match self {
            Manifest::OciImage(m) => Some(&m.annotations),
            Manifest::Index(m) => Some(&m.annotations),
            Manifest::OciArtifact(m) => Some(&m.annotations),
            Manifest::OrasArtifact(m) => Some(&m.annotations),
            Manifest::Extension(m) => m.annotations(),
            _ => None,
        }
    }

    /// Artifact manifests are special throughout: PUT indexes their
    /// subject and GC marks them only through referrer walks.
    pub fn is_artifact(&self) -> bool {
        matches!(self, Manifest::OciArtifact(_) | Manifest::OrasArtifact(_))
    }

    pub fn descriptor(&self) -> Descriptor {
        let (media_type, payload) = self.payload();
        Descriptor::from_digest(media_type, Digest::from_bytes(payload), payload.len() as u64)
    }
}

pub type UnmarshalFn = fn(&[u8]) -> Result<Manifest, Error>;

#[derive(Default)]
struct CodecRegistry {
    by_media_type: HashMap<String, UnmarshalFn>,
    fallbacks: Vec<UnmarshalFn>,
}

lazy_static! {
    static ref CODECS: RwLock<CodecRegistry> = RwLock::new(CodecRegistry::default());
}

static BUILTIN_CODECS: Once = Once::new();

/// Registers a decoder for a media type. Written only during startup;
/// a duplicate media type is a programming error and aborts the process.
pub fn register_manifest_codec(media_type: &str, unmarshal: UnmarshalFn) {
    let mut codecs = CODECS.write().expect("codec registry poisoned");
    if codecs.by_media_type.contains_key(media_type) {
        panic!("manifest codec already registered for media type: {media_type}");
    }
    codecs.by_media_type.insert(media_type.to_string(), unmarshal);
}

/// Registers a decoder consulted, in registration order, for payloads no
/// built-in codec recognizes. A fallback declines by returning
/// `Error::ManifestFormatUnsupported`.
pub fn register_fallback_codec(unmarshal: UnmarshalFn) {
    let mut codecs = CODECS.write().expect("codec registry poisoned");
    codecs.fallbacks.push(unmarshal);
}

/// Registers the built-in schemas exactly once, in deterministic order.
pub fn register_builtin_codecs() {
    BUILTIN_CODECS.call_once(|| {
        register_manifest_codec(MEDIA_TYPE_SCHEMA2_MANIFEST, |content| {
            Ok(Manifest::ImageV2(schema2::ImageManifest::from_slice(
                content,
            )?))
        });
        register_manifest_codec(MEDIA_TYPE_MANIFEST_LIST, |content| {
            Ok(Manifest::Index(index::ImageIndex::from_slice(content)?))
        });
        register_manifest_codec(MEDIA_TYPE_OCI_INDEX, |content| {
            Ok(Manifest::Index(index::ImageIndex::from_slice(content)?))
        });
        register_manifest_codec(MEDIA_TYPE_OCI_MANIFEST, |content| {
            Ok(Manifest::OciImage(ocischema::OciManifest::from_slice(
                content,
            )?))
        });
        register_manifest_codec(MEDIA_TYPE_OCI_ARTIFACT, |content| {
            Ok(Manifest::OciArtifact(
                oci_artifact::ArtifactManifest::from_slice(content)?,
            ))
        });
        register_manifest_codec(MEDIA_TYPE_ORAS_ARTIFACT, |content| {
            Ok(Manifest::OrasArtifact(
                oras_artifact::ArtifactManifest::from_slice(content)?,
            ))
        });
    });
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Versioned {
    #[serde(default)]
    schema_version: i32,
    #[serde(default)]
    media_type: Option<String>,
}

fn codec_for(media_type: &str) -> Option<UnmarshalFn> {
    let codecs = CODECS.read().expect("codec registry poisoned");
    codecs.by_media_type.get(media_type).copied()
}

fn fallback_codecs() -> Vec<UnmarshalFn> {
    let codecs = CODECS.read().expect("codec registry poisoned");
    codecs.fallbacks.clone()
}

/// Recognizes a payload by its schema version and media type and
/// dispatches to the matching codec.
pub fn from_slice(content: &[u8]) -> Result<Manifest, Error> {
    register_builtin_codecs();

    let versioned: Versioned = serde_json::from_slice(content)
        .map_err(|e| Error::ManifestInvalid(format!("undecodable envelope: {e}")))?;

    match versioned.schema_version {
        1 => {
            return Ok(Manifest::SignedV1(signed::SignedManifest::from_slice(
                content,
            )?))
        }
        2 => match versioned.media_type.as_deref() {
            Some(media_type) => {
                if let Some(unmarshal) = codec_for(media_type) {
                    return unmarshal(content);
                }
            }
            // OCI payloads may omit the media type; an index is
            // distinguished by a non-null manifests array.
            None => {
                if let Ok(manifest_list) = index::ImageIndex::from_slice(content) {
                    if manifest_list.has_manifests() {
                        return Ok(Manifest::Index(manifest_list));
                    }
                }
                return Ok(Manifest::OciImage(ocischema::OciManifest::from_slice(
                    content,
                )?));
            }
        },
        _ => {
            if let Some(media_type) = versioned.media_type.as_deref() {
                if let Some(unmarshal) = codec_for(media_type) {
                    return unmarshal(content);
                }
            }
        }
    }

    for unmarshal in fallback_codecs() {
        match unmarshal(content) {
            Err(Error::ManifestFormatUnsupported(_)) => continue,
            other => return other,
        }
    }

    Err(Error::ManifestFormatUnsupported(format!(
        "unrecognized manifest: schema version {}, media type {:?}",
        versioned.schema_version, versioned.media_type
    )))
}
