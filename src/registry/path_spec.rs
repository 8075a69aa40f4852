//! The single place that knows the on-disk layout. Every other component
//! obtains storage paths from here; the layout is bit-compatible with
//! existing registries:
//!
//! ```text
//! /docker/registry/v2/
//!   blobs/<alg>/<first2>/<hex>/data
//!   repositories/<name>/
//!     _manifests/
//!       revisions/<alg>/<hex>/link
//!       tags/<tag>/current/link
//!       tags/<tag>/index/<alg>/<hex>/link
//!     _layers/<alg>/<hex>/link
//!     _refs/subjects/<subjAlg>/<subjHex>/<refAlg>/<refHex>/link
//! ```

use crate::registry::oci::Digest;

const ROOT_PREFIX: &str = "/docker/registry/v2";

pub fn blobs_root_dir() -> String {
    format!("{ROOT_PREFIX}/blobs")
}

pub fn blob_container_dir(digest: &Digest) -> String {
    format!(
        "{}/{}/{}/{}",
        blobs_root_dir(),
        digest.algorithm(),
        digest.hash_prefix(),
        digest.hash()
    )
}

pub fn blob_data_path(digest: &Digest) -> String {
    format!("{}/data", blob_container_dir(digest))
}

pub fn repositories_root_dir() -> String {
    format!("{ROOT_PREFIX}/repositories")
}

pub fn repository_dir(name: &str) -> String {
    format!("{}/{name}", repositories_root_dir())
}

pub fn manifests_root_dir(name: &str) -> String {
    format!("{}/_manifests", repository_dir(name))
}

pub fn manifest_revisions_dir(name: &str, algorithm: &str) -> String {
    format!("{}/revisions/{algorithm}", manifests_root_dir(name))
}

pub fn manifest_revision_dir(name: &str, digest: &Digest) -> String {
    format!(
        "{}/{}",
        manifest_revisions_dir(name, digest.algorithm()),
        digest.hash()
    )
}

pub fn manifest_revision_link_path(name: &str, digest: &Digest) -> String {
    format!("{}/link", manifest_revision_dir(name, digest))
}

pub fn manifest_tags_dir(name: &str) -> String {
    format!("{}/tags", manifests_root_dir(name))
}

pub fn manifest_tag_dir(name: &str, tag: &str) -> String {
    format!("{}/{tag}", manifest_tags_dir(name))
}

pub fn manifest_tag_current_link_path(name: &str, tag: &str) -> String {
    format!("{}/current/link", manifest_tag_dir(name, tag))
}

pub fn manifest_tag_index_dir(name: &str, tag: &str) -> String {
    format!("{}/index", manifest_tag_dir(name, tag))
}

pub fn manifest_tag_index_entry_dir(name: &str, tag: &str, digest: &Digest) -> String {
    format!(
        "{}/{}/{}",
        manifest_tag_index_dir(name, tag),
        digest.algorithm(),
        digest.hash()
    )
}

pub fn manifest_tag_index_entry_link_path(name: &str, tag: &str, digest: &Digest) -> String {
    format!("{}/link", manifest_tag_index_entry_dir(name, tag, digest))
}

pub fn layers_root_dir(name: &str) -> String {
    format!("{}/_layers", repository_dir(name))
}

pub fn layer_link_dir(name: &str, digest: &Digest) -> String {
    format!(
        "{}/{}/{}",
        layers_root_dir(name),
        digest.algorithm(),
        digest.hash()
    )
}

pub fn layer_link_path(name: &str, digest: &Digest) -> String {
    format!("{}/link", layer_link_dir(name, digest))
}

pub fn referrers_root_dir(name: &str) -> String {
    format!("{}/_refs/subjects", repository_dir(name))
}

pub fn referrers_subject_dir(name: &str, subject: &Digest) -> String {
    format!(
        "{}/{}/{}",
        referrers_root_dir(name),
        subject.algorithm(),
        subject.hash()
    )
}

pub fn referrer_link_dir(name: &str, subject: &Digest, referrer: &Digest) -> String {
    format!(
        "{}/{}/{}",
        referrers_subject_dir(name, subject),
        referrer.algorithm(),
        referrer.hash()
    )
}

pub fn referrer_link_path(name: &str, subject: &Digest, referrer: &Digest) -> String {
    format!("{}/link", referrer_link_dir(name, subject, referrer))
}
