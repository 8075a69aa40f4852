use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::registry::blob_store::BlobStore;
use crate::registry::driver::{Error as DriverError, StorageDriver};
use crate::registry::manifest::{Manifest, CREATED_ANNOTATION};
use crate::registry::manifest_store::ManifestStore;
use crate::registry::oci::{Descriptor, Digest};
use crate::registry::{path_spec, Error};

/// Page size bounds for the paginated referrers API. A requested `n`
/// outside the bounds resets to the maximum; the minimum also fixes how
/// many digests a continuation token carries.
pub const MAX_PAGE_SIZE: usize = 50;
pub const MIN_PAGE_SIZE: usize = 3;

/// Records the (subject, referrer) edge: a link file whose existence *is*
/// the edge and whose content is the referrer digest. Idempotent.
pub async fn link_referrer(
    driver: &Arc<dyn StorageDriver>,
    repository: &str,
    subject: &Digest,
    referrer: &Digest,
) -> Result<(), Error> {
    let link_path = path_spec::referrer_link_path(repository, subject, referrer);
    debug!("Indexing referrer {referrer} of subject {subject} at {link_path}");
    driver
        .put_content(&link_path, referrer.to_string().as_bytes())
        .await?;
    Ok(())
}

/// Drops the (subject, referrer) edge. Missing links are fine: either side
/// of the edge may have been cleaned up first.
pub async fn unlink_referrer(
    driver: &Arc<dyn StorageDriver>,
    repository: &str,
    subject: &Digest,
    referrer: &Digest,
) -> Result<(), Error> {
    let link_dir = path_spec::referrer_link_dir(repository, subject, referrer);
    match driver.delete(&link_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_path_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Walks the referrer subtree rooted at `root_path`, considering only
/// files named `link`, and yields each digest that still resolves in the
/// global blob store. Stale links (blob already swept) are skipped; a
/// missing root means no referrers.
#[instrument(skip(driver, blob_statter))]
pub async fn enumerate_referrer_links(
    driver: &Arc<dyn StorageDriver>,
    blob_statter: &BlobStore,
    root_path: &str,
) -> Result<Vec<Digest>, Error> {
    let entries = match driver.walk(root_path).await {
        Ok(entries) => entries,
        Err(DriverError::PathNotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut digests = Vec::new();
    for entry in entries {
        if entry.is_dir || !entry.path.ends_with("/link") {
            continue;
        }

        let content = driver.get_content(&entry.path).await?;
        let linked = String::from_utf8(content)
            .map_err(|e| Error::Internal(format!("corrupt referrer link: {e}")))?;
        let digest = Digest::try_from(linked.trim())?;

        match blob_statter.stat(&digest).await {
            Ok(_) => digests.push(digest),
            Err(Error::BlobUnknown(_)) => {
                debug!("Skipping referrer link to unknown blob: {digest}");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(digests)
}

/// Enumerates the referrers of `subject` in one repository.
pub async fn referrer_digests(
    driver: &Arc<dyn StorageDriver>,
    repository: &str,
    subject: &Digest,
) -> Result<Vec<Digest>, Error> {
    let root = path_spec::referrers_subject_dir(repository, subject);
    let statter = BlobStore::new(driver.clone());
    enumerate_referrer_links(driver, &statter, &root).await
}

struct SortedReferrer {
    created_at: DateTime<FixedOffset>,
    descriptor: Descriptor,
}

/// Hydrates referrer links into descriptors: loads each referrer
/// manifest, filters by artifact type, fills size from the blob stat and
/// media type from the payload, then orders descriptors carrying the
/// created annotation most-recent-first with unannotated ones appended in
/// enumeration order.
#[instrument(skip(driver, manifests))]
pub async fn referrers_for_subject(
    driver: &Arc<dyn StorageDriver>,
    manifests: &ManifestStore,
    repository: &str,
    subject: &Digest,
    artifact_type: Option<&str>,
) -> Result<Vec<Descriptor>, Error> {
    let statter = BlobStore::new(driver.clone());

    let mut annotated = Vec::new();
    let mut unannotated = Vec::new();

    for referrer in referrer_digests(driver, repository, subject).await? {
        let manifest = manifests.get(&referrer).await?;

        let Some(descriptor) = referrer_descriptor(&statter, &manifest, &referrer).await? else {
            // The PUT handler guards against non-referrer manifests ending
            // up here; skip anything unexpected.
            warn!("Skipping non-referrer manifest in referrer index: {referrer}");
            continue;
        };

        if let Some(filter) = artifact_type {
            if descriptor.artifact_type.as_deref() != Some(filter) {
                continue;
            }
        }

        let created = manifest
            .annotations()
            .and_then(|annotations| annotations.get(CREATED_ANNOTATION));

        match created {
            Some(timestamp) => {
                let created_at = DateTime::parse_from_rfc3339(timestamp).map_err(|e| {
                    Error::Internal(format!(
                        "failed to parse created annotation timestamp: {e}"
                    ))
                })?;
                annotated.push(SortedReferrer {
                    created_at,
                    descriptor,
                });
            }
            None => unannotated.push(descriptor),
        }
    }

    annotated.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut result: Vec<Descriptor> = annotated.into_iter().map(|r| r.descriptor).collect();
    result.extend(unannotated);
    Ok(result)
}

async fn referrer_descriptor(
    statter: &BlobStore,
    manifest: &Manifest,
    referrer: &Digest,
) -> Result<Option<Descriptor>, Error> {
    let artifact_type = match manifest {
        Manifest::OciArtifact(_) | Manifest::OrasArtifact(_) => {
            manifest.artifact_type().map(ToString::to_string)
        }
        // An OCI image referrer advertises its artifactType, falling back
        // to the config media type.
        Manifest::OciImage(m) if m.subject.is_some() => Some(
            m.artifact_type
                .clone()
                .unwrap_or_else(|| m.config.media_type.clone()),
        ),
        _ => return Ok(None),
    };

    let stat = statter.stat(referrer).await?;
    let (media_type, _) = manifest.payload();

    Ok(Some(Descriptor {
        media_type: media_type.to_string(),
        digest: referrer.clone(),
        size: stat.size,
        urls: Vec::new(),
        annotations: manifest.annotations().cloned().unwrap_or_default(),
        artifact_type,
        platform: None,
    }))
}

pub struct ReferrerPage {
    pub items: Vec<Descriptor>,
    pub next_token: Option<String>,
}

pub fn decode_next_token(token: &str) -> Result<Vec<Digest>, Error> {
    let decoded = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| Error::MalformedNextToken("nextToken base64 decoding failed".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| Error::MalformedNextToken("nextToken is not valid UTF-8".to_string()))?;

    decoded
        .split(',')
        .map(|part| {
            Digest::try_from(part)
                .map_err(|_| Error::MalformedNextToken("nextToken parsing failed".to_string()))
        })
        .collect()
}

pub fn encode_next_token(digests: &[Digest]) -> String {
    let joined = digests
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    URL_SAFE_NO_PAD.encode(joined.as_bytes())
}

/// Cuts one page out of the full referrer list. The continuation token
/// carries the digests of the last three entries of the previous page so
/// a resumed query survives concurrent insertions; the cut restarts after
/// the largest-index match.
pub fn paginate_referrers(
    referrers: Vec<Descriptor>,
    page_size: usize,
    token_digests: &[Digest],
) -> Result<ReferrerPage, Error> {
    if referrers.len() <= page_size {
        return Ok(ReferrerPage {
            items: referrers,
            next_token: None,
        });
    }

    let mut start_index = 0;
    if !token_digests.is_empty() {
        let mut matched = false;
        for (i, referrer) in referrers.iter().enumerate() {
            if token_digests.contains(&referrer.digest) {
                matched = true;
                if i + 1 > start_index {
                    start_index = i + 1;
                }
            }
        }
        if !matched {
            return Err(Error::MalformedNextToken(
                "nextToken digests not found in result".to_string(),
            ));
        }
    }

    if start_index >= referrers.len() {
        return Ok(ReferrerPage {
            items: Vec::new(),
            next_token: None,
        });
    }

    if referrers.len() - start_index <= page_size {
        return Ok(ReferrerPage {
            items: referrers[start_index..].to_vec(),
            next_token: None,
        });
    }

    let page = &referrers[start_index..start_index + page_size];
    let mut token = Vec::with_capacity(MIN_PAGE_SIZE);
    for i in (page_size - MIN_PAGE_SIZE..page_size).rev() {
        token.push(page[i].digest.clone());
    }

    Ok(ReferrerPage {
        items: page.to_vec(),
        next_token: Some(encode_next_token(&token)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(i: usize) -> Descriptor {
        Descriptor::from_digest(
            "application/vnd.cncf.oras.artifact.manifest.v1+json",
            Digest::from_bytes(format!("referrer {i}").as_bytes()),
            100,
        )
    }

    #[test]
    fn test_token_round_trip() {
        let digests = vec![
            Digest::from_bytes(b"a"),
            Digest::from_bytes(b"b"),
            Digest::from_bytes(b"c"),
        ];
        let token = encode_next_token(&digests);
        assert_eq!(decode_next_token(&token).unwrap(), digests);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_next_token("!!!not-base64!!!"),
            Err(Error::MalformedNextToken(_))
        ));

        let token = URL_SAFE_NO_PAD.encode(b"sha256:nope,sha256:still-nope");
        assert!(matches!(
            decode_next_token(&token),
            Err(Error::MalformedNextToken(_))
        ));
    }

    #[test]
    fn test_paginate_small_result_untouched() {
        let referrers: Vec<Descriptor> = (0..10).map(descriptor).collect();
        let page = paginate_referrers(referrers.clone(), 50, &[]).unwrap();
        assert_eq!(page.items, referrers);
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_paginate_resume_across_pages() {
        let referrers: Vec<Descriptor> = (0..120).map(descriptor).collect();

        let page1 = paginate_referrers(referrers.clone(), 50, &[]).unwrap();
        assert_eq!(page1.items.len(), 50);
        assert_eq!(page1.items[0], referrers[0]);
        let token1 = page1.next_token.expect("page 1 should continue");

        let token1_digests = decode_next_token(&token1).unwrap();
        assert_eq!(token1_digests.len(), MIN_PAGE_SIZE);
        assert_eq!(token1_digests[0], referrers[49].digest);

        let page2 = paginate_referrers(referrers.clone(), 50, &token1_digests).unwrap();
        assert_eq!(page2.items.len(), 50);
        assert_eq!(page2.items[0], referrers[50]);
        let token2 = page2.next_token.expect("page 2 should continue");

        let token2_digests = decode_next_token(&token2).unwrap();
        let page3 = paginate_referrers(referrers.clone(), 50, &token2_digests).unwrap();
        assert_eq!(page3.items.len(), 20);
        assert_eq!(page3.items[0], referrers[100]);
        assert!(page3.next_token.is_none());
    }

    #[test]
    fn test_paginate_tolerates_missing_leading_token_digest() {
        let referrers: Vec<Descriptor> = (0..120).map(descriptor).collect();

        // Simulate the page-1-final entry having been deleted between
        // requests; the remaining token digests still anchor the resume.
        let token = vec![
            Digest::from_bytes(b"deleted between pages"),
            referrers[48].digest.clone(),
            referrers[47].digest.clone(),
        ];

        let page = paginate_referrers(referrers.clone(), 50, &token).unwrap();
        assert_eq!(page.items[0], referrers[49]);
    }

    #[test]
    fn test_paginate_unknown_token_fails() {
        let referrers: Vec<Descriptor> = (0..120).map(descriptor).collect();
        let token = vec![Digest::from_bytes(b"not in the result at all")];

        assert!(matches!(
            paginate_referrers(referrers, 50, &token),
            Err(Error::MalformedNextToken(_))
        ));
    }

    #[test]
    fn test_paginate_token_at_end_yields_empty_page() {
        let referrers: Vec<Descriptor> = (0..60).map(descriptor).collect();
        let token = vec![referrers[59].digest.clone()];

        let page = paginate_referrers(referrers, 50, &token).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_token.is_none());
    }
}
