use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::registry::blob_store::BlobStore;
use crate::registry::driver::StorageDriver;
use crate::registry::manifest_store::ManifestStore;
use crate::registry::oci::Digest;
use crate::registry::vacuum::Vacuum;
use crate::registry::{path_spec, referrers, Error, Registry};

#[derive(Clone, Copy, Debug, Default)]
pub struct GcOptions {
    pub dry_run: bool,
    pub remove_untagged: bool,
}

#[derive(Debug)]
struct ManifestDel {
    repository: String,
    digest: Digest,
    tags: Vec<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct GcSummary {
    pub marked: usize,
    pub manifests_deleted: usize,
    pub artifacts_deleted: usize,
    pub blobs_deleted: usize,
}

/// How a referrer subtree walk treats what it finds: marking keeps the
/// referrer and its blobs alive, sweeping schedules the referrer for
/// deletion along with its subject.
#[derive(Clone, Copy, PartialEq)]
enum ReferrerIngest {
    Mark,
    Sweep,
}

/// Offline mark-and-sweep over the registry's content-addressed store.
/// Assumes no concurrent writes; operators must quiesce the registry
/// first.
pub async fn mark_and_sweep(registry: &Registry, opts: GcOptions) -> Result<GcSummary, Error> {
    let driver = registry.driver().clone();
    let gc_handlers = registry.gc_handlers();

    // mark
    let mut mark_set: HashSet<Digest> = HashSet::new();
    let mut manifest_deletions: Vec<ManifestDel> = Vec::new();
    let mut artifact_index: HashMap<Digest, String> = HashMap::new();

    for repository in registry.enumerate_repositories().await? {
        info!("{repository}");

        let repo = registry.repository(&repository)?;
        let manifests = repo.manifests();
        let tags = repo.tags();

        for digest in manifests.enumerate().await? {
            let manifest = manifests.get(&digest).await?;

            let mut claimed = false;
            for handler in &gc_handlers {
                if handler
                    .mark_manifest(&repository, &digest, &manifest)
                    .await?
                {
                    claimed = true;
                    break;
                }
            }
            if claimed {
                debug!("{repository}: manifest {digest} claimed by GC extension");
                continue;
            }

            // Artifacts are marked transitively while walking the refs of
            // their subjects; an untagged but referenced artifact stays
            // alive that way.
            if manifest.is_artifact() {
                continue;
            }

            if opts.remove_untagged {
                let pointing_tags = tags.lookup(&digest).await?;
                if pointing_tags.is_empty() {
                    info!("manifest eligible for deletion: {digest}");
                    // Record every tag of the repository: any of them may
                    // still hold this revision in its history index.
                    let all_tags = tags.all().await?;
                    manifest_deletions.push(ManifestDel {
                        repository: repository.clone(),
                        digest: digest.clone(),
                        tags: all_tags,
                    });

                    walk_referrer_subtree(
                        &driver,
                        &manifests,
                        &repository,
                        &digest,
                        ReferrerIngest::Sweep,
                        &mut mark_set,
                        &mut artifact_index,
                    )
                    .await?;
                    continue;
                }
            }

            info!("{repository}: marking manifest {digest}");
            mark_set.insert(digest.clone());

            for descriptor in manifest.references() {
                debug!("{repository}: marking blob {}", descriptor.digest);
                mark_set.insert(descriptor.digest);
            }

            walk_referrer_subtree(
                &driver,
                &manifests,
                &repository,
                &digest,
                ReferrerIngest::Mark,
                &mut mark_set,
                &mut artifact_index,
            )
            .await?;
        }
    }

    // sweep
    let vacuum = Vacuum::new(driver.clone(), gc_handlers.clone());
    if !opts.dry_run {
        for deletion in &manifest_deletions {
            vacuum
                .remove_manifest(&deletion.repository, &deletion.digest, &deletion.tags)
                .await?;
        }

        for (artifact_digest, repository) in &artifact_index {
            vacuum
                .remove_artifact_manifest(repository, artifact_digest)
                .await?;
        }
    }

    for handler in &gc_handlers {
        for digest in handler.sweep_blobs().await? {
            mark_set.insert(digest);
        }
    }

    let blob_service = BlobStore::new(driver.clone());
    let mut delete_set = Vec::new();
    for digest in blob_service.enumerate().await? {
        if !mark_set.contains(&digest) {
            delete_set.push(digest);
        }
    }

    info!(
        "{} blobs marked, {} blobs and {} manifests eligible for deletion",
        mark_set.len(),
        delete_set.len(),
        manifest_deletions.len()
    );

    for digest in &delete_set {
        info!("blob eligible for deletion: {digest}");
        if opts.dry_run {
            continue;
        }
        vacuum.remove_blob(digest).await?;
    }

    Ok(GcSummary {
        marked: mark_set.len(),
        manifests_deleted: manifest_deletions.len(),
        artifacts_deleted: artifact_index.len(),
        blobs_deleted: delete_set.len(),
    })
}

/// Walks the referrer graph below `root`. Marking recurses into each
/// referrer's own referrers so chains of artifacts stay alive; sweeping
/// does the same so the whole chain dies with its subject.
async fn walk_referrer_subtree(
    driver: &Arc<dyn StorageDriver>,
    manifests: &ManifestStore,
    repository: &str,
    root: &Digest,
    ingest: ReferrerIngest,
    mark_set: &mut HashSet<Digest>,
    artifact_index: &mut HashMap<Digest, String>,
) -> Result<(), Error> {
    let statter = BlobStore::new(driver.clone());

    let mut visited: HashSet<Digest> = HashSet::new();
    let mut stack = vec![root.clone()];

    while let Some(subject) = stack.pop() {
        if !visited.insert(subject.clone()) {
            continue;
        }

        let subtree = path_spec::referrers_subject_dir(repository, &subject);
        for referrer in
            referrers::enumerate_referrer_links(driver, &statter, &subtree).await?
        {
            match ingest {
                ReferrerIngest::Mark => {
                    let manifest = manifests.get(&referrer).await?;

                    info!("{repository}: marking artifact manifest {referrer}");
                    mark_set.insert(referrer.clone());

                    for descriptor in manifest.references() {
                        debug!("{repository}: marking blob {}", descriptor.digest);
                        mark_set.insert(descriptor.digest);
                    }
                }
                ReferrerIngest::Sweep => {
                    info!("{repository}: indexing artifact manifest {referrer}");
                    artifact_index.insert(referrer.clone(), repository.to_string());
                }
            }
            stack.push(referrer);
        }
    }

    Ok(())
}
