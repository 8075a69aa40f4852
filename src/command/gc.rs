use argh::FromArgs;
use tracing::info;

use crate::command;
use crate::registry::gc::{mark_and_sweep, GcOptions};
use crate::registry::Registry;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "gc",
    description = "Mark-and-sweep garbage collection over the registry storage"
)]
pub struct Options {
    #[argh(switch, short = 'd')]
    /// only report what would be deleted, no changes are made
    pub dry_run: bool,
    #[argh(switch, short = 'u')]
    /// also delete manifests no tag points at (and their referrers)
    pub remove_untagged: bool,
}

pub struct Command {
    registry: Registry,
    options: GcOptions,
}

impl Command {
    pub fn new(options: &Options, registry: Registry) -> Self {
        if options.dry_run {
            info!("Dry-run mode: no changes will be made to the storage");
        }

        Self {
            registry,
            options: GcOptions {
                dry_run: options.dry_run,
                remove_untagged: options.remove_untagged,
            },
        }
    }

    pub async fn run(&self) -> Result<(), command::Error> {
        let summary = mark_and_sweep(&self.registry, self.options).await?;

        info!(
            "Garbage collection finished: {} digests marked, {} manifests, {} artifacts and {} blobs deleted",
            summary.marked,
            summary.manifests_deleted,
            summary.artifacts_deleted,
            summary.blobs_deleted
        );

        Ok(())
    }
}
