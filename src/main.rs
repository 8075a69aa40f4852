#![forbid(unsafe_code)]

use argh::FromArgs;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::command::{gc, server};
use crate::configuration::Configuration;
use crate::registry::driver::FsDriver;
use crate::registry::Registry;

mod command;
mod configuration;
mod registry;

#[derive(FromArgs, PartialEq, Debug)]
/// A content-addressed artifact registry with referrer indexing
struct GlobalArguments {
    #[argh(option, short = 'c', default = "GlobalArguments::default_config_path()")]
    /// the path to the configuration file, defaults to `config.toml`
    config: String,

    #[argh(subcommand)]
    nested: SubCommand,
}

impl GlobalArguments {
    fn default_config_path() -> String {
        "config.toml".to_string()
    }
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Serve(server::Options),
    Gc(gc::Options),
}

fn set_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_registry(config: &Configuration) -> Result<Registry, command::Error> {
    let driver = Arc::new(FsDriver::new(&config.storage.root_dir));
    let manifest_urls = config.manifests.manifest_urls()?;

    Ok(Registry::new(driver, manifest_urls, &config.extensions)?)
}

fn main() -> Result<(), command::Error> {
    let arguments: GlobalArguments = argh::from_env();

    set_tracing();
    let config = Configuration::load(&arguments.config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let registry = build_registry(&config)?;

        match arguments.nested {
            SubCommand::Serve(_) => {
                let server = server::Command::new(&config.server, registry);
                server.run().await
            }
            SubCommand::Gc(gc_options) => {
                let gc = gc::Command::new(&gc_options, registry);
                gc.run().await
            }
        }
    })
}
