// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//! Multisig Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use directories_next::ProjectDirs;
use structopt::StructOpt;
use tokio::signal::unix;

use multisig_relayer::context::RelayerContext;
use multisig_relayer::router::ChannelRouter;
use multisig_relayer::store::SledBlockStore;
use multisig_relayer::{config, service};

/// Package identifier, where the default configuration & database are defined.
/// If the user does not start the relayer with the `--config-dir`
/// it will default to read from the default location depending on the OS.
const PACKAGE_ID: [&str; 3] = ["tools", "webb", "multisig-relayer"];

/// The Multisig Relayer Command-line tool
///
/// Start the relayer from a config directory:
///
///     $ multisig-relayer -vvv -c <CONFIG_DIR>
#[derive(StructOpt)]
#[structopt(name = "Multisig Relayer")]
struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    config_dir: Option<PathBuf>,
    /// Create the Database Store in a temporary directory.
    /// and will be deleted when the process exits.
    #[structopt(long)]
    tmp: bool,
}

#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;

    // The RelayerContext takes a configuration, and populates objects that
    // are needed throughout the lifetime of the relayer.
    let ctx = RelayerContext::new(config)?;

    // persistent storage for the follower's block checkpoint
    let store = create_store(&args)?;

    // the destination side is an external collaborator: outbound transfers
    // leave through the router and settled messages come back through the
    // inbound channel. Wire both ends to whatever writes the destination
    // chain; this binary logs the outbound half.
    let (router, mut outbound) = ChannelRouter::unbounded();
    let (_inbound_tx, inbound_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            tracing::info!(
                nonce = message.deposit_nonce,
                destination = message.destination,
                "outbound transfer ready for the destination writer",
            );
        }
    });

    // start all background services.
    // this does not block, will fire the services on background tasks.
    service::ignite(&ctx, Arc::new(store), Arc::new(router), inbound_rx).await?;
    tracing::info!("relayer started");

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let shutdown = || {
        tracing::warn!("Shutting down...");
        // send shutdown signal to all of the application.
        ctx.shutdown();
        std::thread::sleep(std::time::Duration::from_millis(300));
        tracing::info!("Clean Exit ..");
    };
    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            shutdown();
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            shutdown();
        },
    }
    Ok(())
}

/// Sets up the logger for the relayer, based on the verbosity level.
fn setup_logger(verbosity: i32) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let directive = format!("multisig_relayer={}", log_level).parse()?;
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(directive);
    tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter)
        .init();
    Ok(())
}

/// Loads the configuration from the given directory, falling back to the
/// platform config directory.
fn load_config<P>(config_dir: Option<P>) -> anyhow::Result<config::RelayerConfig>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for the relayer");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let config = config::load(path).context("failed to load the config")?;
    tracing::trace!("Config loaded..");
    Ok(config)
}

/// Creates the block checkpoint store, in a temporary directory when `--tmp`
/// is passed.
fn create_store(opts: &Opts) -> anyhow::Result<SledBlockStore> {
    if opts.tmp {
        tracing::debug!("Using temp dir for the store");
        let store = SledBlockStore::temporary()?;
        return Ok(store);
    }
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let p = match opts.config_dir.as_ref() {
        Some(p) => p.to_path_buf(),
        None => dirs.data_local_dir().to_path_buf(),
    };
    let db_path = match opts.config_dir.as_ref().zip(p.parent()) {
        Some((_, parent)) => parent.join("store"),
        None => p.join("store"),
    };
    let store = SledBlockStore::open(db_path)?;
    Ok(store)
}
