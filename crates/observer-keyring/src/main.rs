#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand, ValueEnum};
use eyre::Context as _;
use std::{io::Write as _, sync::Arc};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod bootstrap;
mod client;
mod config;
mod errors;
mod fsutil;
mod keyring;
mod paths;
mod permissions;
mod rpc;
mod state_store;
mod store;

use crate::{
    bootstrap::KeyringContext,
    client::KeyringClient,
    config::{BuildMode, KeyringConfig},
    permissions::PermissionGate,
    rpc::router::Router,
    state_store::{FileStateStore, MemoryStateStore, StateStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliBuildMode {
    Production,
    Development,
}

impl From<CliBuildMode> for BuildMode {
    fn from(v: CliBuildMode) -> Self {
        match v {
            CliBuildMode::Production => Self::Production,
            CliBuildMode::Development => Self::Development,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "observer-keyring", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer keyring and rpc requests as line-delimited JSON-RPC on stdio.
    Serve {
        /// Keep state in memory only.
        #[arg(long, default_value_t = false)]
        ephemeral: bool,

        /// Override the configured build mode.
        #[arg(long, value_enum)]
        build_mode: Option<CliBuildMode>,
    },

    /// Print the config, data and log locations as JSON.
    Paths,

    Accounts {
        #[command(subcommand)]
        cmd: AccountsCommand,
    },

    Requests {
        #[command(subcommand)]
        cmd: RequestsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AccountsCommand {
    List,
    /// Observe a new address.
    Create { address: String },
    Delete { id: Uuid },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum RequestsCommand {
    List,
    Approve { id: Uuid },
    Reject { id: Uuid },
}

fn init_logging(paths: &paths::KeyringPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("observer-keyring.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Stdout carries protocol frames, so human-facing logs go to stderr.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn build_router(paths: &paths::KeyringPaths, cfg: &KeyringConfig, ephemeral: bool) -> Router {
    let store: Arc<dyn StateStore> = if ephemeral {
        Arc::new(MemoryStateStore::new())
    } else {
        Arc::new(FileStateStore::new(paths.state_file()))
    };
    let context = KeyringContext::new(store, cfg.keyring_settings());
    Router::new(PermissionGate::from_config(cfg), context)
}

fn print_json<T: serde::Serialize>(v: &T) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize output")?;
    writeln!(std::io::stdout().lock(), "{s}").context("write output")?;
    Ok(())
}

async fn run_accounts(client: KeyringClient<'_>, cmd: AccountsCommand) -> eyre::Result<()> {
    match cmd {
        AccountsCommand::List => print_json(&client.list_accounts().await?),
        AccountsCommand::Create { address } => {
            print_json(&client.create_account(address.trim()).await?)
        }
        AccountsCommand::Delete { id } => {
            client.delete_account(id).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

async fn run_requests(client: KeyringClient<'_>, cmd: RequestsCommand) -> eyre::Result<()> {
    match cmd {
        RequestsCommand::List => print_json(&client.list_requests().await?),
        RequestsCommand::Approve { id } => print_json(&client.approve_request(id).await?),
        RequestsCommand::Reject { id } => print_json(&client.reject_request(id).await?),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::KeyringPaths::discover()?;
    paths.ensure_private_dirs().context("create keyring dirs")?;
    let _log_guard = init_logging(&paths);
    let mut cfg = store::ConfigStore::new(&paths)
        .load_or_init_default()
        .context("load config")?;

    match cli.cmd {
        Command::Serve {
            ephemeral,
            build_mode,
        } => {
            if let Some(mode) = build_mode {
                cfg.build_mode = Some(mode.into());
            }
            let origin = cfg
                .app_origin()
                .context("refusing to serve without an application origin")?;
            tracing::info!(
                build_mode = cfg.effective_build_mode().as_str(),
                app_origin = %origin,
                ephemeral,
                "starting keyring server"
            );
            let _lock = if ephemeral {
                None
            } else {
                Some(paths.acquire_state_lock()?)
            };
            rpc::server::run_stdio(build_router(&paths, &cfg, ephemeral))
                .await
                .context("keyring server failed")
        }
        Command::Paths => print_json(&serde_json::json!({
            "config_dir": paths.config_dir,
            "data_dir": paths.data_dir,
            "log_file": paths.log_file,
            "state_file": paths.state_file(),
        })),
        Command::Accounts { cmd } => {
            let _lock = paths.acquire_state_lock()?;
            let router = build_router(&paths, &cfg, false);
            run_accounts(KeyringClient::new(&router), cmd)
                .await
                .context("accounts command failed")
        }
        Command::Requests { cmd } => {
            let _lock = paths.acquire_state_lock()?;
            let router = build_router(&paths, &cfg, false);
            run_requests(KeyringClient::new(&router), cmd)
                .await
                .context("requests command failed")
        }
    }
}
