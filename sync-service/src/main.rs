//! `promptsync` command-line entry point.
//!
//! Every command prints one `ServiceResponse` JSON line on stdout and exits
//! with status 1 when `success` is false. Logs go to stderr and honor
//! `RUST_LOG`.

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use promptsync_backend_client::{GitLabClient, GitLabConfig, RemoteRepository};
use promptsync_core::{ChangeNotifier, JsonFileStore, LocalStore, StateStore};
use promptsync_keyring_store::{KeyringTokenStore, TokenStore};
use promptsync_service::{
    AppConfig, CloudSyncService, ConfigLoader, RemoteTarget, RemovedCategory, ServiceResponse,
    SyncError,
};
use serde::Serialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "promptsync", version, about = "Sync saved prompts with a shared GitLab document")]
struct Cli {
    /// Config file; defaults to the first of ./promptsync.toml,
    /// ~/.config/promptsync/config.toml and ~/.promptsync.toml.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the API token in the OS keyring.
    Login {
        /// Token value; read from stdin when omitted.
        #[arg(long)]
        token: Option<String>,
    },
    /// Forget the stored API token.
    Logout,
    /// Pull the remote document into the cloud cache.
    Sync {
        /// Only pull these categories. Pulls everything when omitted.
        #[arg(long = "category", value_name = "CATEGORY")]
        categories: Vec<String>,
    },
    /// List the categories of the remote document.
    Categories,
    /// Drop a category from the cloud cache. The remote is not changed.
    RemoveCategory { category: String },
    /// Open a merge request with the local prompts of the given categories.
    Push {
        #[arg(long = "category", value_name = "CATEGORY", required = true)]
        categories: Vec<String>,
    },
    /// Copy cached cloud prompts into the local collection.
    Import {
        #[arg(long = "category", value_name = "CATEGORY")]
        categories: Vec<String>,
    },
    /// Print local prompts, or cached cloud prompts with `--cloud`.
    List {
        #[arg(long)]
        cloud: bool,
    },
}

struct App {
    service: CloudSyncService,
    state: Arc<dyn StateStore>,
    notifier: ChangeNotifier,
}

impl App {
    fn build(config: &AppConfig) -> Result<Self, SyncError> {
        let data_dir = config.storage.resolve_data_dir()?;
        tracing::debug!(dir = %data_dir.display(), "opening state store");
        let state: Arc<dyn StateStore> = Arc::new(JsonFileStore::open(data_dir)?);

        let remote = GitLabClient::new(GitLabConfig {
            api_url: config.remote.api_url.clone(),
            project_id: config.remote.project_id.clone(),
            timeout: config.remote.timeout(),
        })?;
        let remote: Arc<dyn RemoteRepository> = Arc::new(remote);
        let tokens: Arc<dyn TokenStore> = Arc::new(KeyringTokenStore::default());

        let notifier = ChangeNotifier::new();
        let service = CloudSyncService::new(
            remote,
            tokens,
            RemoteTarget::from(&config.remote),
            Arc::clone(&state),
            notifier.clone(),
        )?;
        Ok(Self {
            service,
            state,
            notifier,
        })
    }

    fn local(&self) -> Result<LocalStore, SyncError> {
        Ok(LocalStore::open(Arc::clone(&self.state), self.notifier.clone())?)
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, SyncError> {
    let config = match path {
        Some(path) => ConfigLoader::new().with_file(path).load()?,
        None => ConfigLoader::load_default()?,
    };
    Ok(config)
}

/// Token from `--token`, or the first line of `input` when the flag is absent.
fn resolve_token(arg: Option<String>, mut input: impl BufRead) -> Result<String, SyncError> {
    let token = match arg {
        Some(token) => token,
        None => {
            let mut line = String::new();
            input.read_line(&mut line)?;
            line
        }
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(SyncError::InvalidInput("token must not be empty".to_string()));
    }
    Ok(token.to_string())
}

async fn dispatch(app: &App, command: Command) -> Result<serde_json::Value, SyncError> {
    match command {
        Command::Login { token } => {
            let token = resolve_token(token, std::io::stdin().lock())?;
            app.service.set_token(&token)?;
            Ok(json!({ "authenticated": true }))
        }
        Command::Logout => {
            app.service.clear_token()?;
            Ok(json!({ "authenticated": false }))
        }
        Command::Sync { categories } => {
            let report = if categories.is_empty() {
                app.service.sync_all().await?
            } else {
                app.service.sync_selected(&categories).await?
            };
            to_value(&report)
        }
        Command::Categories => to_value(&app.service.remote_categories().await?),
        Command::RemoveCategory { category } => {
            let removed_prompts = app.service.remove_category(&category).await?;
            to_value(&RemovedCategory {
                category,
                removed_prompts,
            })
        }
        Command::Push { categories } => {
            let prompts = app.local()?.prompts_in(&categories);
            to_value(&app.service.push(prompts, &categories).await?)
        }
        Command::Import { categories } => {
            let cloud: Vec<_> = app
                .service
                .cloud_prompts()
                .await
                .into_iter()
                .filter(|p| categories.is_empty() || categories.contains(&p.category_id))
                .collect();
            let imported = app.local()?.import_prompts(cloud)?;
            Ok(json!({ "importedPrompts": imported.len() }))
        }
        Command::List { cloud } => {
            if cloud {
                to_value(&app.service.cloud_prompts().await)
            } else {
                to_value(&app.local()?.prompts())
            }
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, SyncError> {
    Ok(serde_json::to_value(value)?)
}

async fn run(cli: Cli) -> Result<serde_json::Value, SyncError> {
    let config = load_config(cli.config.as_ref())?;
    let app = App::build(&config)?;
    dispatch(&app, cli.command).await
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("promptsync v{}", env!("CARGO_PKG_VERSION"));

    let result = run(cli).await;
    if let Err(err) = &result {
        tracing::warn!(error = %err, "command failed");
    }
    let response = ServiceResponse::from(result);
    let success = response.success;
    let line = serde_json::to_string(&response).context("serializing response")?;

    #[allow(clippy::print_stdout)]
    {
        println!("{line}");
    }
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
