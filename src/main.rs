use std::path::PathBuf;

use anyhow::Context;
use axum::extract::FromRef;
use clap::{Parser, Subcommand};

mod commands {
    pub mod serve;
    pub mod show_diff;
    pub mod show_tree;
}
mod config;
mod controllers {
    pub mod paste;
}
mod db;
mod diff;
mod error;
mod hashing;
mod identifier;
mod models;
mod storage;
mod store;
mod tree;
mod types;

use config::Config;
use db::Database;
pub(crate) use error::{AppError, AppResult};
use identifier::IdentifierCodec;
use storage::FileStorage;
use store::PasteStore;

#[derive(Clone, FromRef)]
pub struct App {
    pub config: Config,
    pub store: PasteStore,
    pub storage: FileStorage,
}

impl App {
    pub async fn load(config: Config) -> anyhow::Result<Self> {
        let database = Database::connect(&config.database.url)
            .await
            .context("failed to connect to database")?;
        let storage = FileStorage::new(&config.storage.dir)
            .await
            .context("failed to open attachment storage")?;
        let store = PasteStore::new(database, IdentifierCodec::new(config.identifiers.secret));

        Ok(App {
            config,
            store,
            storage,
        })
    }
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web service.
    Serve,
    /// Print the unified diff between two pastes.
    Diff { old: String, new: String },
    /// Print the revision tree containing a paste.
    Tree { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    let app = App::load(config).await?;

    match cli.command {
        Command::Serve => commands::serve::run(app).await,
        Command::Diff { old, new } => commands::show_diff::run(app, &old, &new).await,
        Command::Tree { id } => commands::show_tree::run(app, &id).await,
    }
}

#[cfg(test)]
pub(crate) async fn test_app() -> (App, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config: Config = toml::from_str(
        r#"
        base_url = "http://localhost:8080"
        port = 8080

        [database]
        url = "sqlite::memory:"

        [storage]
        dir = "unused"

        [identifiers]
        secret = 8675309

        [fingerprint]
        secret = "test"

        [attachments]
        enabled = true
        allowed_extensions = ["txt", "png"]
        "#,
    )
    .unwrap();

    let database = Database::in_memory().await.unwrap();
    let storage = FileStorage::new(dir.path()).await.unwrap();
    let store = PasteStore::new(database, IdentifierCodec::new(config.identifiers.secret));

    (
        App {
            config,
            store,
            storage,
        },
        dir,
    )
}
