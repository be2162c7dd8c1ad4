pub mod cli;
pub mod commands;
pub mod config;
pub mod db;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::commands::App;
use crate::config::AppConfig;
use crate::db::SqliteRepository;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries the JSON result, so logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().with_db_path(cli.db);

    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create data dir failed: {}", parent.display()))?;
    }

    tracing::debug!(db = %config.db_path.display(), "opening collection");
    let repo = SqliteRepository::open(&config.db_path)
        .with_context(|| format!("open collection failed: {}", config.db_path.display()))?;
    let app = App::new(repo, config)?;

    let output = commands::dispatch(cli.cmd, app).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
