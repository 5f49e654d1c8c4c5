//! `fresh-container server`

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{self, Config, DEFAULT_BIND_ADDRESS, DEFAULT_PORT};
use crate::server::{self as http, shutdown_signal};
use crate::version::cache::Cache;
use crate::version::registries::DockerRegistry;

const IN_MEMORY_DB: &str = ":memory:";

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "FRESH_CONTAINER_SERVER_PORT")]
    pub port: u16,

    #[arg(long, default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: String,

    /// Cache database file, or ":memory:" for a throwaway cache
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
}

pub async fn run(args: &ServerArgs, config: Config) -> anyhow::Result<ExitCode> {
    let db_path = args.db.clone().unwrap_or_else(config::db_path);
    let cache = open_cache(&db_path, &config)?;
    let registry = DockerRegistry::new(config.clone())?;

    let listener = TcpListener::bind((args.bind.as_str(), args.port))
        .await
        .with_context(|| format!("cannot bind {}:{}", args.bind, args.port))?;
    info!("Starting server on port {}", args.port);

    http::run(
        listener,
        &config,
        Arc::new(cache),
        Arc::new(registry),
        shutdown_signal(),
    )
    .await?;

    Ok(ExitCode::SUCCESS)
}

fn open_cache(db_path: &Path, config: &Config) -> anyhow::Result<Cache> {
    if db_path == Path::new(IN_MEMORY_DB) {
        return Ok(Cache::in_memory(config.cache_ttl())?);
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create data directory {:?}", parent))?;
    }

    Cache::new(db_path, config.cache_ttl())
        .with_context(|| format!("cannot open cache database {:?}", db_path))
}
