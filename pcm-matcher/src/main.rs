//! pcm-matcher - Pharmacy chain abbreviation matcher
//!
//! `serve` runs the HTTP service; `batch` matches a JSON row file offline
//! against the same database.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pcm_common::config::TomlConfig;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcm_matcher::models::{BatchItem, BatchSummary, MatchRow};
use pcm_matcher::services::{LlmResolver, Resolver};
use pcm_matcher::AppState;

/// Command-line arguments for pcm-matcher
#[derive(Parser, Debug)]
#[command(name = "pcm-matcher")]
#[command(about = "Match pharmacy chain full names to province-scoped abbreviations")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "PCM_PORT")]
        port: Option<u16>,
    },
    /// Match a JSON list of {full_name, province} rows
    Batch {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Province for rows that have none
        #[arg(long)]
        province: Option<String>,

        /// Skip confirmed mappings and history examples
        #[arg(long)]
        no_history: bool,
    },
}

#[derive(Serialize)]
struct BatchOutput {
    batch_id: String,
    rows: Vec<MatchRow>,
    summary: BatchSummary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(pcm_common::config::default_config_path);
    let config = pcm_common::config::load_toml_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    init_tracing(&config, args.verbose)?;

    info!(
        "Starting pcm-matcher v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config: {}", config_path.display());

    let root_folder = pcm_common::config::resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = pcm_common::config::database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db_pool = pcm_matcher::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let resolver = build_resolver(&db_pool, &config).await;

    match args.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let state = AppState::new(db_pool, config, config_path, resolver);
            serve(state, port).await
        }
        Command::Batch {
            input,
            output,
            province,
            no_history,
        } => {
            let state = AppState::new(db_pool, config, config_path, resolver);
            run_batch(&state, &input, &output, province.as_deref(), !no_history).await
        }
    }
}

fn init_tracing(config: &TomlConfig, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("pcm_matcher={0},pcm_common={0},tower_http={0}", default_level).into()
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Resolver from the configured API key; `None` leaves only memo matches
async fn build_resolver(db: &sqlx::SqlitePool, config: &TomlConfig) -> Option<Arc<dyn Resolver>> {
    let key = match pcm_matcher::config::resolve_resolver_api_key(db, config).await {
        Ok((key, _source)) => key,
        Err(e) => {
            warn!("{}", e);
            return None;
        }
    };

    match LlmResolver::new(key, &config.resolver) {
        Ok(resolver) => {
            info!(model = %config.resolver.model, endpoint = resolver.endpoint(), "Resolver ready");
            Some(Arc::new(resolver))
        }
        Err(e) => {
            warn!("Resolver unavailable: {}", e);
            None
        }
    }
}

async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = pcm_matcher::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn run_batch(
    state: &AppState,
    input: &Path,
    output: &Path,
    default_province: Option<&str>,
    use_history: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut items: Vec<BatchItem> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as a JSON row list", input.display()))?;

    // Export files are usually named after their province, e.g. 客户名单【四川】.json
    let default_province = default_province.or_else(|| {
        input
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(pcm_common::province::extract_province)
    });
    if let Some(province) = default_province {
        if !pcm_common::province::is_valid_province(province) {
            warn!(province, "Default province is not a known province");
        }
    }

    for item in &mut items {
        let province = item
            .province
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or(default_province);
        item.province = province.map(|p| pcm_common::province::normalize_province(p).unwrap_or(p).to_string());
    }

    info!(rows = items.len(), input = %input.display(), "Batch started");

    let outcomes = state.matcher.batch_match(&items, use_history).await?;
    let result = BatchOutput {
        batch_id: uuid::Uuid::new_v4().to_string(),
        rows: outcomes.iter().map(MatchRow::from).collect(),
        summary: BatchSummary::from_outcomes(&outcomes),
    };

    std::fs::write(output, serde_json::to_string_pretty(&result)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        batch_id = %result.batch_id,
        matched = result.summary.matched,
        empty = result.summary.empty,
        output = %output.display(),
        "Batch written"
    );

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
