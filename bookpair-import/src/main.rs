//! bookpair-import - main entry point
//!
//! Subcommands:
//! - `serve` - HTTP API (`POST /import/book-pair`, `GET /health`)
//! - `import` - one book-pair import from the command line, summary as JSON
//! - `init-config` - write a config file with every default spelled out

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookpair_common::config::find_config_file;
use bookpair_import::align::AlignMode;
use bookpair_import::config::ImportConfig;
use bookpair_import::extract::Granularity;
use bookpair_import::import::{ImportOrchestrator, ImportRequest, DEFAULT_MIN_QUALITY};
use bookpair_import::{build_router, db, AppState};

/// Command-line arguments for bookpair-import
#[derive(Parser, Debug)]
#[command(name = "bookpair-import")]
#[command(about = "Build a translation-memory inbox from two editions of a book")]
#[command(version)]
struct Args {
    /// Config file (otherwise BOOKPAIR_CONFIG, ./bookpair.toml, user and system config dirs)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, global = true, env = "BOOKPAIR_DB")]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(short, long, env = "BOOKPAIR_BIND")]
        bind: Option<SocketAddr>,
    },

    /// Import one book pair and print the summary
    Import {
        /// Source-language EPUB
        src: PathBuf,
        /// Target-language EPUB
        tgt: PathBuf,
        #[arg(long, default_value = "paragraph")]
        granularity: Granularity,
        #[arg(long, default_value = "positional")]
        mode: AlignMode,
        #[arg(long, default_value = "en")]
        src_lang: String,
        #[arg(long, default_value = "pt")]
        tgt_lang: String,
        #[arg(long, default_value_t = DEFAULT_MIN_QUALITY)]
        min_quality: f64,
        #[arg(long)]
        series_id: Option<i64>,
        #[arg(long)]
        book_id: Option<i64>,
        #[arg(long)]
        source_tag: Option<String>,
    },

    /// Write a default config file
    InitConfig {
        /// Destination file
        #[arg(default_value = "bookpair.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig { path, force } = &args.command {
        return init_config(path, *force);
    }

    let config = ImportConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging.level);

    match find_config_file(args.config.as_deref()) {
        Ok(Some(path)) => info!("Config file: {}", path.display()),
        _ => info!("No config file found, using defaults"),
    }

    let db_path = config.database_path(args.database.as_deref());
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to initialize database")?;

    let config = Arc::new(config);
    let orchestrator = Arc::new(
        ImportOrchestrator::from_config(pool.clone(), Arc::clone(&config))
            .context("Failed to build oracle clients")?,
    );

    match args.command {
        Command::Serve { bind } => serve(pool, config, orchestrator, bind).await,
        Command::Import {
            src,
            tgt,
            granularity,
            mode,
            src_lang,
            tgt_lang,
            min_quality,
            series_id,
            book_id,
            source_tag,
        } => {
            let request = ImportRequest {
                src_path: src,
                tgt_path: tgt,
                granularity,
                mode,
                src_lang,
                tgt_lang,
                min_quality,
                series_id,
                book_id,
                source_tag,
            };
            let summary = orchestrator
                .import_book_pair(&request)
                .await
                .context("Import failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::InitConfig { .. } => unreachable!("handled before configuration load"),
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("bookpair_import={0},bookpair_common={0},tower_http=info", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let contents = ImportConfig::default_toml()?;
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn serve(
    pool: sqlx::SqlitePool,
    config: Arc<ImportConfig>,
    orchestrator: Arc<ImportOrchestrator>,
    bind: Option<SocketAddr>,
) -> Result<()> {
    let addr = match bind {
        Some(addr) => addr,
        None => config
            .server
            .bind
            .parse()
            .with_context(|| format!("Invalid server.bind '{}'", config.server.bind))?,
    };

    let app = build_router(AppState::new(pool, config, orchestrator));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
