//! Standalone service runner: CLI parsing, component wiring, and graceful
//! shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::catalog::Catalog;
use crate::config::BehaviorConfig;
use crate::dispatch::Dispatcher;
use crate::http::{self, AppState};
use crate::profile::{MemoryProfileStore, PgProfileStore, ProfileStore};
use crate::selector::OpenAiSelector;
use crate::transport::{AdbTransport, BrokerTransport, DeviceTransport};
use crate::vision::TesseractRecognizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportMode {
    /// Point-to-point adb link to the device.
    Direct,
    /// Session-oriented RPC via the device broker.
    Broker,
}

#[derive(Debug, Parser, Clone)]
#[command(author, version, about = "Natural-language control plane for Android TV", long_about = None)]
pub struct Cli {
    /// HTTP listen port
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// OpenAI-compatible chat-completions endpoint for the tool selector
    #[arg(long, env = "LLM_BASE_URL", default_value = "http://127.0.0.1:4000/v1")]
    pub llm_base_url: String,

    /// API key for the selector endpoint
    #[arg(long, env = "LLM_API_KEY", default_value = "")]
    pub llm_api_key: String,

    /// Model used for capability selection
    #[arg(long, env = "LLM_MODEL", default_value = "llama-3.1-70b-instruct")]
    pub llm_model: String,

    /// Which transport reaches the device
    #[arg(long, env = "TV_TRANSPORT", value_enum, default_value_t = TransportMode::Direct)]
    pub transport: TransportMode,

    /// Device address for the direct transport (ip:port)
    #[arg(long, env = "TV_DEVICE_ADDR", default_value = "192.168.0.64:5555")]
    pub device_addr: String,

    /// adb binary used by the direct transport
    #[arg(long, env = "ADB_PATH", default_value = "adb")]
    pub adb_path: String,

    /// Broker endpoint for the broker transport
    #[arg(long, env = "TV_BROKER_URL", default_value = "http://127.0.0.1:8765/mcp")]
    pub broker_url: String,

    /// PostgreSQL connection string for the profile store; omitted means an
    /// in-memory store
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Optional TOML file overriding timings, navigation geometry, and
    /// recognizer filters
    #[arg(long, env = "TV_BEHAVIOR_CONFIG")]
    pub behavior_config: Option<PathBuf>,
}

pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let behavior = match &cli.behavior_config {
        Some(path) => {
            let config = BehaviorConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            info!(path = %path.display(), "behavior config loaded");
            config
        }
        None => BehaviorConfig::default(),
    };
    let behavior = Arc::new(behavior);

    let transport: Arc<dyn DeviceTransport> = match cli.transport {
        TransportMode::Direct => Arc::new(AdbTransport::new(
            &cli.adb_path,
            &cli.device_addr,
            &behavior.timing,
        )),
        TransportMode::Broker => Arc::new(BrokerTransport::new(&cli.broker_url, &behavior.timing)),
    };
    info!(transport = transport.label(), "device transport ready");

    // The device may be offline at startup; the transport reconnects lazily
    // before each dispatch cycle.
    if let Err(err) = transport.ensure_ready().await {
        warn!(error = %err, "device not reachable yet, continuing");
    }

    let selector = Arc::new(OpenAiSelector::new(
        &cli.llm_base_url,
        &cli.llm_api_key,
        &cli.llm_model,
    ));
    let recognizer = Arc::new(TesseractRecognizer::new(behavior.recognizer.clone()));

    let profiles: Arc<dyn ProfileStore> = match &cli.database_url {
        Some(url) => match build_pg_store(url).await {
            Ok(store) => {
                info!("profile store connected");
                Arc::new(store)
            }
            Err(err) => {
                warn!(error = %err, "profile store unavailable, using in-memory store");
                Arc::new(MemoryProfileStore::new())
            }
        },
        None => {
            info!("no DATABASE_URL configured, using in-memory profile store");
            Arc::new(MemoryProfileStore::new())
        }
    };

    let catalog = Arc::new(Catalog::standard());
    info!(tools = catalog.list().len(), model = %cli.llm_model, "capability catalog built");

    let dispatcher = Dispatcher::new(
        catalog,
        transport,
        selector,
        Some(recognizer),
        Arc::clone(&behavior),
    );

    let state = Arc::new(AppState {
        dispatcher,
        profiles,
    });
    let app = http::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    Ok(())
}

async fn build_pg_store(database_url: &str) -> Result<PgProfileStore> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .context("failed to parse DATABASE_URL")?;
    let manager = Manager::from_config(
        pg_config,
        tokio_postgres::NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(manager)
        .max_size(8)
        .build()
        .context("failed to build postgres connection pool")?;
    Ok(PgProfileStore::new(pool).await?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
