//! lifehub-server - personal management REST API
//!
//! Resolves the root folder, opens (or creates) the SQLite database and
//! serves the HTTP API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use lifehub_common::api::auth::load_jwt_secret;
use lifehub_common::config::{self, TomlConfig, ROOT_ENV_VAR};
use lifehub_common::db::init_database;
use lifehub_server::db::users;
use lifehub_server::{build_router, AppState};
use tracing::{error, info, warn};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "lifehub-server", version, about = "Personal management REST API")]
struct Args {
    /// Root folder holding the database and media files
    #[arg(long)]
    root_folder: Option<String>,

    /// Path to config.toml
    #[arg(long, env = "LIFEHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(long, env = "LIFEHUB_HOST")]
    host: Option<String>,

    /// Listen port (overrides config)
    #[arg(long, env = "LIFEHUB_PORT")]
    port: Option<u16>,

    /// Include internal error details in error responses
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately, before database delays
    info!(
        "Starting LifeHub server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let mut toml_config = TomlConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        toml_config.server.host = host;
    }
    if let Some(port) = args.port {
        toml_config.server.port = port;
    }
    if args.debug {
        toml_config.server.debug = true;
    }
    if toml_config.server.debug {
        warn!("Debug mode: internal error details are included in responses");
    }

    // CLI flag, then LIFEHUB_ROOT, then config file, then OS default
    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), ROOT_ENV_VAR, Some(&toml_config));
    config::ensure_root_folder(&root_folder)?;

    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    let jwt_secret = load_jwt_secret(&pool).await?;
    info!("✓ Loaded token signing secret");

    let addr = format!("{}:{}", toml_config.server.host, toml_config.server.port);
    let state = AppState::new(pool, toml_config, &jwt_secret, root_folder.join("media"))?;

    // Periodic cleanup of expired cache entries, idle rate-limit state and
    // blacklisted refresh tokens past their expiry
    let housekeeping = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            housekeeping.cache.purge_expired().await;
            housekeeping.limiter.purge();
            match users::purge_revoked(&housekeeping.db).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired revoked tokens", n),
                Err(e) => warn!("Revoked token purge failed: {}", e),
            }
        }
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("lifehub-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
