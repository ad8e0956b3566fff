//! StaffSec API server binary.
//!
//! `staffsec_server create` prepares the database (migrations, default
//! roles and groups, the superadmin account); `staffsec_server start`
//! serves the HTTP API.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use staffsec_api::config::ApiConfig;
use staffsec_core::bootstrap;
use staffsec_core::revocation::RevocationCache;
use staffsec_core::revocation::memory::MemoryRevocationCache;
use staffsec_core::revocation::redis_cache::RedisRevocationCache;
use staffsec_core::store::postgres::PgCredentialStore;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "staffsec_server", about = "StaffSec API server")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", global = true)]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Serve the HTTP API (default).
    #[default]
    Start,
    /// Apply migrations and seed roles, groups and the superadmin.
    Create,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,staffsec_api=debug,staffsec_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    info!(max_connections = args.max_connections, "configuring connection pool");
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    match args.command.unwrap_or_default() {
        Command::Create => create(pool, &config).await,
        Command::Start => start(pool, config).await,
    }
}

async fn create(pool: PgPool, config: &ApiConfig) -> Result<(), Box<dyn std::error::Error>> {
    bootstrap::run_migrations(&pool).await?;
    let store = PgCredentialStore::new(pool);
    let report = bootstrap::seed(&store, &config.default_password).await?;
    if report.superadmin_created {
        warn!(
            user = bootstrap::SUPERADMIN,
            "superadmin created with the default password; change it after first login"
        );
    }
    info!("database ready");
    Ok(())
}

async fn start(pool: PgPool, config: ApiConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("running database migrations");
    bootstrap::run_migrations(&pool).await?;

    let cache: Arc<dyn RevocationCache> = match &config.redis {
        Some(settings) => Arc::new(RedisRevocationCache::connect(settings).await?),
        None => {
            warn!("REDIS_HOST not set; revoked tokens are kept in process memory");
            let cache = Arc::new(MemoryRevocationCache::new());
            cache.spawn_cleanup_task();
            cache
        }
    };

    let store = Arc::new(PgCredentialStore::new(pool));
    let bind_addr = config.bind_addr.clone();
    let state = staffsec_api::AppState::new(config, store, cache);
    let app = staffsec_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
