mod auth;
mod cli;
mod error;
mod handlers;
mod routes;
mod services;
mod settings;
mod utils;
mod validation;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::TokenSigner;
use services::geo_service::{GeoLookup, GeoService};
use services::license_service::LicenseService;
use services::rate_limit_service::{RateGate, RedisRateLimiter};
use services::validation_service::ValidationService;
use services::validation_store::PgValidationStore;
use settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub validator: ValidationService,
    pub licenses: LicenseService,
    pub gate: Arc<dyn RateGate>,
    pub signer: TokenSigner,
    /// Peers whose forwarding headers name the real caller.
    pub trusted_proxies: Arc<[IpAddr]>,
}

#[derive(Parser)]
#[command(name = "keygate")]
#[command(about = "Keygate license validation server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Administrative tools
    Admin {
        #[command(subcommand)]
        subcommand: AdminCommands,
    },
    /// Offline license helpers
    License {
        #[command(subcommand)]
        subcommand: LicenseCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Mint a bearer token for the admin API
    Token {
        #[arg(long, default_value = "admin")]
        subject: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Show panel connection information
    Info,
}

#[derive(Subcommand)]
enum LicenseCommands {
    /// Print freshly generated license keys
    GenerateKey {
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Compute the device fingerprint a client would be bound to
    Fingerprint {
        #[arg(long)]
        hardware_hash: String,
        #[arg(long = "mac")]
        mac_addresses: Vec<String>,
        #[arg(long, default_value = "")]
        computer_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let cli = Cli::parse();

    let file_appender = tracing_appender::rolling::never(".", "keygate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keygate=debug,axum=info,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    match cli.command {
        Commands::Serve => {
            let settings = Settings::load()?;
            run_server(settings).await?;
        }
        Commands::Admin { subcommand } => {
            let settings = Settings::load()?;
            match subcommand {
                AdminCommands::Token { subject, hours } => {
                    cli::issue_admin_token(&settings, &subject, hours)?;
                }
                AdminCommands::Info => cli::print_info(&settings),
            }
        }
        Commands::License { subcommand } => match subcommand {
            LicenseCommands::GenerateKey { count } => cli::generate_keys(count),
            LicenseCommands::Fingerprint {
                hardware_hash,
                mac_addresses,
                computer_name,
            } => cli::print_fingerprint(&hardware_hash, &mac_addresses, &computer_name),
        },
    }

    Ok(())
}

async fn run_server(settings: Settings) -> Result<()> {
    tracing::info!("Keygate v{} starting", env!("CARGO_PKG_VERSION"));

    let pool = keygate_db::db::init_db(&settings.database_url, settings.db_max_connections).await?;
    tracing::info!("Database initialized");

    let gate: Arc<dyn RateGate> = Arc::new(
        RedisRateLimiter::connect(&settings.redis_url, settings.rate_limit.clone()).await?,
    );
    let geo: Arc<dyn GeoLookup> = Arc::new(GeoService::new(settings.geoip_db_path.as_deref()));
    let validator = ValidationService::new(
        Arc::new(PgValidationStore::new(pool.clone())),
        gate.clone(),
        geo,
        settings.validation.clone(),
    );

    let state = AppState {
        pool: pool.clone(),
        validator,
        licenses: LicenseService::new(pool),
        gate,
        signer: TokenSigner::new(&settings.admin_jwt_secret),
        trusted_proxies: settings.trusted_proxies.clone().into(),
    };

    let app = routes::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.listen_port));
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
