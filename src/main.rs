use clap::{Args, Parser, Subcommand};
use delivery_eligibility::config::AppConfig;
use delivery_eligibility::error::AppError;
use delivery_eligibility::server::{self, AppState};
use delivery_eligibility::telemetry;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Delivery eligibility engine
///
/// Decides whether a free-text address is served by a tenant, at what fee
/// and in how long. Runs as an HTTP service or answers one-off queries.
///
/// Examples:
///   eligibility serve --port 8080
///   eligibility validate "Rua Augusta, 1500" --tenant 6f1c1a44-6bd7-4d7b-9d2f-2a4f5c9a8e10
///   eligibility cache stats --tenant 6f1c1a44-6bd7-4d7b-9d2f-2a4f5c9a8e10 --days 7
///   eligibility cache cleanup --ttl-days 30
#[derive(Parser, Debug)]
#[command(name = "eligibility", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Validate one address for a tenant
    Validate(ValidateArgs),
    /// Address cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Free-text address, e.g. "Rua Augusta, 1500 - Consolação"
    address: String,
    /// Tenant id
    #[arg(long)]
    tenant: Uuid,
    /// Order total, checked against the free-delivery threshold
    #[arg(long)]
    order_total: Option<Decimal>,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Show cache statistics for a tenant
    Stats {
        #[arg(long)]
        tenant: Uuid,
        /// Only count entries validated in the last N days
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Delete entries older than the TTL, for one tenant or all of them
    Cleanup {
        #[arg(long)]
        tenant: Option<Uuid>,
        /// Defaults to the configured cache TTL
        #[arg(long)]
        ttl_days: Option<u32>,
    },
    /// Forget the cached answer for one address
    Invalidate {
        address: String,
        #[arg(long)]
        tenant: Uuid,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{out}");
    Ok(())
}

async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));
    let state = Arc::new(AppState::from_config(&config));

    match command {
        Command::Serve(args) => {
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            server::start(config.server.socket_addr()?, config.environment, state).await
        }
        Command::Validate(args) => {
            let result = state
                .coordinator
                .validate_address(&args.address, args.tenant, args.order_total)
                .await?;
            print_json(&result)
        }
        Command::Cache { command } => match command {
            CacheCommand::Stats { tenant, days } => {
                print_json(&state.coordinator.cache_statistics(tenant, days).await?)
            }
            CacheCommand::Cleanup { tenant, ttl_days } => {
                let ttl_days = ttl_days.unwrap_or(config.cache.ttl_days);
                let deleted = state.coordinator.cache_cleanup(tenant, ttl_days).await?;
                print_json(&serde_json::json!({ "deleted": deleted }))
            }
            CacheCommand::Invalidate { address, tenant } => {
                let invalidated = state.coordinator.invalidate(&address, tenant).await?;
                print_json(&serde_json::json!({ "invalidated": invalidated }))
            }
        },
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
