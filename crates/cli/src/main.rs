//! vigil: job scheduling daemon with an idempotent execution ledger.

mod heartbeat;

use std::sync::Arc;

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    tokio::net::TcpListener,
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use {
    vigil_config::{VigilConfig, discover_and_load},
    vigil_gateway::{AppState, build_app, lifecycle},
    vigil_ledger::{TaskRunStore, store_sqlite::SqliteTaskRunStore},
    vigil_scheduler::JobRegistry,
};

#[derive(Parser)]
#[command(name = "vigil", version, about = "Job scheduler with an idempotent execution ledger")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler daemon and status API (the default).
    Serve,
    /// Print recent ledger rows, latest first.
    Tasks {
        /// Filter by job name.
        #[arg(long)]
        name: Option<String>,
        /// Max rows to print.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_telemetry() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("VIGIL_LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry();

    let cli = Cli::parse();
    let config = discover_and_load();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Tasks { name, limit } => tasks(&config, name.as_deref(), limit).await,
    }
}

async fn serve(config: VigilConfig) -> Result<()> {
    let registry = JobRegistry::compose([heartbeat::job_set(&config.heartbeat)])?;
    let runtime = lifecycle::on_startup(&config, registry).await?;

    let app = build_app(AppState {
        engine: Arc::clone(&runtime.engine),
        ledger: Arc::clone(&runtime.ledger),
    });

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lifecycle::on_shutdown(&runtime).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
        return;
    }
    info!("shutdown signal received");
}

/// Operator view of the ledger: spot stuck `processing` rows and read
/// failure text without opening the database.
async fn tasks(config: &VigilConfig, name: Option<&str>, limit: usize) -> Result<()> {
    let store = SqliteTaskRunStore::new(&config.database.url).await?;
    let runs = store.list(name, limit).await?;

    if runs.is_empty() {
        println!("no task runs");
        return Ok(());
    }

    for run in runs {
        println!(
            "{:<10} {:<28} {:<24} {}",
            run.status.as_str(),
            run.name,
            run.idempotency_key,
            run.last_error.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
