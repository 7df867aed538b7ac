mod auth;
mod check;
mod maintenance;
mod notify;
mod orchestrator;
mod problem;
mod profile;
mod router;
mod selector;
mod telemetry;
#[cfg(test)]
mod test_support;
mod watchlist;

use std::{net::SocketAddr, sync::Arc};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use domain_watch_core::ports::NotificationDispatcher;
use domain_watch_remote::{MailClient, WhoisClient};
use domain_watch_storage::Database;
use domain_watch_util::{load_env_file, AppConfig};

use crate::maintenance::MaintenanceWorker;
use crate::notify::{LogOnlyDispatcher, NotificationTrigger};
use crate::orchestrator::{CheckOrchestrator, CycleBudget, CycleSettings};
use crate::selector::CheckTarget;

#[derive(Debug, Parser)]
#[command(name = "domain-watch", version, about = "Watches domains and reports when they become available")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and the maintenance worker (default).
    Serve,
    /// Run a single check cycle and print the report as JSON.
    Check {
        /// Check only this domain name.
        #[arg(long)]
        domain: Option<String>,
        /// Maximum number of domains to check.
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    let orchestrator = build_orchestrator(&config, database.clone())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, database, orchestrator).await,
        Command::Check { domain, limit } => {
            let target = CheckTarget::from_request(domain.as_deref(), limit)?;
            let report = orchestrator.run(&target).await?;
            let response = check::CheckResponse::from(report);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

async fn serve(
    config: AppConfig,
    database: Database,
    orchestrator: CheckOrchestrator,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = telemetry::init_metrics()?;

    if config.service_token.is_none() {
        warn!(stage = "app", "SERVICE_TOKEN not set; check trigger is unauthenticated");
    }
    if config.auth_jwt_secret.is_none() {
        warn!(stage = "app", "AUTH_JWT_SECRET not set; watchlist API is disabled");
    }

    MaintenanceWorker::new(database.clone(), config.history_retention_days).spawn();

    let state = router::AppState::new(
        metrics,
        database,
        orchestrator,
        config.auth_jwt_secret.as_deref(),
        config.service_token.clone(),
    );

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}

fn build_orchestrator(
    config: &AppConfig,
    database: Database,
) -> Result<CheckOrchestrator, Box<dyn std::error::Error>> {
    let prober = WhoisClient::with_timeout(config.whois_api_url.clone(), config.probe_timeout)?;

    let dispatcher: Arc<dyn NotificationDispatcher> = match &config.mail {
        Some(mail) => {
            let http = reqwest::Client::builder()
                .timeout(config.probe_timeout)
                .build()?;
            Arc::new(MailClient::new(
                mail.endpoint.clone(),
                mail.api_key.clone(),
                mail.from.clone(),
                http,
            ))
        }
        None => {
            info!(stage = "notify", "MAIL_API_URL not set; notifications will be logged only");
            Arc::new(LogOnlyDispatcher)
        }
    };

    let settings = CycleSettings {
        probe_timeout: config.probe_timeout,
        default_limit: config.check_batch_limit,
        max_concurrency: config.check_max_concurrency,
        budget: CycleBudget {
            max_duration: config.check_cycle_budget,
            max_probes: None,
        },
    };

    Ok(CheckOrchestrator::new(
        database.clone(),
        Arc::new(prober),
        NotificationTrigger::new(database, dispatcher),
        settings,
    ))
}
