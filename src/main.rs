use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use crosslist::account_manager::AccountManager;
use crosslist::config::AppConfig;
use crosslist::db;
use crosslist::models::ExecutionKind;
use crosslist::orchestrator::RegistrationOrchestrator;
use crosslist::paths::{BrowserAutomationPath, DirectApiPath, DriverPool, ExecutionPath};
use crosslist::platforms::PlatformRegistry;
use crosslist::sweeper::RetrySweeper;
use crosslist::templates::TemplateStore;
use crosslist::token_manager::TokenManager;
use crosslist::utils::crypto::SecretCipher;

#[derive(Parser, Debug)]
#[command(name = "crosslist", about = "Marketplace cross-listing service")]
struct Cli {
    /// Run a single retry sweep and exit instead of starting the service.
    #[arg(long)]
    sweep_once: bool,

    /// Apply database migrations and exit.
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crosslist=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    info!("Starting crosslist...");

    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    if cli.migrate_only {
        info!("migrations applied, exiting");
        return Ok(());
    }

    if config.metrics.enabled {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()?;
        info!(port = config.metrics.port, "metrics exporter listening");
    }

    let registry = Arc::new(PlatformRegistry::from_config(&config.oauth)?);
    let cipher = SecretCipher::new(&config.security.encryption_key)?;
    let request_timeout = Duration::from_secs(config.retry.request_timeout_secs);

    let tokens = Arc::new(TokenManager::new(
        pool.clone(),
        registry.clone(),
        config.oauth.clone(),
        request_timeout,
    ));
    let accounts = Arc::new(AccountManager::new(
        pool.clone(),
        cipher,
        config.lockout.clone(),
    ));
    let templates = TemplateStore::new(pool.clone());
    let driver_pool = Arc::new(DriverPool::new(config.automation.clone()));

    let mut paths: HashMap<ExecutionKind, Arc<dyn ExecutionPath>> = HashMap::new();
    paths.insert(
        ExecutionKind::Api,
        Arc::new(DirectApiPath::new(
            tokens.clone(),
            templates.clone(),
            registry.clone(),
            request_timeout,
        )),
    );
    paths.insert(
        ExecutionKind::Automation,
        Arc::new(BrowserAutomationPath::new(
            driver_pool,
            accounts.clone(),
            templates.clone(),
            registry.clone(),
            config.automation.clone(),
        )),
    );

    let orchestrator = Arc::new(RegistrationOrchestrator::new(
        pool.clone(),
        paths,
        config.retry.clone(),
    ));

    if cli.sweep_once {
        let resumed = crosslist::sweeper::sweep(&orchestrator, config.sweeper.max_concurrent).await?;
        info!(resumed, "one-off sweep finished");
        return Ok(());
    }

    let mut scheduler = None;
    if config.sweeper.enabled {
        scheduler = Some(
            RetrySweeper::new(orchestrator.clone(), config.sweeper.clone())
                .start()
                .await?,
        );
    } else {
        warn!("retry sweeper disabled; failed attempts only retry inline");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    if let Some(mut scheduler) = scheduler.take() {
        let _ = scheduler.shutdown().await;
    }

    Ok(())
}
