//! # BloodBridge
//!
//! Assembles the matching engine from configuration: storage adapter,
//! notifier, escalation sweeper and the HTTP surface.

#[cfg(not(feature = "web-axum"))]
compile_error!("bloodbridge needs the `web-axum` feature");

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use api_adapters::{build_router, AppState};
use configs::{AppConfig, LogFormat, LoggingConfig, MatchingConfig, NotificationConfig};
use domains::{Account, AccountStore, InventoryStore, RadiusLadder, RequestRepo, SettlementStore, SystemClock};
use services::{spawn_escalation_sweeper, AlertMode, MatchingEngine, MatchingPolicy, Ports, SweeperConfig};
use storage_adapters::{LogNotifier, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[cfg(feature = "db-postgres")]
use secrecy::ExposeSecret;
#[cfg(feature = "db-postgres")]
use storage_adapters::PgStore;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .context("invalid log filter")?;
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer()).try_init()?,
    }
    Ok(())
}

fn matching_policy(matching: &MatchingConfig, notifications: &NotificationConfig) -> Result<MatchingPolicy> {
    Ok(MatchingPolicy {
        ladder: RadiusLadder::new(matching.ladder()?)?,
        geofence_radius_m: matching.geofence_radius_m,
        nearby_bank_radius_km: matching.nearby_bank_radius_km,
        max_write_attempts: matching.max_write_attempts,
        dispatch_timeout: Duration::from_secs(matching.dispatch_timeout_secs),
        portal_url: notifications.portal_url.clone(),
        ..MatchingPolicy::default()
    }
    .with_cooldown_days(matching.cooldown_days))
}

fn ports_over<S>(store: Arc<S>) -> Ports
where
    S: AccountStore + RequestRepo + InventoryStore + SettlementStore + 'static,
{
    Ports {
        accounts: store.clone(),
        requests: store.clone(),
        inventory: store.clone(),
        settlements: store,
        notifier: Arc::new(LogNotifier::new()),
        clock: Arc::new(SystemClock),
    }
}

fn read_seed(path: &str) -> Result<Vec<Account>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading seed file {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed file {path}"))
}

async fn build_ports(config: &AppConfig) -> Result<Ports> {
    let seed = match &config.database.seed_file {
        Some(path) => read_seed(path)?,
        None => Vec::new(),
    };

    match &config.database.url {
        #[cfg(feature = "db-postgres")]
        Some(url) => {
            let store = PgStore::connect(url.expose_secret(), config.database.max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            for account in &seed {
                store.put_account(account).await?;
            }
            info!(seeded = seed.len(), "using PostgreSQL store");
            Ok(ports_over(Arc::new(store)))
        }
        #[cfg(not(feature = "db-postgres"))]
        Some(_) => anyhow::bail!("database.url is set but this build lacks the `db-postgres` feature"),
        None => {
            let store = MemoryStore::new();
            let seeded = seed.len();
            for account in seed {
                store.put_account(account);
            }
            warn!(seeded, "no database configured, state is kept in memory only");
            Ok(ports_over(Arc::new(store)))
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
        }
        _ = cancel.cancelled() => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.logging)?;

    let policy = matching_policy(&config.matching, &config.notifications)?;
    let ports = build_ports(&config).await?;
    let engine = Arc::new(MatchingEngine::new(ports, policy));
    if config.notifications.disaster_mode {
        engine.set_alert_mode(AlertMode::Disaster);
    }

    let shutdown = CancellationToken::new();
    let sweeper = config.scheduler.enabled.then(|| {
        spawn_escalation_sweeper(
            Arc::clone(&engine),
            SweeperConfig { interval: Duration::from_secs(config.scheduler.interval_secs) },
            shutdown.child_token(),
        )
    });

    let app = build_router(AppState::new(engine));
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "BloodBridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }
    info!("stopped");
    Ok(())
}
