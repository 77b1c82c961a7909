//! Background escalation sweeper.
//!
//! Periodically walks pending requests and widens the search for those that
//! have waited at least one interval without a committed donor.
//!
//! - Each request is escalated independently; one failure never aborts the sweep
//! - The accepted-donor guard is re-checked inside the write, not only here
//! - Uses a CancellationToken for graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use domains::{DomainError, RequestStatus, Result};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::MatchingEngine;

/// Configuration for the escalation sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between sweeps, also the grace period for new requests (default: 5 minutes).
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(300) }
    }
}

/// Per-sweep counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub escalated: usize,
    pub notified: usize,
    pub skipped_committed: usize,
    pub skipped_grace: usize,
    /// Lost a race with a respond/cancel/fulfill or another escalation.
    pub skipped_raced: usize,
    pub failed: usize,
}

/// One pass over pending requests.
pub async fn sweep_once(engine: &MatchingEngine, grace: Duration) -> Result<SweepReport> {
    let now = engine.now();
    let grace = chrono::Duration::from_std(grace)
        .map_err(|e| DomainError::Validation(format!("sweep interval out of range: {e}")))?;
    let pending = engine.ports.requests.list_by_status(RequestStatus::Pending).await?;

    let mut report = SweepReport::default();
    for request in pending.into_iter().filter(|r| !r.search_stage.is_last()) {
        report.examined += 1;
        if request.has_accepted() {
            report.skipped_committed += 1;
            continue;
        }
        if now - request.created_at < grace {
            report.skipped_grace += 1;
            continue;
        }

        match engine.escalate(request.id).await {
            Ok(outcome) => {
                report.escalated += 1;
                report.notified += outcome.delivered.len();
            }
            Err(
                DomainError::DonorCommitted
                | DomainError::EscalationExhausted
                | DomainError::RequestNotAvailable
                | DomainError::Conflict(_),
            ) => {
                debug!(request_id = %request.id, "escalation skipped after concurrent change");
                report.skipped_raced += 1;
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "escalation failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the loop and waits for the in-flight sweep to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "escalation sweeper task ended abnormally");
        }
    }
}

/// Spawns the sweeper. It stops when `cancel` (or any parent of it) fires.
pub fn spawn_escalation_sweeper(
    engine: Arc<MatchingEngine>,
    config: SweeperConfig,
    cancel: CancellationToken,
) -> SweeperHandle {
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        run_sweep_loop(engine, config, token).await;
    });
    SweeperHandle { cancel, task }
}

async fn run_sweep_loop(engine: Arc<MatchingEngine>, config: SweeperConfig, cancel: CancellationToken) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = config.interval.as_secs(), "escalation sweeper started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("escalation sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                match sweep_once(&engine, config.interval).await {
                    Ok(report) if report.escalated > 0 || report.failed > 0 => info!(
                        examined = report.examined,
                        escalated = report.escalated,
                        notified = report.notified,
                        failed = report.failed,
                        "escalation sweep completed"
                    ),
                    Ok(report) => debug!(examined = report.examined, "escalation sweep: nothing to do"),
                    Err(e) => warn!(error = %e, "escalation sweep could not list pending requests"),
                }
            }
        }
    }
}
