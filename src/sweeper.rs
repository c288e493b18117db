use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::SweeperConfig;
use crate::orchestrator::RegistrationOrchestrator;
use crate::utils::error::{AppError, Result};

/// Periodically re-drives failed attempts that still have retry budget.
/// Catches work orphaned by crashes and transient failures whose inline
/// retries ran out of process lifetime.
pub struct RetrySweeper {
    orchestrator: Arc<RegistrationOrchestrator>,
    config: SweeperConfig,
}

impl RetrySweeper {
    pub fn new(orchestrator: Arc<RegistrationOrchestrator>, config: SweeperConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub async fn start(self) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("failed to create scheduler: {}", e)))?;

        let orchestrator = self.orchestrator.clone();
        let max_concurrent = self.config.max_concurrent;
        let job = Job::new_async(self.config.schedule.as_str(), move |_uuid, _lock| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                if let Err(err) = sweep(&orchestrator, max_concurrent).await {
                    error!(%err, "retry sweep failed");
                }
            })
        })
        .map_err(|e| AppError::Internal(format!("invalid sweeper schedule: {}", e)))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("failed to schedule sweeper: {}", e)))?;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("failed to start scheduler: {}", e)))?;

        info!(schedule = %self.config.schedule, "retry sweeper started");
        Ok(scheduler)
    }
}

/// One sweep pass: resume every retry-eligible attempt, a bounded number at
/// a time. Individual failures are logged and do not stop the pass.
pub async fn sweep(
    orchestrator: &Arc<RegistrationOrchestrator>,
    max_concurrent: usize,
) -> Result<usize> {
    let eligible = orchestrator.retry_eligible().await?;
    if eligible.is_empty() {
        return Ok(0);
    }
    info!(count = eligible.len(), "sweeping retry-eligible attempts");

    let resumed = stream::iter(eligible)
        .map(|attempt| {
            let orchestrator = orchestrator.clone();
            async move {
                // FAILED rows re-enter PENDING through the guarded retry
                // path; orphaned PENDING rows resume directly. A race with
                // another worker shows up as a zero-row update inside.
                let swept = match attempt.status {
                    crate::models::RegistrationStatus::Pending => {
                        orchestrator.resume(&attempt.id).await
                    }
                    _ => orchestrator.retry_attempt(&attempt.id).await,
                };
                match swept {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(attempt_id = %attempt.id, %err, "sweep retry failed");
                        false
                    }
                }
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .filter(|resumed| futures::future::ready(*resumed))
        .count()
        .await;

    Ok(resumed)
}
