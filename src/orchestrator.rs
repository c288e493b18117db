use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use sqlx::SqlitePool;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{info, warn};
use validator::Validate;

use crate::config::RetryConfig;
use crate::models::{
    error_codes, AutomationResult, ErrorClass, ExecutionKind, ProductData, RegistrationAttempt,
    RegistrationStatus,
};
use crate::paths::ExecutionPath;
use crate::platforms::Platform;
use crate::utils::error::{AppError, Result};

const BACKOFF_CEILING: Duration = Duration::from_secs(60);
const RECENT_LIMIT: i64 = 10;

/// Per-platform view of the registration table.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlatformStatus {
    pub platform: Platform,
    pub pending: i64,
    pub in_progress: i64,
    pub success: i64,
    pub failed: i64,
    pub recent: Vec<RegistrationAttempt>,
}

/// Drives registration attempts through their lifecycle. Every state change
/// is a guarded UPDATE keyed on the expected current status, so concurrent
/// workers (or a cancel racing an execution) resolve at the database instead
/// of trampling each other.
pub struct RegistrationOrchestrator {
    pool: SqlitePool,
    paths: HashMap<ExecutionKind, Arc<dyn ExecutionPath>>,
    retry: RetryConfig,
}

impl RegistrationOrchestrator {
    pub fn new(
        pool: SqlitePool,
        paths: HashMap<ExecutionKind, Arc<dyn ExecutionPath>>,
        retry: RetryConfig,
    ) -> Self {
        Self { pool, paths, retry }
    }

    /// Create and drive a registration for one product on one platform.
    /// An unknown platform name fails before any row is written.
    pub async fn submit_registration(
        &self,
        platform_name: &str,
        product: &ProductData,
    ) -> Result<RegistrationAttempt> {
        let platform: Platform = platform_name.parse()?;
        product.validate()?;

        let mut attempt = RegistrationAttempt::new(
            platform,
            product.external_id.clone(),
            product.name.clone(),
            self.retry.max_retries,
        );
        attempt.product_description = Some(product.description.clone());
        attempt.request_data = Some(product.snapshot_json()?);
        self.insert(&attempt).await?;

        info!(attempt_id = %attempt.id, %platform, product = %product.external_id, "registration submitted");
        counter!("registrations_submitted_total", "platform" => platform.as_str()).increment(1);

        self.drive(&attempt.id, product).await
    }

    /// Re-drive an attempt from its stored product snapshot. Used by the
    /// sweeper and by process restart recovery.
    pub async fn resume(&self, id: &str) -> Result<RegistrationAttempt> {
        let attempt = self.get_attempt(id).await?;
        let snapshot = attempt.request_data.as_deref().ok_or_else(|| {
            AppError::Validation(format!("attempt {} has no stored product snapshot", id))
        })?;
        let product: ProductData = serde_json::from_str(snapshot)?;
        self.drive(id, &product).await
    }

    /// Manual retry of a failed attempt. Refused when the attempt is not
    /// FAILED or its retry budget is spent.
    pub async fn retry_attempt(&self, id: &str) -> Result<RegistrationAttempt> {
        let attempt = self.get_attempt(id).await?;
        if attempt.status != RegistrationStatus::Failed {
            return Err(AppError::Validation(format!(
                "attempt {} is {}, only FAILED attempts can be retried",
                id,
                attempt.status.as_str()
            )));
        }
        if !attempt.retry_eligible() {
            return Err(AppError::Validation(format!(
                "attempt {} exhausted its retries ({}/{})",
                id, attempt.retry_count, attempt.max_retries
            )));
        }
        if self.reenter_pending(id).await? == 0 {
            // Lost a race with the sweeper; whoever won will drive it.
            return self.get_attempt(id).await;
        }
        self.resume(id).await
    }

    /// Cancel an attempt that has not started executing. Only PENDING rows
    /// can be cancelled; anything already picked up runs to completion.
    pub async fn cancel_attempt(&self, id: &str) -> Result<RegistrationAttempt> {
        let now = Utc::now();
        let cancelled = sqlx::query(
            r#"
            UPDATE registration_attempts
            SET status = 'FAILED', error_code = ?, error_message = 'cancelled before execution',
                completed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(error_codes::CANCELLED)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let attempt = self.get_attempt(id).await?;
        if cancelled == 0 {
            return Err(AppError::Validation(format!(
                "attempt {} is {}, only PENDING attempts can be cancelled",
                id,
                attempt.status.as_str()
            )));
        }
        info!(attempt_id = %id, "registration cancelled");
        Ok(attempt)
    }

    pub async fn get_attempt(&self, id: &str) -> Result<RegistrationAttempt> {
        sqlx::query_as::<_, RegistrationAttempt>(
            "SELECT * FROM registration_attempts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("registration attempt {}", id),
        })
    }

    pub async fn list_by_platform(
        &self,
        platform: Platform,
        status: Option<RegistrationStatus>,
    ) -> Result<Vec<RegistrationAttempt>> {
        let attempts = match status {
            Some(status) => {
                sqlx::query_as::<_, RegistrationAttempt>(
                    "SELECT * FROM registration_attempts WHERE platform = ? AND status = ? ORDER BY created_at DESC",
                )
                .bind(platform)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, RegistrationAttempt>(
                    "SELECT * FROM registration_attempts WHERE platform = ? ORDER BY created_at DESC",
                )
                .bind(platform)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(attempts)
    }

    /// Attempts the sweep should pick up: FAILED with retry budget left, or
    /// PENDING rows orphaned before anything drove them. Oldest first.
    pub async fn retry_eligible(&self) -> Result<Vec<RegistrationAttempt>> {
        Ok(sqlx::query_as::<_, RegistrationAttempt>(
            r#"
            SELECT * FROM registration_attempts
            WHERE status IN ('FAILED', 'PENDING') AND retry_count < max_retries
            ORDER BY updated_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn platform_status(&self, platform: Platform) -> Result<PlatformStatus> {
        let rows: Vec<(RegistrationStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM registration_attempts WHERE platform = ? GROUP BY status",
        )
        .bind(platform)
        .fetch_all(&self.pool)
        .await?;

        let mut status = PlatformStatus {
            platform,
            pending: 0,
            in_progress: 0,
            success: 0,
            failed: 0,
            recent: Vec::new(),
        };
        for (state, count) in rows {
            match state {
                RegistrationStatus::Pending => status.pending = count,
                RegistrationStatus::InProgress => status.in_progress = count,
                RegistrationStatus::Success => status.success = count,
                RegistrationStatus::Failed => status.failed = count,
            }
        }

        status.recent = sqlx::query_as::<_, RegistrationAttempt>(
            "SELECT * FROM registration_attempts WHERE platform = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(platform)
        .bind(RECENT_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(status)
    }

    /// Execute until the attempt reaches a terminal state or its retry
    /// budget runs out. Transient failures re-enter PENDING with exponential
    /// backoff; permanent ones stop immediately.
    async fn drive(&self, id: &str, product: &ProductData) -> Result<RegistrationAttempt> {
        // Resolve the path before touching the row so a misconfigured kind
        // leaves the attempt PENDING (still sweepable) instead of stranding
        // it IN_PROGRESS.
        let kind = self.get_attempt(id).await?.platform.execution_kind();
        let path = self.paths.get(&kind).ok_or_else(|| {
            AppError::Automation(format!(
                "no execution path registered for {} platforms",
                kind.as_str()
            ))
        })?;

        let mut delays = ExponentialBackoff::from_millis(2)
            .factor(self.retry.base_delay_ms / 2)
            .max_delay(BACKOFF_CEILING);

        loop {
            if self.claim(id).await? == 0 {
                // Cancelled, already terminal, or another worker got here first.
                return self.get_attempt(id).await;
            }
            let mut attempt = self.get_attempt(id).await?;

            let mut result = path.execute(&attempt, product).await;
            if result.completed_at.is_none() {
                result.mark_completed();
            }
            result.retry_count = attempt.retry_count;
            result.max_retries = attempt.max_retries;
            attempt.complete(&result)?;
            self.persist_outcome(&attempt).await?;
            self.record_metrics(&attempt, &result);

            if result.success {
                info!(attempt_id = %id, platform = %attempt.platform, "registration succeeded");
                return Ok(attempt);
            }

            let transient = result.error_class() == ErrorClass::Transient;
            if !transient || !attempt.retry_eligible() {
                warn!(
                    attempt_id = %id,
                    platform = %attempt.platform,
                    error_code = attempt.error_code.as_deref().unwrap_or("unknown"),
                    retry_count = attempt.retry_count,
                    "registration failed terminally"
                );
                return Ok(attempt);
            }

            if self.reenter_pending(id).await? == 0 {
                return self.get_attempt(id).await;
            }
            let delay = delays.next().unwrap_or(BACKOFF_CEILING);
            warn!(
                attempt_id = %id,
                platform = %attempt.platform,
                error_code = attempt.error_code.as_deref().unwrap_or("unknown"),
                delay_ms = delay.as_millis() as u64,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// PENDING -> IN_PROGRESS, guarded on the current status. Zero rows
    /// means the attempt was cancelled or claimed elsewhere.
    async fn claim(&self, id: &str) -> Result<u64> {
        let now = Utc::now();
        Ok(sqlx::query(
            r#"
            UPDATE registration_attempts
            SET status = 'IN_PROGRESS', started_at = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected())
    }

    /// FAILED -> PENDING with the retry counter bumped, guarded on both the
    /// status and the remaining budget.
    async fn reenter_pending(&self, id: &str) -> Result<u64> {
        Ok(sqlx::query(
            r#"
            UPDATE registration_attempts
            SET status = 'PENDING', retry_count = retry_count + 1,
                error_message = NULL, error_code = NULL, completed_at = NULL, updated_at = ?
            WHERE id = ? AND status = 'FAILED' AND retry_count < max_retries
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected())
    }

    async fn insert(&self, attempt: &RegistrationAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO registration_attempts
                (id, platform, product_ref, product_name, product_description, status,
                 request_data, retry_count, max_retries, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.id)
        .bind(attempt.platform)
        .bind(&attempt.product_ref)
        .bind(&attempt.product_name)
        .bind(&attempt.product_description)
        .bind(attempt.status)
        .bind(&attempt.request_data)
        .bind(attempt.retry_count)
        .bind(attempt.max_retries)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// IN_PROGRESS -> SUCCESS/FAILED with the execution outcome folded in.
    async fn persist_outcome(&self, attempt: &RegistrationAttempt) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE registration_attempts
            SET status = ?, error_message = ?, error_code = ?, platform_product_id = ?,
                platform_url = ?, response_data = ?, completed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'IN_PROGRESS'
            "#,
        )
        .bind(attempt.status)
        .bind(&attempt.error_message)
        .bind(&attempt.error_code)
        .bind(&attempt.platform_product_id)
        .bind(&attempt.platform_url)
        .bind(&attempt.response_data)
        .bind(attempt.completed_at)
        .bind(attempt.updated_at)
        .bind(&attempt.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn record_metrics(&self, attempt: &RegistrationAttempt, result: &AutomationResult) {
        let outcome = if result.success { "success" } else { "failure" };
        counter!(
            "registration_executions_total",
            "platform" => attempt.platform.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        if let Some(ms) = result.execution_time_ms {
            metrics::histogram!(
                "registration_execution_ms",
                "platform" => attempt.platform.as_str()
            )
            .record(ms as f64);
        }
    }
}
