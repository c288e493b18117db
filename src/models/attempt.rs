use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::platforms::Platform;
use crate::utils::error::{AppError, Result};

use super::{generate_id, AutomationResult, RegistrationStatus};

pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// One row per (product, platform) registration. The row is the source of
/// truth for the state machine; every transition goes through the methods
/// below so an illegal jump is an error, not silent corruption.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegistrationAttempt {
    pub id: String,
    pub platform: Platform,
    /// Reference into the external inventory system.
    pub product_ref: String,
    pub product_name: String,
    pub product_description: Option<String>,
    pub status: RegistrationStatus,

    pub error_message: Option<String>,
    pub error_code: Option<String>,

    pub platform_product_id: Option<String>,
    pub platform_url: Option<String>,

    /// JSON snapshot of the product as submitted; replayed on retry.
    pub request_data: Option<String>,
    /// Verbatim platform response, success or failure.
    pub response_data: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub retry_count: i32,
    pub max_retries: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationAttempt {
    pub fn new(
        platform: Platform,
        product_ref: impl Into<String>,
        product_name: impl Into<String>,
        max_retries: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            platform,
            product_ref: product_ref.into(),
            product_name: product_name.into(),
            product_description: None,
            status: RegistrationStatus::Pending,
            error_message: None,
            error_code: None,
            platform_product_id: None,
            platform_url: None,
            request_data: None,
            response_data: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: RegistrationStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(AppError::Validation(format!(
                "illegal status transition {} -> {} for attempt {}",
                self.status.as_str(),
                to.as_str(),
                self.id
            )));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// PENDING -> IN_PROGRESS, stamping the execution start.
    pub fn begin(&mut self) -> Result<()> {
        self.transition(RegistrationStatus::InProgress)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Fold an execution outcome into the row: IN_PROGRESS -> SUCCESS/FAILED.
    pub fn complete(&mut self, result: &AutomationResult) -> Result<()> {
        self.transition(result.status)?;
        self.completed_at = result.completed_at.or_else(|| Some(Utc::now()));
        self.platform_product_id = result.platform_product_id.clone();
        self.platform_url = result.product_url.clone();
        self.error_message = result.error_message.clone();
        self.error_code = result.error_code.clone();
        // Successful attempts snapshot the platform response (falling back
        // to the serialized result when the path captured no body); failed
        // ones keep whatever the platform rejected us with.
        self.response_data = if result.success {
            result
                .response_body
                .clone()
                .or_else(|| serde_json::to_string(result).ok())
        } else {
            result.error_details.clone()
        };
        Ok(())
    }

    /// FAILED -> PENDING for a retry. Increments the counter and clears the
    /// failure fields so the next pass starts from a clean slate. Refused
    /// once the ceiling is reached.
    pub fn reenter_pending(&mut self) -> Result<()> {
        if self.retry_count >= self.max_retries {
            return Err(AppError::Validation(format!(
                "attempt {} exhausted its retries ({}/{})",
                self.id, self.retry_count, self.max_retries
            )));
        }
        self.transition(RegistrationStatus::Pending)?;
        self.retry_count += 1;
        self.error_message = None;
        self.error_code = None;
        self.completed_at = None;
        Ok(())
    }

    pub fn retry_eligible(&self) -> bool {
        self.status == RegistrationStatus::Failed && self.retry_count < self.max_retries
    }

    /// Wall-clock time spent executing. For an attempt still in flight this
    /// measures against now, so a stalled IN_PROGRESS row is detectable.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        Some(self.completed_at.unwrap_or_else(Utc::now) - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error_codes;

    fn attempt() -> RegistrationAttempt {
        RegistrationAttempt::new(Platform::Naver, "inv-1001", "Vintage Film Camera", DEFAULT_MAX_RETRIES)
    }

    #[test]
    fn test_happy_path() {
        let mut attempt = attempt();
        assert_eq!(attempt.status, RegistrationStatus::Pending);

        attempt.begin().unwrap();
        assert_eq!(attempt.status, RegistrationStatus::InProgress);
        assert!(attempt.started_at.is_some());

        let mut result = AutomationResult::success(
            Platform::Naver,
            Some("91823".to_string()),
            Some("https://smartstore.example/p/91823".to_string()),
        );
        result.mark_completed();
        attempt.complete(&result).unwrap();

        assert_eq!(attempt.status, RegistrationStatus::Success);
        assert_eq!(attempt.platform_product_id.as_deref(), Some("91823"));
        assert!(attempt.elapsed().is_some());
    }

    #[test]
    fn test_success_persists_response_snapshot() {
        let mut attempt = attempt();
        attempt.begin().unwrap();
        let result = AutomationResult::success(Platform::Naver, Some("91823".to_string()), None)
            .with_response_body(r#"{"originProductNo":"91823"}"#);
        attempt.complete(&result).unwrap();
        assert_eq!(
            attempt.response_data.as_deref(),
            Some(r#"{"originProductNo":"91823"}"#)
        );

        // Paths that capture no body still leave a serialized outcome behind.
        let mut bare = self::attempt();
        bare.begin().unwrap();
        bare.complete(&AutomationResult::success(Platform::Naver, None, None))
            .unwrap();
        assert!(bare.response_data.is_some());
    }

    #[test]
    fn test_elapsed_measures_in_flight_attempts() {
        let mut attempt = attempt();
        assert!(attempt.elapsed().is_none()); // never started

        attempt.begin().unwrap();
        let running = attempt.elapsed().unwrap();
        assert!(running >= chrono::Duration::zero());

        let mut result = AutomationResult::failure(Platform::Naver, error_codes::TIMEOUT, "slow");
        result.mark_completed();
        attempt.complete(&result).unwrap();
        assert!(attempt.elapsed().unwrap() >= running);
    }

    #[test]
    fn test_failure_then_retry() {
        let mut attempt = attempt();
        attempt.begin().unwrap();

        let result = AutomationResult::failure(Platform::Naver, error_codes::NETWORK, "connection refused");
        attempt.complete(&result).unwrap();
        assert_eq!(attempt.status, RegistrationStatus::Failed);
        assert!(attempt.retry_eligible());

        attempt.reenter_pending().unwrap();
        assert_eq!(attempt.status, RegistrationStatus::Pending);
        assert_eq!(attempt.retry_count, 1);
        assert!(attempt.error_message.is_none());
        assert!(attempt.error_code.is_none());
        assert!(attempt.completed_at.is_none());
    }

    #[test]
    fn test_retry_ceiling() {
        let mut attempt = attempt();
        for _ in 0..DEFAULT_MAX_RETRIES {
            attempt.begin().unwrap();
            let result = AutomationResult::failure(Platform::Naver, error_codes::TIMEOUT, "timed out");
            attempt.complete(&result).unwrap();
            attempt.reenter_pending().unwrap();
        }
        attempt.begin().unwrap();
        let result = AutomationResult::failure(Platform::Naver, error_codes::TIMEOUT, "timed out");
        attempt.complete(&result).unwrap();

        assert_eq!(attempt.retry_count, DEFAULT_MAX_RETRIES);
        assert!(!attempt.retry_eligible());
        assert!(attempt.reenter_pending().is_err());
        assert_eq!(attempt.status, RegistrationStatus::Failed);
    }

    #[test]
    fn test_success_is_final() {
        let mut attempt = attempt();
        attempt.begin().unwrap();
        attempt
            .complete(&AutomationResult::success(Platform::Naver, None, None))
            .unwrap();

        assert!(attempt.begin().is_err());
        assert!(attempt.reenter_pending().is_err());
        assert_eq!(attempt.status, RegistrationStatus::Success);
    }

    #[test]
    fn test_cannot_complete_from_pending() {
        let mut attempt = attempt();
        let result = AutomationResult::success(Platform::Naver, None, None);
        assert!(attempt.complete(&result).is_err());
    }
}
