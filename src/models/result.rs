use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platforms::Platform;

use super::RegistrationStatus;

/// Stable error codes attached to failed attempts. Codes, not prose: the
/// retry classifier and the operators' dashboards both key off these.
pub mod error_codes {
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const NETWORK: &str = "NETWORK";
    pub const RATE_LIMIT: &str = "RATE_LIMIT";
    pub const SESSION: &str = "SESSION";
    pub const VALIDATION: &str = "VALIDATION";
    pub const AUTH: &str = "AUTH";
    pub const CAPTCHA: &str = "CAPTCHA";
    pub const ACCOUNT_LOCKED: &str = "ACCOUNT_LOCKED";
    pub const NO_ELIGIBLE_ACCOUNT: &str = "NO_ELIGIBLE_ACCOUNT";
    pub const NO_TEMPLATE: &str = "NO_TEMPLATE";
    pub const UNSUPPORTED_PLATFORM: &str = "UNSUPPORTED_PLATFORM";
    pub const CANCELLED: &str = "CANCELLED";
}

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Environmental: likely to succeed on a later run.
    Transient,
    /// Deterministic: retrying reproduces the same failure.
    Permanent,
}

/// Classify a failure by its error code. Unknown codes are treated as
/// permanent so a miscoded failure cannot retry forever.
pub fn classify_error(code: Option<&str>) -> ErrorClass {
    match code {
        Some(error_codes::TIMEOUT)
        | Some(error_codes::NETWORK)
        | Some(error_codes::RATE_LIMIT)
        | Some(error_codes::SESSION) => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

/// Outcome of one execution pass, produced by every `ExecutionPath`
/// regardless of how the platform is driven. Never persisted as its own
/// table; its fields are folded back into the attempt row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationResult {
    pub success: bool,
    pub status: RegistrationStatus,
    pub platform: Platform,

    pub platform_product_id: Option<String>,
    pub product_url: Option<String>,

    pub error_message: Option<String>,
    pub error_code: Option<String>,
    /// Verbatim platform response for a rejected submission.
    pub error_details: Option<String>,
    /// Verbatim platform response for an accepted submission.
    pub response_body: Option<String>,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,

    pub screenshot_path: Option<String>,

    /// Retry counters of the attempt this pass executed for.
    pub retry_count: i32,
    pub max_retries: i32,
}

impl AutomationResult {
    pub fn success(platform: Platform, product_id: Option<String>, url: Option<String>) -> Self {
        Self {
            success: true,
            status: RegistrationStatus::Success,
            platform,
            platform_product_id: product_id,
            product_url: url,
            error_message: None,
            error_code: None,
            error_details: None,
            response_body: None,
            started_at: Utc::now(),
            completed_at: None,
            execution_time_ms: None,
            screenshot_path: None,
            retry_count: 0,
            max_retries: 0,
        }
    }

    pub fn failure(platform: Platform, code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: RegistrationStatus::Failed,
            platform,
            platform_product_id: None,
            product_url: None,
            error_message: Some(message.into()),
            error_code: Some(code.to_string()),
            error_details: None,
            response_body: None,
            started_at: Utc::now(),
            completed_at: None,
            execution_time_ms: None,
            screenshot_path: None,
            retry_count: 0,
            max_retries: 0,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    pub fn with_screenshot(mut self, path: impl Into<String>) -> Self {
        self.screenshot_path = Some(path.into());
        self
    }

    /// Stamp completion time and derive the wall-clock duration.
    pub fn mark_completed(&mut self) {
        let now = Utc::now();
        self.execution_time_ms = Some((now - self.started_at).num_milliseconds());
        self.completed_at = Some(now);
    }

    pub fn error_class(&self) -> ErrorClass {
        classify_error(self.error_code.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(error_codes::TIMEOUT), ErrorClass::Transient)]
    #[case(Some(error_codes::NETWORK), ErrorClass::Transient)]
    #[case(Some(error_codes::RATE_LIMIT), ErrorClass::Transient)]
    #[case(Some(error_codes::SESSION), ErrorClass::Transient)]
    #[case(Some(error_codes::VALIDATION), ErrorClass::Permanent)]
    #[case(Some(error_codes::AUTH), ErrorClass::Permanent)]
    #[case(Some(error_codes::CAPTCHA), ErrorClass::Permanent)]
    #[case(Some(error_codes::ACCOUNT_LOCKED), ErrorClass::Permanent)]
    #[case(Some(error_codes::NO_ELIGIBLE_ACCOUNT), ErrorClass::Permanent)]
    #[case(Some(error_codes::NO_TEMPLATE), ErrorClass::Permanent)]
    #[case(Some(error_codes::UNSUPPORTED_PLATFORM), ErrorClass::Permanent)]
    #[case(Some(error_codes::CANCELLED), ErrorClass::Permanent)]
    #[case(Some("SOMETHING_NEW"), ErrorClass::Permanent)]
    #[case(None, ErrorClass::Permanent)]
    fn test_classification(#[case] code: Option<&str>, #[case] expected: ErrorClass) {
        assert_eq!(classify_error(code), expected);
    }

    #[test]
    fn test_success_result_shape() {
        let result = AutomationResult::success(
            Platform::Naver,
            Some("91823".to_string()),
            Some("https://smartstore.example/p/91823".to_string()),
        );
        assert!(result.success);
        assert_eq!(result.status, RegistrationStatus::Success);
        assert!(result.error_code.is_none());
    }

    #[test]
    fn test_failure_result_shape() {
        let result = AutomationResult::failure(Platform::Bunjang, error_codes::TIMEOUT, "page load timed out")
            .with_screenshot("/tmp/shots/abc.png");
        assert!(!result.success);
        assert_eq!(result.status, RegistrationStatus::Failed);
        assert_eq!(result.error_class(), ErrorClass::Transient);
        assert!(result.screenshot_path.is_some());
    }

    #[test]
    fn test_mark_completed_sets_duration() {
        let mut result = AutomationResult::success(Platform::Naver, None, None);
        result.mark_completed();
        assert!(result.completed_at.is_some());
        assert!(result.execution_time_ms.unwrap() >= 0);
    }
}
