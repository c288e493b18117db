use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod account;
pub mod attempt;
pub mod product;
pub mod result;
pub mod template;
pub mod token;

// Re-exports for convenience
pub use account::*;
pub use attempt::*;
pub use product::*;
pub use result::*;
pub use template::*;
pub use token::*;

// Common enums used across models

/// Lifecycle of one registration attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT")]
pub enum RegistrationStatus {
    #[sqlx(rename = "PENDING")]
    Pending,
    #[sqlx(rename = "IN_PROGRESS")]
    InProgress,
    #[sqlx(rename = "SUCCESS")]
    Success,
    #[sqlx(rename = "FAILED")]
    Failed,
}

impl RegistrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RegistrationStatus::Success | RegistrationStatus::Failed)
    }

    /// Explicit transition table. FAILED -> PENDING is allowed here; the retry
    /// ceiling is enforced by the attempt itself, which also owns counters.
    pub fn can_transition(self, to: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Failed)
                | (InProgress, Success)
                | (InProgress, Failed)
                | (Failed, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "PENDING",
            RegistrationStatus::InProgress => "IN_PROGRESS",
            RegistrationStatus::Success => "SUCCESS",
            RegistrationStatus::Failed => "FAILED",
        }
    }
}

/// How a platform is driven: a documented HTTP API, or a scripted browser
/// session against the consumer web UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum ExecutionKind {
    #[sqlx(rename = "API")]
    Api,
    #[sqlx(rename = "AUTOMATION")]
    Automation,
}

impl ExecutionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionKind::Api => "api",
            ExecutionKind::Automation => "automation",
        }
    }
}

// Helper function to generate row ids in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
