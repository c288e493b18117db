use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::platforms::Platform;
use crate::utils::error::Result;

use super::ExecutionKind;

/// Platform-specific registration defaults (seller codes, shipping policies,
/// category mappings) stored as a JSON document. Multiple templates can
/// coexist per platform and kind; the lowest `priority` value wins.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegistrationTemplate {
    pub id: String,
    pub platform: Platform,
    pub template_name: String,
    /// JSON document; parsed on demand via `data()`.
    pub template_data: String,
    pub template_kind: ExecutionKind,
    pub is_active: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationTemplate {
    pub fn data(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.template_data)?)
    }
}
