use serde::{Deserialize, Serialize};
use validator::Validate;

/// Snapshot of the inventory item being listed. Owned by the inventory
/// system; the orchestrator only reads it and stores a JSON copy on the
/// attempt for audit and retry.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ProductData {
    /// Reference into the external inventory system
    #[validate(length(min = 1))]
    pub external_id: String,

    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: String,
    #[validate(range(min = 0))]
    pub price: i64,
    #[validate(length(min = 1))]
    pub category: String,
    pub condition: Option<String>,

    #[serde(default)]
    pub image_urls: Vec<String>,

    pub location: Option<String>,
    #[serde(default)]
    pub delivery_available: bool,
    pub delivery_fee: Option<i64>,

    #[serde(default)]
    pub tags: Vec<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
}

impl ProductData {
    pub fn snapshot_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
