use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::platforms::Platform;

/// One OAuth credential row. At most one row per platform has
/// `is_active = true`; issuing a fresh token deactivates the old row in the
/// same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformToken {
    pub id: String,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    /// None means the provider issued a non-expiring credential.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }

    /// True when the token expires within `headroom` of `now`. Used to
    /// refresh slightly early instead of handing out a token that dies
    /// mid-request.
    pub fn expires_within(&self, now: DateTime<Utc>, headroom: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + headroom,
            None => false,
        }
    }
}

/// Caller-supplied token material for direct upserts, used when a token is
/// obtained out of band (manual issuance in a provider console).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenUpsert {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Absolute expiry; wins over `expires_in` when both are set.
    pub expires_at: Option<DateTime<Utc>>,
    /// Relative expiry in seconds, resolved against the time of the upsert.
    pub expires_in: Option<i64>,
}

impl TokenUpsert {
    pub fn resolve_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_at
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)))
    }
}
