use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::platforms::Platform;

/// Stored marketplace login used by browser automation. The password is
/// AES-GCM encrypted at rest; only the automation path decrypts it, right
/// before typing it into the login form.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformAccount {
    pub id: String,
    pub platform: Platform,
    pub username: String,
    #[serde(skip_serializing)]
    pub encrypted_password: String,
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    /// Consecutive login failures. Reset to zero on any successful login.
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformAccount {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            Some(until) => until > now,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccount {
    pub platform: Platform,
    #[validate(length(min = 1, max = 200))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    pub two_factor_secret: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAccount {
    pub password: Option<String>,
    pub two_factor_secret: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(locked_until: Option<DateTime<Utc>>) -> PlatformAccount {
        let now = Utc::now();
        PlatformAccount {
            id: "a1".to_string(),
            platform: Platform::Bunjang,
            username: "seller01".to_string(),
            encrypted_password: "ciphertext".to_string(),
            two_factor_secret: None,
            is_active: true,
            last_login: None,
            login_attempts: 0,
            locked_until,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_unlocked_without_lock_timestamp() {
        assert!(!account(None).is_locked_at(Utc::now()));
    }

    #[test]
    fn test_locked_while_in_window() {
        let now = Utc::now();
        assert!(account(Some(now + Duration::minutes(30))).is_locked_at(now));
    }

    #[test]
    fn test_expired_lock_is_unlocked() {
        let now = Utc::now();
        assert!(!account(Some(now - Duration::seconds(1))).is_locked_at(now));
    }

    #[test]
    fn test_password_never_serialized() {
        let json = serde_json::to_string(&account(None)).unwrap();
        assert!(!json.contains("ciphertext"));
        assert!(!json.contains("encrypted_password"));
    }

    #[test]
    fn test_new_account_validation() {
        let account = NewAccount {
            platform: Platform::Bunjang,
            username: String::new(),
            password: "pw".to_string(),
            two_factor_secret: None,
        };
        assert!(account.validate().is_err());
    }
}
