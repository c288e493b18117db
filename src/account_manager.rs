use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};
use validator::Validate;

use crate::config::LockoutConfig;
use crate::models::{generate_id, NewAccount, PlatformAccount, UpdateAccount};
use crate::platforms::Platform;
use crate::utils::crypto::SecretCipher;
use crate::utils::error::{AppError, Result};

/// Marketplace account storage plus the lockout policy: after
/// `max_attempts` consecutive login failures an account is locked for
/// `cooldown_secs` and skipped by automation until the window passes.
/// Accounts are addressed by their natural key, (platform, username).
pub struct AccountManager {
    pool: SqlitePool,
    cipher: SecretCipher,
    lockout: LockoutConfig,
}

impl AccountManager {
    pub fn new(pool: SqlitePool, cipher: SecretCipher, lockout: LockoutConfig) -> Self {
        Self {
            pool,
            cipher,
            lockout,
        }
    }

    pub async fn create(&self, account: NewAccount) -> Result<PlatformAccount> {
        account.validate()?;
        let id = generate_id();
        let now = Utc::now();
        let encrypted = self.cipher.encrypt(&account.password)?;

        sqlx::query(
            r#"
            INSERT INTO platform_accounts
                (id, platform, username, encrypted_password, two_factor_secret, is_active, login_attempts, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(account.platform)
        .bind(&account.username)
        .bind(&encrypted)
        .bind(&account.two_factor_secret)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(platform = %account.platform, username = %account.username, "account stored");
        self.get(account.platform, &account.username).await
    }

    pub async fn get(&self, platform: Platform, username: &str) -> Result<PlatformAccount> {
        sqlx::query_as::<_, PlatformAccount>(
            "SELECT * FROM platform_accounts WHERE platform = ? AND username = ?",
        )
        .bind(platform)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("account {}/{}", platform, username),
        })
    }

    pub async fn update(
        &self,
        platform: Platform,
        username: &str,
        update: UpdateAccount,
    ) -> Result<PlatformAccount> {
        let encrypted = match &update.password {
            Some(password) => Some(self.cipher.encrypt(password)?),
            None => None,
        };

        let updated = sqlx::query(
            r#"
            UPDATE platform_accounts
            SET encrypted_password = COALESCE(?, encrypted_password),
                two_factor_secret = COALESCE(?, two_factor_secret),
                is_active = COALESCE(?, is_active),
                updated_at = ?
            WHERE platform = ? AND username = ?
            "#,
        )
        .bind(&encrypted)
        .bind(&update.two_factor_secret)
        .bind(update.is_active)
        .bind(Utc::now())
        .bind(platform)
        .bind(username)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::NotFound {
                resource: format!("account {}/{}", platform, username),
            });
        }
        self.get(platform, username).await
    }

    /// Soft delete: the row stays for audit, automation stops using it.
    pub async fn delete(&self, platform: Platform, username: &str) -> Result<()> {
        self.update(
            platform,
            username,
            UpdateAccount {
                is_active: Some(false),
                ..UpdateAccount::default()
            },
        )
        .await?;
        Ok(())
    }

    pub fn decrypted_password(&self, account: &PlatformAccount) -> Result<String> {
        self.cipher.decrypt(&account.encrypted_password)
    }

    /// Record a login outcome. A single guarded UPDATE keeps the failure
    /// counter and the lock timestamp consistent under concurrent callers:
    /// the counter never passes the threshold and the lock is set in the
    /// same statement that reaches it.
    pub async fn record_attempt(
        &self,
        platform: Platform,
        username: &str,
        success: bool,
    ) -> Result<PlatformAccount> {
        let now = Utc::now();

        let updated = if success {
            sqlx::query(
                r#"
                UPDATE platform_accounts
                SET login_attempts = 0, locked_until = NULL, last_login = ?, updated_at = ?
                WHERE platform = ? AND username = ?
                "#,
            )
            .bind(now)
            .bind(now)
            .bind(platform)
            .bind(username)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            let locked_until = now + Duration::seconds(self.lockout.cooldown_secs);
            // The lock is stamped only when the threshold is reached with no
            // active lock in place (first crossing, or a failure after an
            // expired lock). Failures during an active lock never extend it.
            sqlx::query(
                r#"
                UPDATE platform_accounts
                SET login_attempts = MIN(login_attempts + 1, ?),
                    locked_until = CASE
                        WHEN login_attempts + 1 >= ?
                             AND (locked_until IS NULL OR locked_until <= ?)
                            THEN ?
                        ELSE locked_until
                    END,
                    updated_at = ?
                WHERE platform = ? AND username = ?
                "#,
            )
            .bind(self.lockout.max_attempts)
            .bind(self.lockout.max_attempts)
            .bind(now)
            .bind(locked_until)
            .bind(now)
            .bind(platform)
            .bind(username)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if updated == 0 {
            return Err(AppError::NotFound {
                resource: format!("account {}/{}", platform, username),
            });
        }

        let account = self.get(platform, username).await?;
        if !success && account.is_locked_at(now) {
            warn!(
                %platform,
                %username,
                attempts = account.login_attempts,
                "account locked after repeated login failures"
            );
        }
        Ok(account)
    }

    pub async fn is_locked(&self, platform: Platform, username: &str) -> Result<bool> {
        Ok(self.get(platform, username).await?.is_locked_at(Utc::now()))
    }

    /// Fetch an account, erroring if it is inside its lockout window. For
    /// callers addressing a specific account rather than picking one.
    pub async fn ensure_unlocked(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<PlatformAccount> {
        let account = self.get(platform, username).await?;
        if account.is_locked_at(Utc::now()) {
            return Err(AppError::AccountLocked {
                platform: platform.to_string(),
                username: account.username,
            });
        }
        Ok(account)
    }

    /// Active accounts for the platform that are currently usable, oldest
    /// last_login first so logins rotate across accounts.
    pub async fn list_unlocked(&self, platform: Platform) -> Result<Vec<PlatformAccount>> {
        Ok(sqlx::query_as::<_, PlatformAccount>(
            r#"
            SELECT * FROM platform_accounts
            WHERE platform = ? AND is_active = 1
              AND (locked_until IS NULL OR locked_until <= ?)
            ORDER BY last_login ASC NULLS FIRST
            "#,
        )
        .bind(platform)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?)
    }

    /// The account automation should log in with. `NoEligibleAccount` when
    /// everything is locked or inactive.
    pub async fn pick_unlocked(&self, platform: Platform) -> Result<PlatformAccount> {
        self.list_unlocked(platform)
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NoEligibleAccount {
                platform: platform.to_string(),
            })
    }
}
