use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::OAuthConfig;
use crate::models::{generate_id, PlatformToken, TokenUpsert};
use crate::platforms::{Platform, PlatformRegistry};
use crate::utils::error::{AppError, Result};

/// Refresh this far ahead of expiry so a caller never receives a token that
/// dies mid-request.
const EXPIRY_HEADROOM_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

/// OAuth token lifecycle for the direct-API platforms. All mutations for one
/// platform are serialized through a per-platform async lock, so two
/// concurrent refreshes cannot both hit the provider or race the single
/// active row.
pub struct TokenManager {
    pool: SqlitePool,
    http: reqwest::Client,
    registry: Arc<PlatformRegistry>,
    oauth: OAuthConfig,
    locks: Mutex<HashMap<Platform, Arc<Mutex<()>>>>,
    request_timeout: StdDuration,
}

impl TokenManager {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<PlatformRegistry>,
        oauth: OAuthConfig,
        request_timeout: StdDuration,
    ) -> Self {
        Self {
            pool,
            http: reqwest::Client::new(),
            registry,
            oauth,
            locks: Mutex::new(HashMap::new()),
            request_timeout,
        }
    }

    async fn platform_lock(&self, platform: Platform) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(platform).or_default().clone()
    }

    /// A valid access token for the platform, refreshing behind the scenes
    /// when the stored one is expired or about to expire. `TokenUnavailable`
    /// when there is no token and no way to mint one.
    pub async fn get_token(&self, platform: Platform) -> Result<PlatformToken> {
        let lock = self.platform_lock(platform).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let token = self.fetch_active(platform).await?;

        match token {
            Some(token)
                if token.is_valid_at(now)
                    && !token.expires_within(now, Duration::seconds(EXPIRY_HEADROOM_SECS)) =>
            {
                Ok(token)
            }
            Some(token) if token.refresh_token.is_some() => {
                debug!(%platform, "stored token stale, refreshing");
                match self.refresh_locked(platform, &token).await {
                    Ok(refreshed) => Ok(refreshed),
                    Err(AppError::RefreshFailed { reason, .. }) => {
                        warn!(%platform, %reason, "token refresh rejected");
                        Err(AppError::TokenUnavailable {
                            platform: platform.to_string(),
                        })
                    }
                    Err(other) => Err(other),
                }
            }
            // Inside the headroom window but with no way to refresh: the
            // token is still valid, hand it out for as long as it lasts.
            Some(token) if token.is_valid_at(now) => Ok(token),
            _ => Err(AppError::TokenUnavailable {
                platform: platform.to_string(),
            }),
        }
    }

    /// Mint a fresh token via the client-credentials grant and make it the
    /// single active row for the platform.
    pub async fn issue_token(&self, platform: Platform) -> Result<PlatformToken> {
        let lock = self.platform_lock(platform).await;
        let _guard = lock.lock().await;

        let provider = self.oauth.provider(platform).ok_or_else(|| {
            AppError::Validation(format!("platform {} does not use oauth tokens", platform))
        })?;
        let token_url = self.registry.token_url(platform)?;

        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", provider.client_id.clone()),
            ("client_secret", provider.client_secret.clone()),
        ];
        if let Some(scope) = &provider.scope {
            form.push(("scope", scope.clone()));
        }

        let response = self
            .http
            .post(token_url)
            .timeout(self.request_timeout)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "token issuance for {} rejected with {}: {}",
                platform, status, body
            )));
        }

        let grant: TokenEndpointResponse = response.json().await?;
        let token = self.swap_active(platform, grant).await?;
        info!(%platform, token_id = %token.id, "issued new platform token");
        Ok(token)
    }

    /// Exchange the stored refresh credential for a new access token,
    /// updating the active row in place. `RefreshFailed` when the provider
    /// rejects the refresh credential.
    pub async fn refresh_token(&self, platform: Platform) -> Result<PlatformToken> {
        let lock = self.platform_lock(platform).await;
        let _guard = lock.lock().await;

        let token = self
            .fetch_active(platform)
            .await?
            .ok_or_else(|| AppError::TokenUnavailable {
                platform: platform.to_string(),
            })?;
        self.refresh_locked(platform, &token).await
    }

    async fn refresh_locked(
        &self,
        platform: Platform,
        token: &PlatformToken,
    ) -> Result<PlatformToken> {
        let refresh_token =
            token
                .refresh_token
                .as_deref()
                .ok_or_else(|| AppError::RefreshFailed {
                    platform: platform.to_string(),
                    reason: "no refresh credential stored".to_string(),
                })?;
        let provider = self.oauth.provider(platform).ok_or_else(|| {
            AppError::Validation(format!("platform {} does not use oauth tokens", platform))
        })?;
        let token_url = self.registry.token_url(platform)?;

        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", provider.client_id.clone()),
            ("client_secret", provider.client_secret.clone()),
        ];

        let response = self
            .http
            .post(token_url)
            .timeout(self.request_timeout)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RefreshFailed {
                platform: platform.to_string(),
                reason: format!("{}: {}", status, body),
            });
        }

        let grant: TokenEndpointResponse = response.json().await?;
        let now = Utc::now();
        let expires_at = grant.expires_in.map(|secs| now + Duration::seconds(secs));

        // The provider may rotate the refresh credential; keep the old one
        // only when no replacement came back.
        sqlx::query(
            r#"
            UPDATE platform_tokens
            SET access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                token_type = COALESCE(?, token_type),
                scope = COALESCE(?, scope),
                expires_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(&grant.token_type)
        .bind(&grant.scope)
        .bind(expires_at)
        .bind(now)
        .bind(&token.id)
        .execute(&self.pool)
        .await?;

        info!(%platform, token_id = %token.id, "refreshed platform token");
        self.fetch_active(platform)
            .await?
            .ok_or_else(|| AppError::TokenUnavailable {
                platform: platform.to_string(),
            })
    }

    /// Deactivate whatever token is active. Idempotent: revoking a platform
    /// with no active token is a no-op.
    pub async fn revoke_token(&self, platform: Platform) -> Result<()> {
        let lock = self.platform_lock(platform).await;
        let _guard = lock.lock().await;

        let revoked = sqlx::query(
            "UPDATE platform_tokens SET is_active = 0, updated_at = ? WHERE platform = ? AND is_active = 1",
        )
        .bind(Utc::now())
        .bind(platform)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if revoked > 0 {
            info!(%platform, "revoked active token");
        }
        Ok(())
    }

    /// Store caller-supplied token material (obtained out of band) as the
    /// active token, deactivating any previous one.
    pub async fn upsert_direct(
        &self,
        platform: Platform,
        upsert: TokenUpsert,
    ) -> Result<PlatformToken> {
        let lock = self.platform_lock(platform).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let grant = TokenEndpointResponse {
            access_token: upsert.access_token.clone(),
            refresh_token: upsert.refresh_token.clone(),
            token_type: upsert.token_type.clone(),
            expires_in: None,
            scope: upsert.scope.clone(),
        };
        let expires_at = upsert.resolve_expiry(now);
        self.swap_active_with_expiry(platform, grant, expires_at)
            .await
    }

    async fn fetch_active(&self, platform: Platform) -> Result<Option<PlatformToken>> {
        Ok(sqlx::query_as::<_, PlatformToken>(
            "SELECT * FROM platform_tokens WHERE platform = ? AND is_active = 1",
        )
        .bind(platform)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn swap_active(
        &self,
        platform: Platform,
        grant: TokenEndpointResponse,
    ) -> Result<PlatformToken> {
        let expires_at = grant
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        self.swap_active_with_expiry(platform, grant, expires_at)
            .await
    }

    async fn swap_active_with_expiry(
        &self,
        platform: Platform,
        grant: TokenEndpointResponse,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<PlatformToken> {
        let id = generate_id();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE platform_tokens SET is_active = 0, updated_at = ? WHERE platform = ? AND is_active = 1",
        )
        .bind(now)
        .bind(platform)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO platform_tokens
                (id, platform, access_token, refresh_token, token_type, scope, expires_at, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(platform)
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(grant.token_type.as_deref().unwrap_or("Bearer"))
        .bind(&grant.scope)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.fetch_active(platform)
            .await?
            .ok_or_else(|| AppError::TokenUnavailable {
                platform: platform.to_string(),
            })
    }
}
