#![allow(dead_code)] // not every test binary uses every helper

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crosslist::config::{
    LockoutConfig, OAuthConfig, ProviderConfig, RetryConfig,
};
use crosslist::models::{
    error_codes, AutomationResult, ExecutionKind, ProductData, RegistrationAttempt,
};
use crosslist::paths::ExecutionPath;
use crosslist::platforms::Platform;
use crosslist::{db, Result};

pub async fn setup_pool() -> SqlitePool {
    let pool = db::connect_in_memory().await.expect("in-memory pool");
    db::run_migrations(&pool).await.expect("migrations");
    pool
}

pub fn retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        base_delay_ms: 2,
        request_timeout_secs: 5,
    }
}

pub fn lockout_config() -> LockoutConfig {
    LockoutConfig {
        max_attempts: 5,
        cooldown_secs: 3600,
    }
}

pub fn provider(base: &str) -> ProviderConfig {
    ProviderConfig {
        token_url: format!("{}/oauth/token", base),
        api_base_url: base.to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        scope: Some("product.write".to_string()),
    }
}

pub fn oauth_config(base: &str) -> OAuthConfig {
    OAuthConfig {
        naver: provider(base),
        cafe24: provider(base),
        coupang: provider(base),
    }
}

pub fn sample_product() -> ProductData {
    ProductData {
        external_id: "inv-1001".to_string(),
        name: "Vintage Film Camera".to_string(),
        description: "Fully working, light seals replaced".to_string(),
        price: 185_000,
        category: "디지털".to_string(),
        condition: Some("거의새것".to_string()),
        image_urls: vec!["https://cdn.example.com/img/1001-front.jpg".to_string()],
        location: Some("Seoul".to_string()),
        delivery_available: true,
        delivery_fee: Some(3000),
        tags: vec!["camera".to_string()],
        brand: Some("Canon".to_string()),
        model: Some("AE-1".to_string()),
    }
}

/// Execution path with a scripted sequence of outcomes, one per call.
pub struct StubPath {
    kind: ExecutionKind,
    results: Mutex<VecDeque<AutomationResult>>,
}

impl StubPath {
    pub fn new(kind: ExecutionKind, results: Vec<AutomationResult>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            results: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl ExecutionPath for StubPath {
    fn kind(&self) -> ExecutionKind {
        self.kind
    }

    async fn execute(
        &self,
        attempt: &RegistrationAttempt,
        _product: &ProductData,
    ) -> AutomationResult {
        let mut results = self.results.lock().await;
        results.pop_front().unwrap_or_else(|| {
            AutomationResult::failure(
                attempt.platform,
                error_codes::SESSION,
                "stub ran out of scripted results",
            )
        })
    }
}

/// Insert a bare PENDING attempt row, bypassing the orchestrator.
pub async fn insert_pending_attempt(
    pool: &SqlitePool,
    platform: Platform,
    product: &ProductData,
) -> Result<RegistrationAttempt> {
    let attempt = RegistrationAttempt::new(platform, product.external_id.clone(), product.name.clone(), 3);
    let now = chrono::Utc::now();
    sqlx::query(
        r#"
        INSERT INTO registration_attempts
            (id, platform, product_ref, product_name, status, request_data, retry_count, max_retries, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'PENDING', ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&attempt.id)
    .bind(platform)
    .bind(&attempt.product_ref)
    .bind(&attempt.product_name)
    .bind(product.snapshot_json()?)
    .bind(attempt.max_retries)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(attempt)
}
