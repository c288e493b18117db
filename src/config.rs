use config::{Config, Environment, File};
use serde::Deserialize;

use crate::platforms::Platform;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub oauth: OAuthConfig,
    pub automation: AutomationConfig,
    pub retry: RetryConfig,
    pub lockout: LockoutConfig,
    pub security: SecurityConfig,
    pub sweeper: SweeperConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// OAuth client settings for one direct-API platform.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub token_url: String,
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub naver: ProviderConfig,
    pub cafe24: ProviderConfig,
    pub coupang: ProviderConfig,
}

impl OAuthConfig {
    /// Provider settings for an API platform; None for automation platforms.
    pub fn provider(&self, platform: Platform) -> Option<&ProviderConfig> {
        match platform {
            Platform::Naver => Some(&self.naver),
            Platform::Cafe24 => Some(&self.cafe24),
            Platform::Coupang => Some(&self.coupang),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    /// Upper bound on concurrently open browsers.
    pub pool_size: usize,
    pub nav_timeout_secs: u64,
    pub window_width: u32,
    pub window_height: u32,
    pub screenshot_dir: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_retries: i32,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    /// Consecutive failures before an account is locked.
    pub max_attempts: i32,
    pub cooldown_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Key material for AES-GCM password encryption. Minimum 16 characters.
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    /// Six-field cron expression.
    pub schedule: String,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Layered load: defaults, then `config/default` and
    /// `config/{CROSSLIST_RUN_MODE}` files, then `config/local` overrides,
    /// then environment variables with the CROSSLIST prefix and double
    /// underscore as section separator (CROSSLIST__DATABASE__URL etc).
    pub fn from_env() -> Result<Self> {
        let run_mode =
            std::env::var("CROSSLIST_RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("database.url", "sqlite:crosslist.db")?
            .set_default("database.max_connections", 5)?
            .set_default("automation.headless", true)?
            .set_default("automation.pool_size", 2)?
            .set_default("automation.nav_timeout_secs", 30)?
            .set_default("automation.window_width", 1280)?
            .set_default("automation.window_height", 1024)?
            .set_default("automation.screenshot_dir", "screenshots")?
            .set_default("retry.max_retries", 3)?
            .set_default("retry.base_delay_ms", 2000)?
            .set_default("retry.request_timeout_secs", 30)?
            .set_default("lockout.max_attempts", 5)?
            .set_default("lockout.cooldown_secs", 3600)?
            .set_default("sweeper.enabled", true)?
            .set_default("sweeper.schedule", "0 */5 * * * *")?
            .set_default("sweeper.max_concurrent", 2)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9187)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("CROSSLIST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.encryption_key.len() < 16 {
            return Err(AppError::Validation(
                "security.encryption_key must be at least 16 characters".to_string(),
            ));
        }
        if self.automation.pool_size == 0 {
            return Err(AppError::Validation(
                "automation.pool_size must be at least 1".to_string(),
            ));
        }
        if self.retry.max_retries < 0 {
            return Err(AppError::Validation(
                "retry.max_retries must not be negative".to_string(),
            ));
        }
        if self.lockout.max_attempts < 1 {
            return Err(AppError::Validation(
                "lockout.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.lockout.cooldown_secs < 1 {
            return Err(AppError::Validation(
                "lockout.cooldown_secs must be at least 1".to_string(),
            ));
        }
        for platform in [Platform::Naver, Platform::Cafe24, Platform::Coupang] {
            let provider = self
                .oauth
                .provider(platform)
                .ok_or_else(|| AppError::Validation(format!("missing oauth section for {}", platform)))?;
            if provider.client_id.is_empty() || provider.client_secret.is_empty() {
                return Err(AppError::Validation(format!(
                    "oauth credentials for {} are incomplete",
                    platform
                )));
            }
        }
        Ok(())
    }
}
