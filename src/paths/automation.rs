use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use regex::Regex;
use scraper::{Html, Selector};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::account_manager::AccountManager;
use crate::config::AutomationConfig;
use crate::models::{
    error_codes, AutomationResult, ExecutionKind, ProductData, RegistrationAttempt,
};
use crate::platforms::{PlatformRegistry, SelectorSet};
use crate::templates::TemplateStore;
use crate::utils::error::{AppError, Result};

use super::ExecutionPath;

/// Bounded pool of Chrome instances. Browsers launch lazily on first
/// acquire, so constructing the pool never requires Chrome to be installed;
/// a missing binary surfaces as a session error on the first automation run.
pub struct DriverPool {
    config: AutomationConfig,
    semaphore: Arc<Semaphore>,
    browsers: Mutex<Vec<Arc<Browser>>>,
    next: AtomicUsize,
}

/// One leased tab. Holding the session holds a pool permit; dropping it
/// closes the tab and frees the slot.
pub struct BrowserSession {
    pub tab: Arc<Tab>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let _ = self.tab.close(true);
    }
}

impl DriverPool {
    pub fn new(config: AutomationConfig) -> Self {
        let permits = config.pool_size;
        Self {
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            browsers: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
        }
    }

    pub async fn acquire(&self) -> Result<BrowserSession> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Automation("browser pool closed".to_string()))?;

        let browser = self.checkout_browser().await?;
        let tab = tokio::task::spawn_blocking(move || browser.new_tab())
            .await
            .map_err(|e| AppError::Automation(format!("tab task panicked: {}", e)))?
            .map_err(|e| AppError::Automation(format!("failed to open tab: {}", e)))?;

        if let Some(user_agent) = &self.config.user_agent {
            tab.set_user_agent(user_agent, None, None)
                .map_err(|e| AppError::Automation(format!("failed to set user agent: {}", e)))?;
        }

        Ok(BrowserSession {
            tab,
            _permit: permit,
        })
    }

    async fn checkout_browser(&self) -> Result<Arc<Browser>> {
        let mut browsers = self.browsers.lock().await;

        if browsers.len() < self.config.pool_size {
            let config = self.config.clone();
            let browser = tokio::task::spawn_blocking(move || launch_browser(&config))
                .await
                .map_err(|e| AppError::Automation(format!("launch task panicked: {}", e)))?
                .map_err(|e| AppError::Automation(format!("failed to launch browser: {}", e)))?;
            let browser = Arc::new(browser);
            browsers.push(browser.clone());
            info!(pool_size = browsers.len(), "launched browser instance");
            return Ok(browser);
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % browsers.len();
        Ok(browsers[index].clone())
    }
}

fn launch_browser(config: &AutomationConfig) -> anyhow::Result<Browser> {
    let mut launch_options = LaunchOptions::default_builder()
        .headless(config.headless)
        .sandbox(false)
        .window_size(Some((config.window_width, config.window_height)))
        .args(vec![
            std::ffi::OsStr::new("--no-sandbox"),
            std::ffi::OsStr::new("--disable-dev-shm-usage"),
            std::ffi::OsStr::new("--disable-gpu"),
            std::ffi::OsStr::new("--disable-extensions"),
            std::ffi::OsStr::new("--disable-background-timer-throttling"),
            std::ffi::OsStr::new("--disable-backgrounding-occluded-windows"),
            std::ffi::OsStr::new("--disable-renderer-backgrounding"),
        ])
        .build()
        .map_err(|e| anyhow!("failed to build launch options: {}", e))?;

    if let Some(chrome_path) = &config.chrome_path {
        launch_options.path = Some(std::path::PathBuf::from(chrome_path));
    }

    Browser::new(launch_options).map_err(|e| anyhow!("failed to launch browser: {}", e))
}

enum LoginOutcome {
    Success,
    Rejected(String),
}

/// Registration through a scripted browser session: pick an unlocked
/// account, log in, fill the listing form, submit, read the listing id out
/// of the resulting URL. Account eligibility and template lookup run before
/// any browser slot is taken.
pub struct BrowserAutomationPath {
    pool: Arc<DriverPool>,
    accounts: Arc<AccountManager>,
    templates: TemplateStore,
    registry: Arc<PlatformRegistry>,
    config: AutomationConfig,
}

impl BrowserAutomationPath {
    pub fn new(
        pool: Arc<DriverPool>,
        accounts: Arc<AccountManager>,
        templates: TemplateStore,
        registry: Arc<PlatformRegistry>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            pool,
            accounts,
            templates,
            registry,
            config,
        }
    }

    fn nav_timeout(&self) -> Duration {
        Duration::from_secs(self.config.nav_timeout_secs)
    }

    /// Ceiling on the whole login-and-submit flow.
    fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.config.nav_timeout_secs * 5)
    }

    async fn run(
        &self,
        attempt: &RegistrationAttempt,
        product: &ProductData,
    ) -> AutomationResult {
        let platform = attempt.platform;

        let account = match self.accounts.pick_unlocked(platform).await {
            Ok(account) => account,
            Err(err @ AppError::NoEligibleAccount { .. }) => {
                warn!(%platform, attempt_id = %attempt.id, "no unlocked account");
                return AutomationResult::failure(
                    platform,
                    error_codes::NO_ELIGIBLE_ACCOUNT,
                    err.to_string(),
                );
            }
            Err(err) => {
                return AutomationResult::failure(platform, error_codes::SESSION, err.to_string());
            }
        };

        let password = match self.accounts.decrypted_password(&account) {
            Ok(password) => password,
            Err(err) => {
                return AutomationResult::failure(platform, error_codes::AUTH, err.to_string());
            }
        };

        if let Err(err) = self
            .templates
            .select(platform, ExecutionKind::Automation)
            .await
        {
            let code = match err {
                AppError::NoTemplateAvailable { .. } => error_codes::NO_TEMPLATE,
                _ => error_codes::SESSION,
            };
            return AutomationResult::failure(platform, code, err.to_string());
        }

        let spec = match self.registry.spec(platform) {
            Ok(spec) => spec.clone(),
            Err(err) => {
                return AutomationResult::failure(
                    platform,
                    error_codes::UNSUPPORTED_PLATFORM,
                    err.to_string(),
                );
            }
        };
        let (selectors, login_url, register_url) =
            match (spec.selectors, spec.login_url, spec.register_url) {
                (Some(s), Some(l), Some(r)) => (s, l, r),
                _ => {
                    return AutomationResult::failure(
                        platform,
                        error_codes::UNSUPPORTED_PLATFORM,
                        format!("platform {} is not configured for automation", platform),
                    );
                }
            };

        let session = match self.pool.acquire().await {
            Ok(session) => session,
            Err(err) => {
                warn!(%platform, attempt_id = %attempt.id, %err, "browser unavailable");
                return AutomationResult::failure(platform, error_codes::SESSION, err.to_string());
            }
        };

        // Login phase
        let tab = session.tab.clone();
        let username = account.username.clone();
        let timeout = self.nav_timeout();
        let login_url = login_url.to_string();
        let login = tokio::task::spawn_blocking(move || {
            perform_login(&tab, &login_url, selectors, &username, &password, timeout)
        })
        .await;

        let login = match login {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                let result =
                    AutomationResult::failure(platform, error_codes::SESSION, err.to_string());
                return self.with_failure_screenshot(&session, result).await;
            }
            Err(err) => {
                return AutomationResult::failure(
                    platform,
                    error_codes::SESSION,
                    format!("login task panicked: {}", err),
                );
            }
        };

        match login {
            LoginOutcome::Success => {
                if let Err(err) = self
                    .accounts
                    .record_attempt(platform, &account.username, true)
                    .await
                {
                    warn!(username = %account.username, %err, "failed to record login success");
                }
            }
            LoginOutcome::Rejected(reason) => {
                if let Err(err) = self
                    .accounts
                    .record_attempt(platform, &account.username, false)
                    .await
                {
                    warn!(username = %account.username, %err, "failed to record login failure");
                }
                let result = AutomationResult::failure(
                    platform,
                    error_codes::AUTH,
                    format!("login rejected for {}: {}", account.username, reason),
                );
                return self.with_failure_screenshot(&session, result).await;
            }
        }

        // Submission phase
        let tab = session.tab.clone();
        let product = product.clone();
        let timeout = self.nav_timeout();
        let register_url = register_url.to_string();
        let submission = tokio::task::spawn_blocking(move || {
            submit_listing(&tab, &register_url, selectors, &product, timeout)
        })
        .await;

        match submission {
            Ok(Ok((product_id, listing_url))) => {
                debug!(%platform, attempt_id = %attempt.id, ?product_id, "listing submitted");
                AutomationResult::success(platform, product_id, listing_url)
            }
            Ok(Err(SubmitError::Rejected(reason))) => {
                let result = AutomationResult::failure(platform, error_codes::VALIDATION, reason);
                self.with_failure_screenshot(&session, result).await
            }
            Ok(Err(SubmitError::Timeout(reason))) => {
                let result = AutomationResult::failure(platform, error_codes::TIMEOUT, reason);
                self.with_failure_screenshot(&session, result).await
            }
            Ok(Err(SubmitError::Other(err))) => {
                let result =
                    AutomationResult::failure(platform, error_codes::SESSION, err.to_string());
                self.with_failure_screenshot(&session, result).await
            }
            Err(err) => AutomationResult::failure(
                platform,
                error_codes::SESSION,
                format!("submission task panicked: {}", err),
            ),
        }
    }

    async fn with_failure_screenshot(
        &self,
        session: &BrowserSession,
        result: AutomationResult,
    ) -> AutomationResult {
        let tab = session.tab.clone();
        let dir = self.config.screenshot_dir.clone();
        let path = tokio::task::spawn_blocking(move || take_screenshot(&tab, &dir))
            .await
            .ok()
            .flatten();
        match path {
            Some(path) => result.with_screenshot(path),
            None => result,
        }
    }
}

#[async_trait]
impl ExecutionPath for BrowserAutomationPath {
    fn kind(&self) -> ExecutionKind {
        ExecutionKind::Automation
    }

    async fn execute(
        &self,
        attempt: &RegistrationAttempt,
        product: &ProductData,
    ) -> AutomationResult {
        let mut result =
            match tokio::time::timeout(self.overall_timeout(), self.run(attempt, product)).await {
                Ok(result) => result,
                Err(_) => AutomationResult::failure(
                    attempt.platform,
                    error_codes::TIMEOUT,
                    format!(
                        "automation exceeded {}s",
                        self.overall_timeout().as_secs()
                    ),
                ),
            };
        result.mark_completed();
        result
    }
}

fn perform_login(
    tab: &Tab,
    login_url: &str,
    selectors: &SelectorSet,
    username: &str,
    password: &str,
    timeout: Duration,
) -> anyhow::Result<LoginOutcome> {
    tab.navigate_to(login_url)
        .map_err(|e| anyhow!("navigation to login page failed: {}", e))?;
    tab.wait_until_navigated()
        .map_err(|e| anyhow!("login page did not load: {}", e))?;

    tab.wait_for_element_with_custom_timeout(selectors.login_username, timeout)
        .map_err(|e| anyhow!("username field not found: {}", e))?
        .type_into(username)
        .map_err(|e| anyhow!("could not type username: {}", e))?;
    tab.find_element(selectors.login_password)
        .map_err(|e| anyhow!("password field not found: {}", e))?
        .type_into(password)
        .map_err(|e| anyhow!("could not type password: {}", e))?;
    tab.find_element(selectors.login_submit)
        .map_err(|e| anyhow!("login button not found: {}", e))?
        .click()
        .map_err(|e| anyhow!("could not click login: {}", e))?;

    if tab
        .wait_for_element_with_custom_timeout(selectors.login_success, timeout)
        .is_ok()
    {
        return Ok(LoginOutcome::Success);
    }

    // No logged-in marker; the site either showed an error or just stalled.
    let reason = tab
        .get_content()
        .ok()
        .and_then(|html| extract_error_text(&html, selectors.error_indicator))
        .unwrap_or_else(|| "login confirmation never appeared".to_string());
    Ok(LoginOutcome::Rejected(reason))
}

enum SubmitError {
    Rejected(String),
    Timeout(String),
    Other(anyhow::Error),
}

impl From<anyhow::Error> for SubmitError {
    fn from(err: anyhow::Error) -> Self {
        SubmitError::Other(err)
    }
}

fn submit_listing(
    tab: &Tab,
    register_url: &str,
    selectors: &SelectorSet,
    product: &ProductData,
    timeout: Duration,
) -> std::result::Result<(Option<String>, Option<String>), SubmitError> {
    tab.navigate_to(register_url)
        .map_err(|e| anyhow!("navigation to listing form failed: {}", e))?;
    tab.wait_until_navigated()
        .map_err(|e| anyhow!("listing form did not load: {}", e))?;

    tab.wait_for_element_with_custom_timeout(selectors.product_name, timeout)
        .map_err(|e| SubmitError::Timeout(format!("listing form never appeared: {}", e)))?
        .type_into(&product.name)
        .map_err(|e| anyhow!("could not type product name: {}", e))?;
    tab.find_element(selectors.product_price)
        .map_err(|e| anyhow!("price field not found: {}", e))?
        .type_into(&product.price.to_string())
        .map_err(|e| anyhow!("could not type price: {}", e))?;
    tab.find_element(selectors.product_description)
        .map_err(|e| anyhow!("description field not found: {}", e))?
        .type_into(&product.description)
        .map_err(|e| anyhow!("could not type description: {}", e))?;

    tab.find_element(selectors.submit_button)
        .map_err(|e| anyhow!("submit button not found: {}", e))?
        .click()
        .map_err(|e| anyhow!("could not click submit: {}", e))?;

    if tab
        .wait_for_element_with_custom_timeout(selectors.success_indicator, timeout)
        .is_err()
    {
        if let Some(reason) = tab
            .get_content()
            .ok()
            .and_then(|html| extract_error_text(&html, selectors.error_indicator))
        {
            return Err(SubmitError::Rejected(reason));
        }
        return Err(SubmitError::Timeout(
            "listing confirmation never appeared".to_string(),
        ));
    }

    let final_url = tab.get_url();
    let product_id = Regex::new(selectors.listing_url_pattern)
        .ok()
        .and_then(|re| re.captures(&final_url).map(|c| c[1].to_string()));
    let listing_url = if final_url.is_empty() {
        None
    } else {
        Some(final_url)
    };
    Ok((product_id, listing_url))
}

/// Text of the page's error banner, if one rendered.
fn extract_error_text(html: &str, selector: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(selector).ok()?;
    let text = document
        .select(&selector)
        .flat_map(|element| element.text())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn take_screenshot(tab: &Tab, dir: &str) -> Option<String> {
    let data = tab
        .capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        )
        .ok()?;

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!("failure_{}_{}.png", timestamp, crate::models::generate_id());
    let path = Path::new(dir).join(&filename);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    std::fs::write(&path, data).ok()?;
    Some(path.to_string_lossy().to_string())
}
