use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::models::{
    error_codes, AutomationResult, ExecutionKind, ProductData, RegistrationAttempt,
};
use crate::platforms::{payload, Platform, PlatformRegistry};
use crate::templates::TemplateStore;
use crate::token_manager::TokenManager;
use crate::utils::error::AppError;

use super::ExecutionPath;

/// Registration over a platform's documented HTTP API: bearer token from the
/// token manager, payload built from the product merged with template
/// defaults, one POST per attempt.
pub struct DirectApiPath {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    templates: TemplateStore,
    registry: Arc<PlatformRegistry>,
    request_timeout: Duration,
}

impl DirectApiPath {
    pub fn new(
        tokens: Arc<TokenManager>,
        templates: TemplateStore,
        registry: Arc<PlatformRegistry>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            templates,
            registry,
            request_timeout,
        }
    }

    fn submit_url(base: &str, platform: Platform) -> String {
        let path = match platform {
            Platform::Naver => "/v1/products",
            Platform::Cafe24 => "/api/v2/admin/products",
            Platform::Coupang => "/v2/providers/seller_api/apis/api/v1/marketplace/seller-products",
            _ => "/products",
        };
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    async fn run(
        &self,
        attempt: &RegistrationAttempt,
        product: &ProductData,
    ) -> AutomationResult {
        let platform = attempt.platform;

        let token = match self.tokens.get_token(platform).await {
            Ok(token) => token,
            Err(err) => {
                warn!(%platform, attempt_id = %attempt.id, %err, "no usable token");
                return AutomationResult::failure(platform, error_codes::AUTH, err.to_string());
            }
        };

        let template = match self.templates.select(platform, ExecutionKind::Api).await {
            Ok(template) => template,
            Err(err @ AppError::NoTemplateAvailable { .. }) => {
                return AutomationResult::failure(
                    platform,
                    error_codes::NO_TEMPLATE,
                    err.to_string(),
                );
            }
            Err(err) => {
                return AutomationResult::failure(platform, error_codes::NETWORK, err.to_string());
            }
        };

        let body = match self.build_body(platform, product, &template) {
            Ok(body) => body,
            Err(err) => {
                return AutomationResult::failure(
                    platform,
                    error_codes::VALIDATION,
                    err.to_string(),
                );
            }
        };

        let spec = match self.registry.spec(platform) {
            Ok(spec) => spec,
            Err(err) => {
                return AutomationResult::failure(
                    platform,
                    error_codes::UNSUPPORTED_PLATFORM,
                    err.to_string(),
                );
            }
        };
        let base = spec.api_base_url.as_deref().unwrap_or_default();
        let url = Self::submit_url(base, platform);

        debug!(%platform, attempt_id = %attempt.id, %url, "submitting product");
        let response = self
            .http
            .post(&url)
            .timeout(self.request_timeout)
            .bearer_auth(&token.access_token)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(response) => self.map_response(platform, response).await,
            Err(err) if err.is_timeout() => {
                AutomationResult::failure(platform, error_codes::TIMEOUT, err.to_string())
            }
            Err(err) => AutomationResult::failure(platform, error_codes::NETWORK, err.to_string()),
        }
    }

    fn build_body(
        &self,
        platform: Platform,
        product: &ProductData,
        template: &crate::models::RegistrationTemplate,
    ) -> crate::Result<serde_json::Value> {
        let built = payload::build_payload(platform, product)?;
        let defaults = template.data()?;
        Ok(payload::merge_template_defaults(built, &defaults))
    }

    async fn map_response(
        &self,
        platform: Platform,
        response: reqwest::Response,
    ) -> AutomationResult {
        let status = response.status();

        if status.is_success() {
            let body: serde_json::Value = match response.json().await {
                Ok(body) => body,
                Err(err) => {
                    return AutomationResult::failure(
                        platform,
                        error_codes::NETWORK,
                        format!("unreadable response body: {}", err),
                    );
                }
            };
            let (product_id, product_url) = payload::extract_listing(platform, &body);
            return AutomationResult::success(platform, product_id, product_url)
                .with_response_body(body.to_string());
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::TOO_MANY_REQUESTS => AutomationResult::failure(
                platform,
                error_codes::RATE_LIMIT,
                format!("rate limited: {}", status),
            )
            .with_details(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AutomationResult::failure(
                platform,
                error_codes::AUTH,
                format!("platform rejected credentials: {}", status),
            )
            .with_details(body),
            status if status.is_client_error() => AutomationResult::failure(
                platform,
                error_codes::VALIDATION,
                format!("platform rejected submission: {}", status),
            )
            .with_details(body),
            status => AutomationResult::failure(
                platform,
                error_codes::NETWORK,
                format!("platform error: {}", status),
            )
            .with_details(body),
        }
    }
}

#[async_trait]
impl ExecutionPath for DirectApiPath {
    fn kind(&self) -> ExecutionKind {
        ExecutionKind::Api
    }

    async fn execute(
        &self,
        attempt: &RegistrationAttempt,
        product: &ProductData,
    ) -> AutomationResult {
        let mut result = self.run(attempt, product).await;
        result.mark_completed();
        result
    }
}
