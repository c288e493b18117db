use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::config::OAuthConfig;
use crate::models::ExecutionKind;
use crate::utils::error::{AppError, Result};

pub mod payload;
pub mod selectors;

pub use selectors::SelectorSet;

/// Marketplace targets. A closed set: anything else is rejected as
/// `UnsupportedPlatform` before any state is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum Platform {
    #[sqlx(rename = "naver")]
    Naver,
    #[sqlx(rename = "cafe24")]
    Cafe24,
    #[sqlx(rename = "coupang")]
    Coupang,
    #[sqlx(rename = "bunjang")]
    Bunjang,
    #[sqlx(rename = "danggeun")]
    Danggeun,
    #[sqlx(rename = "junggonara")]
    Junggonara,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Naver,
        Platform::Cafe24,
        Platform::Coupang,
        Platform::Bunjang,
        Platform::Danggeun,
        Platform::Junggonara,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Naver => "naver",
            Platform::Cafe24 => "cafe24",
            Platform::Coupang => "coupang",
            Platform::Bunjang => "bunjang",
            Platform::Danggeun => "danggeun",
            Platform::Junggonara => "junggonara",
        }
    }

    pub fn execution_kind(self) -> ExecutionKind {
        match self {
            Platform::Naver | Platform::Cafe24 | Platform::Coupang => ExecutionKind::Api,
            Platform::Bunjang | Platform::Danggeun | Platform::Junggonara => {
                ExecutionKind::Automation
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "naver" => Ok(Platform::Naver),
            "cafe24" => Ok(Platform::Cafe24),
            "coupang" => Ok(Platform::Coupang),
            "bunjang" => Ok(Platform::Bunjang),
            "danggeun" => Ok(Platform::Danggeun),
            "junggonara" => Ok(Platform::Junggonara),
            _ => Err(AppError::UnsupportedPlatform {
                name: s.to_string(),
            }),
        }
    }
}

// Consumer-site entry points for the automation platforms
pub const BUNJANG_LOGIN_URL: &str = "https://m.bunjang.co.kr/login";
pub const BUNJANG_REGISTER_URL: &str = "https://m.bunjang.co.kr/products/new";
pub const DANGGEUN_LOGIN_URL: &str = "https://www.daangn.com/login";
pub const DANGGEUN_REGISTER_URL: &str = "https://www.daangn.com/products/new";
pub const JUNGGONARA_LOGIN_URL: &str = "https://www.joonggonara.co.kr/login";
pub const JUNGGONARA_REGISTER_URL: &str = "https://www.joonggonara.co.kr/write";

/// Everything the execution paths need to know about one platform.
#[derive(Debug, Clone)]
pub struct PlatformSpec {
    pub platform: Platform,
    pub kind: ExecutionKind,
    pub token_url: Option<String>,
    pub api_base_url: Option<String>,
    pub login_url: Option<&'static str>,
    pub register_url: Option<&'static str>,
    pub selectors: Option<&'static SelectorSet>,
}

/// Startup-validated dispatch table mapping platform -> endpoints, payload
/// builder and selector set. Replaces ad hoc string switches: a platform
/// missing its configuration is a load-time error, not a runtime surprise.
#[derive(Debug)]
pub struct PlatformRegistry {
    specs: HashMap<Platform, PlatformSpec>,
}

impl PlatformRegistry {
    pub fn from_config(oauth: &OAuthConfig) -> Result<Self> {
        let mut specs = HashMap::new();

        for platform in Platform::ALL {
            let spec = match platform.execution_kind() {
                ExecutionKind::Api => {
                    let provider = oauth.provider(platform).ok_or_else(|| {
                        AppError::Validation(format!(
                            "missing oauth configuration for platform: {}",
                            platform
                        ))
                    })?;
                    for (label, value) in [
                        ("token_url", &provider.token_url),
                        ("api_base_url", &provider.api_base_url),
                    ] {
                        if Url::parse(value).is_err() {
                            return Err(AppError::Validation(format!(
                                "invalid {} for platform {}: {}",
                                label, platform, value
                            )));
                        }
                    }
                    PlatformSpec {
                        platform,
                        kind: ExecutionKind::Api,
                        token_url: Some(provider.token_url.clone()),
                        api_base_url: Some(provider.api_base_url.clone()),
                        login_url: None,
                        register_url: None,
                        selectors: None,
                    }
                }
                ExecutionKind::Automation => {
                    let selectors = selectors::selector_set(platform).ok_or_else(|| {
                        AppError::Validation(format!(
                            "missing selector set for automation platform: {}",
                            platform
                        ))
                    })?;
                    let (login_url, register_url) = match platform {
                        Platform::Bunjang => (BUNJANG_LOGIN_URL, BUNJANG_REGISTER_URL),
                        Platform::Danggeun => (DANGGEUN_LOGIN_URL, DANGGEUN_REGISTER_URL),
                        Platform::Junggonara => (JUNGGONARA_LOGIN_URL, JUNGGONARA_REGISTER_URL),
                        _ => unreachable!("api platforms handled above"),
                    };
                    PlatformSpec {
                        platform,
                        kind: ExecutionKind::Automation,
                        token_url: None,
                        api_base_url: None,
                        login_url: Some(login_url),
                        register_url: Some(register_url),
                        selectors: Some(selectors),
                    }
                }
            };
            specs.insert(platform, spec);
        }

        Ok(Self { specs })
    }

    pub fn spec(&self, platform: Platform) -> Result<&PlatformSpec> {
        self.specs
            .get(&platform)
            .ok_or_else(|| AppError::UnsupportedPlatform {
                name: platform.to_string(),
            })
    }

    pub fn token_url(&self, platform: Platform) -> Result<&str> {
        self.spec(platform)?
            .token_url
            .as_deref()
            .ok_or_else(|| AppError::Validation(format!("platform {} has no token endpoint", platform)))
    }
}
