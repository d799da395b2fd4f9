// src/lib.rs
use std::env;
use std::time::Duration;

use log::error;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Response, Url};
use thiserror::Error;

pub mod flag;
pub mod resolver;
pub mod selector;
pub mod source;
mod test_support;
mod tests;

pub use crate::flag::{FeatureFlag, FlagStatus, COD_FLAG};
pub use crate::resolver::{Failure, FailureKind, FlagResolver, ResolverPhase, ResolverState};
pub use crate::selector::{
    render, ParsePaymentMethodError, PaymentForm, PaymentMethod, PaymentOption, PaymentOptions,
    PaymentView, SelectionError,
};
pub use crate::source::{FlagSource, MemorySource};

use crate::flag::ErrorBody;

const BASE_URL: &str = "http://localhost:8084";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Overrides the flag service address used by [`Client::builder`].
pub const BASE_URL_ENV: &str = "FEATURE_TOGGLE_URL";

pub struct Flag<'a> {
    name: String,
    client: &'a Client,
}

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid flag name: {0:?}")]
    InvalidName(String),

    #[error("Flag not found: {0}")]
    NotFound(String),
}

/// HTTP client for the remote flag service.
///
/// Reads fail closed: [`Client::read_flag`], [`Flag::enabled`] and
/// [`Client::list_flags`] log the failure and fall back to a disabled or
/// empty answer. Writes always report failure to the caller.
pub struct Client {
    base_url: Url,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn debug_info(&self) -> String {
        format!(
            "Client {{ base_url: {}, timeout: {:?} }}",
            self.base_url, self.timeout
        )
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn is(&self, name: &str) -> Flag<'_> {
        Flag {
            name: name.to_string(),
            client: self,
        }
    }

    pub async fn read_flag(&self, name: &str) -> bool {
        match self.fetch_flag(name).await {
            Ok(enabled) => enabled,
            Err(e) => {
                error!("Error checking feature flag {}: {}", name, e);
                false
            }
        }
    }

    /// Fallible form of [`Client::read_flag`].
    pub async fn fetch_flag(&self, name: &str) -> Result<bool, FlagError> {
        let url = self.endpoint(Some(name))?;
        let response = self.http_client.get(url).send().await?;
        let status = ensure_success(response)
            .await?
            .json::<FlagStatus>()
            .await?;
        Ok(status.enabled)
    }

    pub async fn write_flag(&self, name: &str, enabled: bool) -> Result<(), FlagError> {
        let result = self.post_flag(name, enabled).await;
        if let Err(e) = &result {
            error!("Error setting feature flag {}: {}", name, e);
        }
        result
    }

    pub async fn list_flags(&self) -> Vec<FeatureFlag> {
        match self.fetch_flags().await {
            Ok(flags) => flags,
            Err(e) => {
                error!("Error fetching feature flags: {}", e);
                Vec::new()
            }
        }
    }

    async fn post_flag(&self, name: &str, enabled: bool) -> Result<(), FlagError> {
        let url = self.endpoint(Some(name))?;
        let response = self
            .http_client
            .post(url)
            .json(&FlagStatus { enabled })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn fetch_flags(&self) -> Result<Vec<FeatureFlag>, FlagError> {
        let url = self.endpoint(None)?;
        let response = self.http_client.get(url).send().await?;
        let flags = ensure_success(response)
            .await?
            .json::<Vec<FeatureFlag>>()
            .await?;
        Ok(flags)
    }

    // `{base}/api/flags[/{name}]`, with the name as one encoded segment.
    fn endpoint(&self, name: Option<&str>) -> Result<Url, FlagError> {
        if let Some(name) = name {
            validate_name(name)?;
        }

        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                FlagError::ConfigError(format!("base URL cannot hold a path: {}", self.base_url))
            })?;
            segments.pop_if_empty().extend(["api", "flags"]);
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }
}

impl<'a> Flag<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn enabled(&self) -> bool {
        self.client.read_flag(&self.name).await
    }

    pub async fn set(&self, enabled: bool) -> Result<(), FlagError> {
        self.client.write_flag(&self.name, enabled).await
    }
}

pub struct ClientBuilder {
    base_url: String,
    timeout: Duration,
}

impl ClientBuilder {
    fn new() -> Self {
        let base_url = env::var(BASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| BASE_URL.to_string());

        Self {
            base_url,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Client, FlagError> {
        let base_url = Url::parse(&self.base_url).map_err(|e| {
            FlagError::ConfigError(format!("invalid base URL {}: {}", self.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(FlagError::ConfigError(format!(
                "base URL cannot hold a path: {}",
                self.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Checkout-Flags-Rust"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Client {
            base_url,
            http_client,
            timeout: self.timeout,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), FlagError> {
    if name.trim().is_empty() {
        return Err(FlagError::InvalidName(name.to_string()));
    }
    Ok(())
}

async fn ensure_success(response: Response) -> Result<Response, FlagError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    if detail.trim().is_empty() {
        Err(FlagError::ApiError(format!("Unexpected status code: {}", status)))
    } else {
        Err(FlagError::ApiError(format!(
            "Unexpected status code: {}: {}",
            status,
            detail.trim()
        )))
    }
}
