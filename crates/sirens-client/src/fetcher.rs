use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use sirens_core::config::CrawlConfig;
use sirens_core::error::AppError;
use sirens_core::models::FetchResponse;
use sirens_core::traits::Fetcher;

pub const DEFAULT_USER_AGENT: &str = concat!("sirens/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP fetcher using reqwest.
///
/// Returns the raw body bytes; charset detection happens downstream, so
/// nothing here decodes text. `Content-Encoding: gzip` is undone by reqwest,
/// while gzip *files* (`sitemap.xml.gz`) arrive compressed.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    user_agent: String,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_options(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)
    }

    pub fn with_options(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Build from the crawl config's `user_agent` and `timeout` settings.
    pub fn from_config(config: &CrawlConfig) -> Result<Self, AppError> {
        let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let timeout = config
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        Self::with_options(user_agent, timeout)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(
            url = %final_url,
            status = status.as_u16(),
            bytes = content.len(),
            "Fetched"
        );
        Ok(FetchResponse {
            url: final_url,
            status: status.as_u16(),
            content_type,
            content: content.to_vec(),
        })
    }
}
