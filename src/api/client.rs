use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::error::ApiError;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Maximum page size Slack accepts for conversations.history / replies.
pub const HISTORY_PAGE_LIMIT: u32 = 200;
/// Maximum page size for conversations.list / conversations.members / users.list.
pub const LIST_PAGE_LIMIT: u32 = 1000;

const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    error: Option<String>,
}

/// Thin Slack Web API wrapper. Tokens are attached per call: the caller picks
/// the bot token or a user token depending on the channel being read.
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    page_delay: Duration,
}

impl SlackClient {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(SLACK_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_delay: DEFAULT_PAGE_DELAY,
        })
    }

    /// Overrides the fixed inter-page delay. Tests set this to zero.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Fixed pause between paginated calls to stay under Slack's rate limits.
    pub async fn page_pause(&self) {
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
    }

    pub async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut retry_count = 0;

        loop {
            debug!(endpoint, "GET {}", url);

            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(query)
                .send()
                .await?;
            let status = response.status();

            // 429 is the one transport condition handled here: Slack tells us
            // exactly how long to wait, bounded by a retry budget.
            if status.as_u16() == 429 {
                if retry_count >= MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited(retry_count));
                }
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                warn!(
                    endpoint,
                    retry_after,
                    retry = retry_count + 1,
                    "rate limited, backing off"
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(ApiError::Http(status));
            }

            let body = response.text().await?;

            if let Ok(envelope) = serde_json::from_str::<Envelope>(&body) {
                if !envelope.ok {
                    let code = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
                    return Err(ApiError::Slack(code));
                }
            }

            return serde_json::from_str::<T>(&body).map_err(|source| ApiError::Decode {
                endpoint: endpoint.to_string(),
                source,
            });
        }
    }

    /// Fetches a Slack-hosted file (url_private requires the bearer token).
    pub async fn download(&self, url: &str, token: &str) -> Result<Vec<u8>, ApiError> {
        debug!("GET {}", url);
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http(status));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
