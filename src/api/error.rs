use thiserror::Error;

/// Errors from the Slack Web API client.
///
/// Transport failures and Slack `{ok:false}` domain errors are separate
/// variants so the sync layer can decide between retrying the whole job and
/// aborting a single channel pass.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Http(reqwest::StatusCode),

    #[error("rate limit exceeded after {0} retries")]
    RateLimited(u32),

    /// Well-formed `{ok:false}` response; carries the Slack error code verbatim.
    #[error("slack api error: {0}")]
    Slack(String),

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// True for failures that are worth retrying at the job level.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(_) | ApiError::Http(_) | ApiError::RateLimited(_)
        )
    }

    /// The Slack error code string, when this is a domain error.
    pub fn slack_code(&self) -> Option<&str> {
        match self {
            ApiError::Slack(code) => Some(code),
            _ => None,
        }
    }
}
