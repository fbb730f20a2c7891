use serde::{Deserialize, Serialize};

use super::client::SlackClient;
use super::error::ApiError;

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthTestResponse {
    pub team: String,
    pub team_id: String,
    pub user: String,
    pub user_id: String,
}

/// Resolves the workspace and acting identity behind a token.
pub async fn test_auth(client: &SlackClient, token: &str) -> Result<AuthTestResponse, ApiError> {
    client.get("auth.test", token, &[]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_auth_returns_workspace_identity() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/auth.test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok": true, "team": "Acme", "team_id": "T123", "user": "archive-bot", "user_id": "U0BOT"}"#,
            )
            .create_async()
            .await;

        let client = SlackClient::with_base_url(&server.url())
            .unwrap()
            .with_page_delay(Duration::ZERO);
        let auth = test_auth(&client, "xoxb-test").await.unwrap();
        assert_eq!(auth.team_id, "T123");
        assert_eq!(auth.user_id, "U0BOT");
    }
}
