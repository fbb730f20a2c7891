use super::client::{SlackClient, LIST_PAGE_LIMIT};
use super::error::ApiError;
use crate::models::user::{User, UserInfoResponse, UsersListResponse};
use crate::models::ResponseMetadata;

/// Lists the workspace user directory, draining every page. `limit` caps the
/// total number of users returned (None drains the whole directory).
pub async fn list_users(
    client: &SlackClient,
    token: &str,
    limit: Option<u32>,
) -> Result<Vec<User>, ApiError> {
    let mut all_users: Vec<User> = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let mut query = vec![("limit", LIST_PAGE_LIMIT.to_string())];
        if let Some(ref c) = cursor {
            query.push(("cursor", c.clone()));
        }

        let response: UsersListResponse = client.get("users.list", token, &query).await?;
        all_users.extend(response.members);

        if let Some(limit) = limit {
            if all_users.len() as u32 >= limit {
                all_users.truncate(limit as usize);
                break;
            }
        }

        match ResponseMetadata::cursor(response.response_metadata) {
            Some(next) => {
                cursor = Some(next);
                client.page_pause().await;
            }
            None => break,
        }
    }

    Ok(all_users)
}

/// Looks up one user by Slack id.
pub async fn get_user(client: &SlackClient, token: &str, user_id: &str) -> Result<User, ApiError> {
    let query = vec![("user", user_id.to_string())];
    let response: UserInfoResponse = client.get("users.info", token, &query).await?;
    Ok(response.user)
}
