use super::client::{SlackClient, LIST_PAGE_LIMIT};
use super::error::ApiError;
use crate::models::channel::{Channel, ChannelsListResponse, MembersResponse};
use crate::models::message::{HistoryResponse, Message};
use crate::models::ResponseMetadata;

/// One page of conversations.history or conversations.replies.
#[derive(Debug)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

/// Fetches a single page of channel history. `oldest` bounds an incremental
/// sync to messages newer than the watermark; a full sync omits it.
pub async fn history_page(
    client: &SlackClient,
    token: &str,
    channel: &str,
    oldest: Option<&str>,
    cursor: Option<&str>,
    limit: u32,
) -> Result<HistoryPage, ApiError> {
    let mut query = vec![
        ("channel", channel.to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(oldest) = oldest {
        query.push(("oldest", oldest.to_string()));
    }
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor.to_string()));
    }

    let response: HistoryResponse = client.get("conversations.history", token, &query).await?;
    let (messages, next_cursor) = response.into_page();
    Ok(HistoryPage {
        messages,
        next_cursor,
    })
}

/// Fetches a single page of a thread. The response echoes the parent message
/// as its first row; callers skip it when counting.
pub async fn replies_page(
    client: &SlackClient,
    token: &str,
    channel: &str,
    thread_ts: &str,
    cursor: Option<&str>,
    limit: u32,
) -> Result<HistoryPage, ApiError> {
    let mut query = vec![
        ("channel", channel.to_string()),
        ("ts", thread_ts.to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor.to_string()));
    }

    let response: HistoryResponse = client.get("conversations.replies", token, &query).await?;
    let (messages, next_cursor) = response.into_page();
    Ok(HistoryPage {
        messages,
        next_cursor,
    })
}

/// Lists all conversations of the given types, draining every page.
pub async fn list_channels(
    client: &SlackClient,
    token: &str,
    types: &str,
    exclude_archived: bool,
) -> Result<Vec<Channel>, ApiError> {
    let mut all_channels = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let mut query = vec![
            ("limit", LIST_PAGE_LIMIT.to_string()),
            ("types", types.to_string()),
            ("exclude_archived", exclude_archived.to_string()),
        ];
        if let Some(ref c) = cursor {
            query.push(("cursor", c.clone()));
        }

        let response: ChannelsListResponse = client.get("conversations.list", token, &query).await?;
        all_channels.extend(response.channels);

        match ResponseMetadata::cursor(response.response_metadata) {
            Some(next) => {
                cursor = Some(next);
                client.page_pause().await;
            }
            None => break,
        }
    }

    Ok(all_channels)
}

/// Lists every member user id of a conversation, draining every page.
pub async fn member_ids(
    client: &SlackClient,
    token: &str,
    channel: &str,
) -> Result<Vec<String>, ApiError> {
    let mut all_members = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let mut query = vec![
            ("channel", channel.to_string()),
            ("limit", LIST_PAGE_LIMIT.to_string()),
        ];
        if let Some(ref c) = cursor {
            query.push(("cursor", c.clone()));
        }

        let response: MembersResponse = client.get("conversations.members", token, &query).await?;
        all_members.extend(response.members);

        match ResponseMetadata::cursor(response.response_metadata) {
            Some(next) => {
                cursor = Some(next);
                client.page_pause().await;
            }
            None => break,
        }
    }

    Ok(all_members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_client(server: &mockito::ServerGuard) -> SlackClient {
        SlackClient::with_base_url(&server.url())
            .unwrap()
            .with_page_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn history_page_passes_oldest_watermark() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("channel".into(), "C1".into()),
                mockito::Matcher::UrlEncoded("oldest".into(), "100.000100".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok": true, "messages": [{"ts": "200.000200", "user": "U1", "text": "hi"}]}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server);
        let page = history_page(&client, "xoxb-test", "C1", Some("100.000100"), None, 200)
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].ts, "200.000200");
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn list_channels_terminates_after_three_pages() {
        let mut server = mockito::Server::new_async().await;

        // Cursors A -> B -> none. Three pages means exactly three calls.
        // Later-created mocks take precedence, so the cursor-specific pages
        // are registered after the unqualified first page.
        let _page1 = server
            .mock("GET", "/conversations.list")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("types".into(), "public_channel".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok": true, "channels": [{"id": "C1", "name": "one"}], "response_metadata": {"next_cursor": "A"}}"#,
            )
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", "/conversations.list")
            .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "A".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok": true, "channels": [{"id": "C2", "name": "two"}], "response_metadata": {"next_cursor": "B"}}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let _page3 = server
            .mock("GET", "/conversations.list")
            .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "B".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok": true, "channels": [{"id": "C3", "name": "three"}], "response_metadata": {"next_cursor": ""}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server);
        let channels = list_channels(&client, "xoxb-test", "public_channel", true)
            .await
            .unwrap();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].id, "C1");
        assert_eq!(channels[1].id, "C2");
        assert_eq!(channels[2].id, "C3");
    }

    #[tokio::test]
    async fn member_ids_drains_pages() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("GET", "/conversations.members")
            .match_query(mockito::Matcher::UrlEncoded("channel".into(), "C1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok": true, "members": ["U1", "U2"], "response_metadata": {"next_cursor": "X"}}"#,
            )
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", "/conversations.members")
            .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "X".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true, "members": ["U3"]}"#)
            .create_async()
            .await;

        let client = test_client(&server);
        let members = member_ids(&client, "xoxb-test", "C1").await.unwrap();
        assert_eq!(members, vec!["U1", "U2", "U3"]);
    }

    #[tokio::test]
    async fn history_error_aborts_with_slack_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/conversations.history")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": false, "error": "not_in_channel"}"#)
            .create_async()
            .await;

        let client = test_client(&server);
        let err = history_page(&client, "xoxb-test", "C9", None, None, 200)
            .await
            .unwrap_err();
        assert_eq!(err.slack_code(), Some("not_in_channel"));
    }
}
