use super::client::SlackClient;
use super::error::ApiError;
use crate::models::file::{FileObject, FilesListResponse};

const FILES_PAGE_COUNT: u32 = 200;

/// Lists workspace files. files.list uses page-number paging, not cursors;
/// pages are drained until `paging.page == paging.pages` or `limit` is hit.
pub async fn list_files(
    client: &SlackClient,
    token: &str,
    limit: Option<u32>,
    channel: Option<&str>,
) -> Result<Vec<FileObject>, ApiError> {
    let mut all_files: Vec<FileObject> = Vec::new();
    let mut page = 1u32;

    loop {
        let mut query = vec![
            ("count", FILES_PAGE_COUNT.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(ch) = channel {
            query.push(("channel", ch.to_string()));
        }

        let response: FilesListResponse = client.get("files.list", token, &query).await?;
        all_files.extend(response.files);

        if let Some(limit) = limit {
            if all_files.len() as u32 >= limit {
                all_files.truncate(limit as usize);
                break;
            }
        }

        match response.paging {
            Some(paging) if paging.page < paging.pages => {
                page += 1;
                client.page_pause().await;
            }
            _ => break,
        }
    }

    Ok(all_files)
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
    async fn list_files_drains_numbered_pages() {
        let mut server = mockito::Server::new_async().await;
        let _page1 = server
            .mock("GET", "/files.list")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "ok": true,
                "files": [{"id": "F1", "name": "a.png", "mimetype": "image/png"}],
                "paging": {"page": 1, "pages": 2}
            }"#,
            )
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", "/files.list")
            .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "ok": true,
                "files": [{"id": "F2", "name": "b.pdf", "mimetype": "application/pdf"}],
                "paging": {"page": 2, "pages": 2}
            }"#,
            )
            .create_async()
            .await;

        let client = test_client(&server);
        let files = list_files(&client, "xoxb-test", None, None).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, "F1");
        assert_eq!(files[1].id, "F2");
    }
}
