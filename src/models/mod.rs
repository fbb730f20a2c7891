pub mod channel;
pub mod file;
pub mod message;
pub mod user;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ResponseMetadata {
    pub next_cursor: Option<String>,
}

impl ResponseMetadata {
    /// Slack signals the last page with an absent or empty cursor.
    pub fn cursor(meta: Option<Self>) -> Option<String> {
        meta.and_then(|m| m.next_cursor).filter(|c| !c.is_empty())
    }
}
