use serde::{Deserialize, Serialize};

use super::file::FileObject;
use super::ResponseMetadata;

#[derive(Debug, Deserialize, Serialize)]
pub struct Message {
    /// Slack timestamp string (`<unix>.<microseconds>`), opaque and unique per
    /// workspace. Never parsed into a number; fractional precision matters.
    pub ts: String,
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    pub thread_ts: Option<String>,
    pub reply_count: Option<u32>,
    pub subtype: Option<String>,
    pub files: Option<Vec<FileObject>>,
}

impl Message {
    /// A message is a thread parent when its own ts doubles as the thread ts.
    pub fn is_thread_parent(&self) -> bool {
        self.reply_count.unwrap_or(0) > 0 && self.thread_ts.as_deref() == Some(self.ts.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
    pub response_metadata: Option<ResponseMetadata>,
}

impl HistoryResponse {
    pub fn into_page(self) -> (Vec<Message>, Option<String>) {
        let cursor = ResponseMetadata::cursor(self.response_metadata);
        (self.messages, cursor)
    }
}
