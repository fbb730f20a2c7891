use serde::{Deserialize, Serialize};

use super::ResponseMetadata;

#[derive(Debug, Deserialize, Serialize)]
pub struct Channel {
    pub id: String,
    /// IM conversations carry no name; callers fall back to the channel id.
    #[serde(default)]
    pub name: String,
    pub is_channel: Option<bool>,
    pub is_group: Option<bool>,
    pub is_im: Option<bool>,
    pub is_mpim: Option<bool>,
    pub is_private: Option<bool>,
    pub is_archived: Option<bool>,
    pub num_members: Option<u32>,
}

impl Channel {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelsListResponse {
    #[serde(default)]
    pub channels: Vec<Channel>,
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct MembersResponse {
    #[serde(default)]
    pub members: Vec<String>,
    pub response_metadata: Option<ResponseMetadata>,
}
