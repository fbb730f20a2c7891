use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use super::schema::{channel_members, channels, messages, slack_files, users, workspaces};
use crate::models::channel::Channel;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize)]
#[diesel(table_name = workspaces)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    pub bot_token: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = channels)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChannelRecord {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub is_private: bool,
    pub is_im: bool,
    pub is_mpim: bool,
    pub is_archived: bool,
    pub member_count: Option<i32>,
    pub last_synced_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

impl ChannelRecord {
    /// Membership-gated channels cannot be read with the bot token alone.
    pub fn is_membership_gated(&self) -> bool {
        self.is_private || self.is_im || self.is_mpim
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = channels)]
pub struct NewChannel {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub is_private: bool,
    pub is_im: bool,
    pub is_mpim: bool,
    pub is_archived: bool,
    pub member_count: Option<i32>,
    pub updated_at: NaiveDateTime,
}

impl NewChannel {
    pub fn from_api(channel: &Channel, workspace_id: &str) -> Self {
        let is_im = channel.is_im.unwrap_or(false);
        let is_mpim = channel.is_mpim.unwrap_or(false);
        Self {
            id: channel.id.clone(),
            workspace_id: workspace_id.to_string(),
            name: channel.display_name().to_string(),
            // DMs are always membership-gated even when Slack omits the flag.
            is_private: channel.is_private.unwrap_or(false) || is_im || is_mpim,
            is_im,
            is_mpim,
            is_archived: channel.is_archived.unwrap_or(false),
            member_count: channel.num_members.map(|n| n as i32),
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserRecord {
    pub id: i32,
    pub slack_user_id: String,
    pub workspace_id: String,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub access_token: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub slack_user_id: String,
    pub workspace_id: String,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub access_token: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MessageRecord {
    pub id: i32,
    pub slack_message_id: String,
    pub workspace_id: String,
    pub channel_id: String,
    pub user_id: Option<i32>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub reply_count: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub slack_message_id: String,
    pub workspace_id: String,
    pub channel_id: String,
    pub user_id: Option<i32>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub reply_count: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = channel_members)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MemberRecord {
    pub channel_id: String,
    pub workspace_id: String,
    pub user_id: i32,
    pub joined_at: NaiveDateTime,
    pub left_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = channel_members)]
pub struct NewMember {
    pub channel_id: String,
    pub workspace_id: String,
    pub user_id: i32,
    pub joined_at: NaiveDateTime,
    pub left_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = slack_files)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FileRecord {
    pub id: i32,
    pub slack_file_id: String,
    pub workspace_id: String,
    pub name: String,
    pub title: String,
    pub mimetype: String,
    pub file_type: String,
    pub size: i64,
    pub url_private: Option<String>,
    pub url_public: Option<String>,
    pub storage_path: Option<String>,
    pub thumbnails: String,
    pub is_public: bool,
    pub user_id: Option<i32>,
    pub channel_id: Option<String>,
    pub message_ts: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = slack_files)]
pub struct NewFile {
    pub slack_file_id: String,
    pub workspace_id: String,
    pub name: String,
    pub title: String,
    pub mimetype: String,
    pub file_type: String,
    pub size: i64,
    pub url_private: Option<String>,
    pub url_public: Option<String>,
    pub storage_path: Option<String>,
    pub thumbnails: String,
    pub is_public: bool,
    pub user_id: Option<i32>,
    pub channel_id: Option<String>,
    pub message_ts: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
