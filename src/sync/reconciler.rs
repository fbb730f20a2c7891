//! Pulls Slack state into the archive: channel history (with threads and
//! attachments), the user directory, channel memberships, and the workspace
//! file listing.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::files::{FileIngestion, FileOrigin};
use super::CancelFlag;
use crate::api::client::HISTORY_PAGE_LIMIT;
use crate::api::{conversations, files as files_api, users, SlackClient};
use crate::models::message::Message;
use crate::store::db::StoreConnection;
use crate::store::models::{ChannelRecord, NewMessage};
use crate::store::operations;
use crate::store::progress::ChannelOutcome;

/// Shared state for one sync run. The user cache maps Slack user ids to
/// archive ids (None caches a failed lookup) and persists across channels so
/// each sender costs at most one users.info call per run.
pub struct SyncContext<'a> {
    pub client: &'a SlackClient,
    pub workspace_id: String,
    pub files: &'a FileIngestion,
    pub cancel: CancelFlag,
    user_cache: HashMap<String, Option<i32>>,
}

#[derive(Debug, Default)]
pub struct DirectoryOutcome {
    pub fetched: u64,
    pub created: u64,
    pub updated: u64,
}

#[derive(Debug, Default)]
pub struct MembershipOutcome {
    pub joined: u64,
    pub left: u64,
}

#[derive(Debug, Default)]
pub struct FilesOutcome {
    pub listed: u64,
    pub stored: u64,
    pub skipped: u64,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        client: &'a SlackClient,
        workspace_id: &str,
        files: &'a FileIngestion,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            client,
            workspace_id: workspace_id.to_string(),
            files,
            cancel,
            user_cache: HashMap::new(),
        }
    }

    /// Archive one channel's history. Incremental runs start from the newest
    /// stored ts; `full_sync` re-reads from the beginning (duplicates are
    /// fetched but not re-saved). The first API error aborts the channel;
    /// pages already written stay committed.
    pub async fn sync_channel(
        &mut self,
        conn: &mut StoreConnection,
        channel: &ChannelRecord,
        token: &str,
        full_sync: bool,
    ) -> ChannelOutcome {
        let watermark = if full_sync {
            None
        } else {
            match operations::latest_message_ts(conn, &self.workspace_id, &channel.id) {
                Ok(ts) => ts,
                Err(err) => {
                    return ChannelOutcome {
                        channel_id: channel.id.clone(),
                        channel_name: channel.name.clone(),
                        success: false,
                        messages_fetched: 0,
                        messages_saved: 0,
                        sync_type: "incremental".to_string(),
                        error: Some(err.to_string()),
                    }
                }
            }
        };

        // The label reflects the requested mode: an incremental pass over an
        // empty channel is still incremental, it just has no watermark yet.
        let sync_type = if full_sync { "full" } else { "incremental" };
        let mut outcome = ChannelOutcome {
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            success: false,
            messages_fetched: 0,
            messages_saved: 0,
            sync_type: sync_type.to_string(),
            error: None,
        };

        info!(channel = %channel.id, name = %channel.name, sync_type, "syncing channel");
        match self
            .drain_history(conn, channel, token, watermark.as_deref(), &mut outcome)
            .await
        {
            Ok(()) => {
                if let Err(err) = operations::set_channel_synced(
                    conn,
                    &self.workspace_id,
                    &channel.id,
                    Utc::now().naive_utc(),
                ) {
                    outcome.error = Some(err.to_string());
                } else {
                    outcome.success = true;
                    info!(
                        channel = %channel.id,
                        fetched = outcome.messages_fetched,
                        saved = outcome.messages_saved,
                        "channel synced"
                    );
                }
            }
            Err(err) => {
                warn!(channel = %channel.id, %err, "channel sync aborted");
                outcome.error = Some(err.to_string());
            }
        }
        outcome
    }

    async fn drain_history(
        &mut self,
        conn: &mut StoreConnection,
        channel: &ChannelRecord,
        token: &str,
        oldest: Option<&str>,
        outcome: &mut ChannelOutcome,
    ) -> Result<()> {
        let mut cursor: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                bail!("sync cancelled");
            }

            let page = conversations::history_page(
                self.client,
                token,
                &channel.id,
                oldest,
                cursor.as_deref(),
                HISTORY_PAGE_LIMIT,
            )
            .await?;

            for message in &page.messages {
                self.archive_row(conn, channel, token, message, outcome).await?;
                if message.is_thread_parent() {
                    self.drain_thread(conn, channel, token, &message.ts, outcome)
                        .await?;
                }
            }

            match page.next_cursor {
                Some(next) => {
                    cursor = Some(next);
                    self.client.page_pause().await;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Fully drains one thread. The replies endpoint echoes the parent as its
    /// first row on every page; those echoes are skipped, not double-counted.
    async fn drain_thread(
        &mut self,
        conn: &mut StoreConnection,
        channel: &ChannelRecord,
        token: &str,
        thread_ts: &str,
        outcome: &mut ChannelOutcome,
    ) -> Result<()> {
        let mut cursor: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                bail!("sync cancelled");
            }

            let page = conversations::replies_page(
                self.client,
                token,
                &channel.id,
                thread_ts,
                cursor.as_deref(),
                HISTORY_PAGE_LIMIT,
            )
            .await?;

            for message in &page.messages {
                if message.ts == thread_ts {
                    continue;
                }
                self.archive_row(conn, channel, token, message, outcome).await?;
            }

            match page.next_cursor {
                Some(next) => {
                    cursor = Some(next);
                    self.client.page_pause().await;
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn archive_row(
        &mut self,
        conn: &mut StoreConnection,
        channel: &ChannelRecord,
        token: &str,
        message: &Message,
        outcome: &mut ChannelOutcome,
    ) -> Result<()> {
        outcome.messages_fetched += 1;

        let sender = match message.user.as_deref() {
            Some(slack_id) => self.resolve_sender(conn, token, slack_id).await?,
            None => None,
        };

        let record = NewMessage {
            slack_message_id: message.ts.clone(),
            workspace_id: self.workspace_id.clone(),
            channel_id: channel.id.clone(),
            user_id: sender,
            text: message.text.clone(),
            ts: message.ts.clone(),
            thread_ts: message.thread_ts.clone(),
            reply_count: message.reply_count.unwrap_or(0) as i32,
            created_at: Utc::now().naive_utc(),
        };
        if operations::insert_message_if_new(conn, &record)? {
            outcome.messages_saved += 1;
        }

        if let Some(attachments) = &message.files {
            for file in attachments {
                let origin = FileOrigin {
                    user_id: sender,
                    channel_id: Some(channel.id.clone()),
                    message_ts: Some(message.ts.clone()),
                };
                if let Err(err) = self
                    .files
                    .ingest(self.client, conn, &self.workspace_id, token, file, origin, false)
                    .await
                {
                    warn!(file_id = %file.id, %err, "attachment ingestion failed");
                }
            }
        }
        Ok(())
    }

    /// Maps a Slack user id to an archive user id, creating the user from
    /// users.info on first sight. A failed lookup is cached and the message
    /// is archived with a null sender.
    async fn resolve_sender(
        &mut self,
        conn: &mut StoreConnection,
        token: &str,
        slack_id: &str,
    ) -> Result<Option<i32>> {
        if let Some(cached) = self.user_cache.get(slack_id) {
            return Ok(*cached);
        }

        if let Some(user) = operations::find_user_by_slack_id(conn, slack_id)? {
            self.user_cache.insert(slack_id.to_string(), Some(user.id));
            return Ok(Some(user.id));
        }

        debug!(slack_id, "unknown sender, fetching profile");
        match users::get_user(self.client, token, slack_id).await {
            Ok(api_user) => {
                let (record, _) = operations::upsert_slack_user(conn, &self.workspace_id, &api_user)?;
                self.user_cache.insert(slack_id.to_string(), Some(record.id));
                Ok(Some(record.id))
            }
            Err(err) => {
                warn!(slack_id, %err, "user lookup failed, archiving with null sender");
                self.user_cache.insert(slack_id.to_string(), None);
                Ok(None)
            }
        }
    }

    /// Pages through users.list and upserts the whole directory.
    pub async fn sync_user_directory(
        &mut self,
        conn: &mut StoreConnection,
        token: &str,
        limit: Option<u32>,
    ) -> Result<DirectoryOutcome> {
        let members = users::list_users(self.client, token, limit).await?;
        let mut outcome = DirectoryOutcome {
            fetched: members.len() as u64,
            ..Default::default()
        };

        for member in &members {
            if self.cancel.is_cancelled() {
                bail!("sync cancelled");
            }
            let (record, created) = operations::upsert_slack_user(conn, &self.workspace_id, member)?;
            self.user_cache
                .insert(member.id.clone(), Some(record.id));
            if created {
                outcome.created += 1;
            } else {
                outcome.updated += 1;
            }
        }
        info!(
            fetched = outcome.fetched,
            created = outcome.created,
            "user directory synced"
        );
        Ok(outcome)
    }

    /// Reconciles one channel's membership against conversations.members:
    /// present ids are upserted, stored members no longer present get left_at.
    pub async fn sync_memberships(
        &mut self,
        conn: &mut StoreConnection,
        token: &str,
        channel: &ChannelRecord,
    ) -> Result<MembershipOutcome> {
        let slack_ids = conversations::member_ids(self.client, token, &channel.id).await?;
        let mut outcome = MembershipOutcome::default();
        let mut present: HashSet<i32> = HashSet::new();

        for slack_id in &slack_ids {
            if self.cancel.is_cancelled() {
                bail!("sync cancelled");
            }
            let Some(user_id) = self.resolve_sender(conn, token, slack_id).await? else {
                continue;
            };
            present.insert(user_id);
            if operations::upsert_membership(conn, &channel.id, &self.workspace_id, user_id)? {
                outcome.joined += 1;
            }
        }

        let now = Utc::now().naive_utc();
        for stored in operations::current_member_user_ids(conn, &channel.id, &self.workspace_id)? {
            if !present.contains(&stored) {
                operations::mark_member_left(conn, &channel.id, &self.workspace_id, stored, now)?;
                outcome.left += 1;
            }
        }

        info!(
            channel = %channel.id,
            members = present.len(),
            joined = outcome.joined,
            left = outcome.left,
            "memberships synced"
        );
        Ok(outcome)
    }

    /// Pages through files.list and hands every file to ingestion.
    pub async fn sync_files(
        &mut self,
        conn: &mut StoreConnection,
        token: &str,
        force: bool,
        limit: Option<u32>,
    ) -> Result<FilesOutcome> {
        let listing = files_api::list_files(self.client, token, limit, None).await?;
        let mut outcome = FilesOutcome {
            listed: listing.len() as u64,
            ..Default::default()
        };

        for file in &listing {
            if self.cancel.is_cancelled() {
                bail!("sync cancelled");
            }
            let sender = match file.user.as_deref() {
                Some(slack_id) => self.resolve_sender(conn, token, slack_id).await?,
                None => None,
            };
            let origin = FileOrigin {
                user_id: sender,
                channel_id: file.channels.as_ref().and_then(|c| c.first().cloned()),
                message_ts: None,
            };
            match self
                .files
                .ingest(self.client, conn, &self.workspace_id, token, file, origin, force)
                .await
            {
                Ok(true) => outcome.stored += 1,
                Ok(false) => outcome.skipped += 1,
                Err(err) => {
                    warn!(file_id = %file.id, %err, "file ingestion failed");
                    outcome.skipped += 1;
                }
            }
        }
        info!(
            listed = outcome.listed,
            stored = outcome.stored,
            "file listing synced"
        );
        Ok(outcome)
    }
}
