//! Runs sync jobs: enumerates the target channel set, drives the reconciler
//! channel by channel, tracks progress, and retries whole attempts with a
//! bounded budget.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::access;
use super::files::FileIngestion;
use super::reconciler::SyncContext;
use super::CancelFlag;
use crate::api::{conversations, SlackClient};
use crate::store::db::{get_connection, StoreConnection, StorePool};
use crate::store::models::{ChannelRecord, NewChannel, UserRecord};
use crate::store::operations;
use crate::store::progress::{self, ChannelOutcome, JobSummary};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_CHANNEL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    All,
    Dms,
    UserDirectory,
    Membership,
    Files,
}

impl SyncScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncScope::All => "all",
            SyncScope::Dms => "dms",
            SyncScope::UserDirectory => "users",
            SyncScope::Membership => "members",
            SyncScope::Files => "files",
        }
    }

    fn is_channel_scope(&self) -> bool {
        matches!(self, SyncScope::All | SyncScope::Dms | SyncScope::Membership)
    }
}

/// One sync request for one (user, workspace).
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub user_id: i32,
    pub workspace_id: String,
    pub scope: SyncScope,
    /// Explicit channel selection; None means every accessible channel.
    pub channel_ids: Option<Vec<String>>,
    pub full_sync: bool,
    pub force: bool,
    pub limit: Option<u32>,
}

impl SyncJob {
    /// Progress-row key; with the user id column this identifies a run.
    pub fn job_id(&self) -> String {
        format!("sync:{}:{}", self.workspace_id, self.scope.as_str())
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("a sync job is already running for user {0}")]
    AlreadyRunning(i32),
    #[error("sync cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// In-process overlap guard: at most one running job per user. A second
/// dispatch is rejected, never queued.
#[derive(Clone, Default)]
pub struct ActiveJobs(Arc<StdMutex<HashSet<i32>>>);

impl ActiveJobs {
    pub fn try_begin(&self, user_id: i32) -> Option<JobGuard> {
        let mut active = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(user_id) {
            return None;
        }
        Some(JobGuard {
            jobs: self.clone(),
            user_id,
        })
    }
}

/// Releases the user's slot on drop, panicking paths included.
pub struct JobGuard {
    jobs: ActiveJobs,
    user_id: i32,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.jobs
            .0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.user_id);
    }
}

/// Where permanently-failed jobs get reported. The default implementation
/// logs; a chat or email notifier plugs in here.
pub trait AdminNotifier: Send + Sync {
    fn notify(&self, admins: &[UserRecord], message: &str);
}

pub struct LogNotifier;

impl AdminNotifier for LogNotifier {
    fn notify(&self, admins: &[UserRecord], message: &str) {
        for admin in admins {
            error!(admin = %admin.name, "{message}");
        }
    }
}

pub struct Orchestrator<'a> {
    pool: StorePool,
    client: &'a SlackClient,
    files: &'a FileIngestion,
    bot_token: String,
    user_token: Option<String>,
    active: ActiveJobs,
    notifier: Box<dyn AdminNotifier>,
    max_attempts: u32,
    retry_delay: Duration,
    channel_delay: Duration,
    job_timeout: Duration,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        pool: StorePool,
        client: &'a SlackClient,
        files: &'a FileIngestion,
        bot_token: &str,
    ) -> Self {
        Self {
            pool,
            client,
            files,
            bot_token: bot_token.to_string(),
            user_token: None,
            active: ActiveJobs::default(),
            notifier: Box::new(LogNotifier),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            channel_delay: DEFAULT_CHANNEL_DELAY,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    /// Token used for membership-gated channels (DMs, private channels).
    pub fn with_user_token(mut self, token: Option<String>) -> Self {
        self.user_token = token;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn AdminNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_pacing(mut self, channel_delay: Duration, job_timeout: Duration) -> Self {
        self.channel_delay = channel_delay;
        self.job_timeout = job_timeout;
        self
    }

    /// Runs a job to completion, retrying whole attempts on failure. After
    /// the last attempt the job is marked permanently failed and every active
    /// admin is notified. Cancellation never retries.
    pub async fn run(&self, job: &SyncJob, cancel: CancelFlag) -> Result<JobSummary, JobError> {
        let _guard = self
            .active
            .try_begin(job.user_id)
            .ok_or(JobError::AlreadyRunning(job.user_id))?;

        let job_id = job.job_id();
        let mut last_error = anyhow!("sync never attempted");

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                self.record_failure(job, &job_id, "sync cancelled", false).await?;
                return Err(JobError::Cancelled);
            }

            info!(job_id = %job_id, attempt, "starting sync attempt");
            match tokio::time::timeout(self.job_timeout, self.execute(job, &cancel)).await {
                Ok(Ok(summary)) => return Ok(summary),
                Ok(Err(err)) => {
                    if cancel.is_cancelled() {
                        self.record_failure(job, &job_id, "sync cancelled", false).await?;
                        return Err(JobError::Cancelled);
                    }
                    warn!(job_id = %job_id, attempt, %err, "sync attempt failed");
                    last_error = err;
                }
                Err(_) => {
                    warn!(job_id = %job_id, attempt, "sync attempt timed out");
                    last_error = anyhow!(
                        "sync attempt exceeded the {}s timeout",
                        self.job_timeout.as_secs()
                    );
                }
            }

            if attempt < self.max_attempts {
                self.record_failure(job, &job_id, &last_error.to_string(), false)
                    .await?;
                tokio::time::sleep(self.retry_delay).await;
            } else {
                self.record_failure(job, &job_id, &last_error.to_string(), true)
                    .await?;
                let mut conn = get_connection(&self.pool).await?;
                let admins = operations::active_admins(&mut conn)?;
                self.notifier.notify(
                    &admins,
                    &format!("sync job {job_id} failed permanently: {last_error}"),
                );
            }
        }

        Err(JobError::Other(last_error))
    }

    async fn record_failure(
        &self,
        job: &SyncJob,
        job_id: &str,
        error: &str,
        permanent: bool,
    ) -> Result<()> {
        let mut conn = get_connection(&self.pool).await?;
        progress::fail(&mut conn, job.user_id, job_id, error, permanent)
    }

    /// Resolves the channel set a job would touch, without syncing anything.
    pub async fn plan(&self, job: &SyncJob) -> Result<Vec<ChannelRecord>> {
        let mut conn = get_connection(&self.pool).await?;
        let user = self.acting_user(&mut conn, job)?;
        self.target_channels(&mut conn, job, &user).await
    }

    async fn execute(&self, job: &SyncJob, cancel: &CancelFlag) -> Result<JobSummary> {
        let started = Instant::now();
        let mut conn = get_connection(&self.pool).await?;
        let user = self.acting_user(&mut conn, job)?;
        let job_id = job.job_id();
        let mut ctx = SyncContext::new(self.client, &job.workspace_id, self.files, cancel.clone());

        if !job.scope.is_channel_scope() {
            progress::start(&mut conn, job.user_id, &job_id, 1)?;
            let summary = match job.scope {
                SyncScope::UserDirectory => {
                    let dir = ctx
                        .sync_user_directory(&mut conn, &self.bot_token, job.limit)
                        .await?;
                    JobSummary {
                        channels_synced: 0,
                        channels_failed: 0,
                        messages_fetched: dir.fetched,
                        messages_saved: dir.created + dir.updated,
                        elapsed_secs: started.elapsed().as_secs(),
                        avg_secs_per_channel: 0.0,
                    }
                }
                SyncScope::Files => {
                    // Files shared only in gated channels are not readable
                    // with the bot token; prefer the user token when set.
                    let token = self.user_token.as_deref().unwrap_or(&self.bot_token);
                    let files = ctx
                        .sync_files(&mut conn, token, job.force, job.limit)
                        .await?;
                    JobSummary {
                        channels_synced: 0,
                        channels_failed: 0,
                        messages_fetched: files.listed,
                        messages_saved: files.stored,
                        elapsed_secs: started.elapsed().as_secs(),
                        avg_secs_per_channel: 0.0,
                    }
                }
                _ => unreachable!(),
            };
            progress::complete(&mut conn, job.user_id, &job_id, &[], summary.clone())?;
            return Ok(summary);
        }

        // Enumeration failures propagate and hit the retry path; per-channel
        // failures below are recorded and skipped over.
        let channels = self.target_channels(&mut conn, job, &user).await?;
        progress::start(&mut conn, job.user_id, &job_id, channels.len() as i32)?;

        let mut outcomes: Vec<ChannelOutcome> = Vec::new();
        for (idx, channel) in channels.iter().enumerate() {
            if cancel.is_cancelled() {
                bail!("sync cancelled");
            }

            let outcome = self
                .sync_one_channel(&mut ctx, &mut conn, job, channel)
                .await;
            outcomes.push(outcome);
            progress::advance(
                &mut conn,
                job.user_id,
                &job_id,
                (idx + 1) as i32,
                Some(&channel.name),
                &outcomes,
            )?;

            if idx + 1 < channels.len() && !self.channel_delay.is_zero() {
                tokio::time::sleep(self.channel_delay).await;
            }
        }

        let summary = summarize(&outcomes, started.elapsed());
        progress::complete(&mut conn, job.user_id, &job_id, &outcomes, summary.clone())?;
        info!(
            job_id = %job_id,
            channels = summary.channels_synced,
            failed = summary.channels_failed,
            saved = summary.messages_saved,
            "sync job completed"
        );
        Ok(summary)
    }

    async fn sync_one_channel(
        &self,
        ctx: &mut SyncContext<'_>,
        conn: &mut StoreConnection,
        job: &SyncJob,
        channel: &ChannelRecord,
    ) -> ChannelOutcome {
        let sync_type = match job.scope {
            SyncScope::Membership => "membership",
            _ if job.full_sync => "full",
            _ => "incremental",
        };
        let token = match access::token_for_channel(
            channel,
            &self.bot_token,
            self.user_token.as_deref(),
        ) {
            Ok(token) => token,
            Err(err) => {
                warn!(channel = %channel.id, %err, "channel skipped");
                return failed_outcome(channel, sync_type, &err.to_string());
            }
        };

        if job.scope == SyncScope::Membership {
            return match ctx.sync_memberships(conn, token, channel).await {
                Ok(result) => ChannelOutcome {
                    channel_id: channel.id.clone(),
                    channel_name: channel.name.clone(),
                    success: true,
                    messages_fetched: result.joined + result.left,
                    messages_saved: result.joined,
                    sync_type: sync_type.to_string(),
                    error: None,
                },
                Err(err) => failed_outcome(channel, sync_type, &err.to_string()),
            };
        }

        ctx.sync_channel(conn, channel, token, job.full_sync).await
    }

    fn acting_user(&self, conn: &mut StoreConnection, job: &SyncJob) -> Result<UserRecord> {
        operations::user_by_id(conn, job.user_id)?
            .ok_or_else(|| anyhow!("unknown archive user {}", job.user_id))
    }

    /// Refreshes the channel directory from Slack, then filters it down to
    /// the job's scope, explicit selection, and the acting user's access.
    /// Inaccessible explicit ids are dropped silently.
    async fn target_channels(
        &self,
        conn: &mut StoreConnection,
        job: &SyncJob,
        user: &UserRecord,
    ) -> Result<Vec<ChannelRecord>> {
        self.refresh_channel_directory(conn, job).await?;

        let mut channels = operations::channels_for_workspace(conn, &job.workspace_id)?;
        if job.scope == SyncScope::Dms {
            channels.retain(|c| c.is_im || c.is_mpim);
        }
        if let Some(ids) = &job.channel_ids {
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            channels.retain(|c| wanted.contains(c.id.as_str()));
        }

        let mut accessible = Vec::new();
        for channel in channels {
            if access::user_can_access(conn, user, &channel)? {
                accessible.push(channel);
            } else {
                debug!(channel = %channel.id, user = %user.slack_user_id, "channel not accessible, dropped");
            }
        }

        if let Some(limit) = job.limit {
            accessible.truncate(limit as usize);
        }
        Ok(accessible)
    }

    async fn refresh_channel_directory(
        &self,
        conn: &mut StoreConnection,
        job: &SyncJob,
    ) -> Result<()> {
        let listed = conversations::list_channels(
            self.client,
            &self.bot_token,
            "public_channel,private_channel",
            true,
        )
        .await?;
        for channel in &listed {
            operations::upsert_channel(conn, &NewChannel::from_api(channel, &job.workspace_id))?;
        }

        // DM conversations are only visible to the token that owns them.
        if let Some(user_token) = self.user_token.as_deref() {
            let dms =
                conversations::list_channels(self.client, user_token, "im,mpim", true).await?;
            for channel in &dms {
                operations::upsert_channel(
                    conn,
                    &NewChannel::from_api(channel, &job.workspace_id),
                )?;
            }
        }
        Ok(())
    }
}

fn failed_outcome(channel: &ChannelRecord, sync_type: &str, error: &str) -> ChannelOutcome {
    ChannelOutcome {
        channel_id: channel.id.clone(),
        channel_name: channel.name.clone(),
        success: false,
        messages_fetched: 0,
        messages_saved: 0,
        sync_type: sync_type.to_string(),
        error: Some(error.to_string()),
    }
}

fn summarize(outcomes: &[ChannelOutcome], elapsed: Duration) -> JobSummary {
    let synced = outcomes.iter().filter(|o| o.success).count() as u32;
    JobSummary {
        channels_synced: synced,
        channels_failed: outcomes.len() as u32 - synced,
        messages_fetched: outcomes.iter().map(|o| o.messages_fetched).sum(),
        messages_saved: outcomes.iter().map(|o| o.messages_saved).sum(),
        elapsed_secs: elapsed.as_secs(),
        avg_secs_per_channel: if outcomes.is_empty() {
            0.0
        } else {
            elapsed.as_secs_f64() / outcomes.len() as f64
        },
    }
}
