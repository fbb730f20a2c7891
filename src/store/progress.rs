//! Persistent sync progress, one row per (user, job).
//!
//! Rows carry a TTL so completed and failed runs age out of `status` output
//! instead of accumulating forever; `purge_expired` is the cleanup entry
//! point.

use anyhow::Result;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::db::StoreConnection;
use super::schema::sync_progress;

const COMPLETED_TTL_HOURS: i64 = 1;
const FAILED_TTL_HOURS: i64 = 24;
const FAILED_PERMANENTLY_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
    FailedPermanently,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::FailedPermanently => "failed_permanently",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SyncStatus::Pending),
            "running" => Some(SyncStatus::Running),
            "completed" => Some(SyncStatus::Completed),
            "failed" => Some(SyncStatus::Failed),
            "failed_permanently" => Some(SyncStatus::FailedPermanently),
            _ => None,
        }
    }
}

/// Per-channel result recorded into the `results` JSON column as the job
/// advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel_id: String,
    pub channel_name: String,
    pub success: bool,
    pub messages_fetched: u64,
    pub messages_saved: u64,
    pub sync_type: String,
    pub error: Option<String>,
}

/// Aggregate written once at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub channels_synced: u32,
    pub channels_failed: u32,
    pub messages_fetched: u64,
    pub messages_saved: u64,
    pub elapsed_secs: u64,
    pub avg_secs_per_channel: f64,
}

/// Shape of the `results` column: the per-channel log, capped by a summary
/// once the job finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResults {
    #[serde(default)]
    pub summary: Option<JobSummary>,
    #[serde(default)]
    pub channels: Vec<ChannelOutcome>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = sync_progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProgressRecord {
    pub user_id: i32,
    pub job_id: String,
    pub status: String,
    pub progress: i32,
    pub total: i32,
    pub current_channel: Option<String>,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
    pub error: Option<String>,
    pub results: String,
    pub expires_at: Option<NaiveDateTime>,
}

impl ProgressRecord {
    pub fn sync_status(&self) -> Option<SyncStatus> {
        SyncStatus::parse(&self.status)
    }

    pub fn sync_results(&self) -> SyncResults {
        serde_json::from_str(&self.results).unwrap_or_default()
    }

    pub fn outcomes(&self) -> Vec<ChannelOutcome> {
        self.sync_results().channels
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sync_progress)]
struct NewProgress<'a> {
    user_id: i32,
    job_id: &'a str,
    status: &'a str,
    progress: i32,
    total: i32,
    current_channel: Option<&'a str>,
    started_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
    failed_at: Option<NaiveDateTime>,
    error: Option<&'a str>,
    results: &'a str,
    expires_at: Option<NaiveDateTime>,
}

/// Begin tracking a run, replacing any prior row for the same (user, job).
pub fn start(conn: &mut StoreConnection, user_id: i32, job_id: &str, total: i32) -> Result<()> {
    let results = serde_json::to_string(&SyncResults::default())?;
    let record = NewProgress {
        user_id,
        job_id,
        status: SyncStatus::Running.as_str(),
        progress: 0,
        total,
        current_channel: None,
        started_at: Utc::now().naive_utc(),
        completed_at: None,
        failed_at: None,
        error: None,
        results: &results,
        expires_at: None,
    };
    diesel::replace_into(sync_progress::table)
        .values(&record)
        .execute(conn)?;
    Ok(())
}

/// Record completion of one channel: bump the counter, note where the job is,
/// and append the outcome to the results log.
pub fn advance(
    conn: &mut StoreConnection,
    user_id: i32,
    job_id: &str,
    progress: i32,
    current_channel: Option<&str>,
    outcomes: &[ChannelOutcome],
) -> Result<()> {
    let results = serde_json::to_string(&SyncResults {
        summary: None,
        channels: outcomes.to_vec(),
    })?;
    diesel::update(
        sync_progress::table
            .filter(sync_progress::user_id.eq(user_id))
            .filter(sync_progress::job_id.eq(job_id)),
    )
    .set((
        sync_progress::progress.eq(progress),
        sync_progress::current_channel.eq(current_channel),
        sync_progress::results.eq(&results),
    ))
    .execute(conn)?;
    Ok(())
}

pub fn complete(
    conn: &mut StoreConnection,
    user_id: i32,
    job_id: &str,
    outcomes: &[ChannelOutcome],
    summary: JobSummary,
) -> Result<()> {
    let now = Utc::now().naive_utc();
    let results = serde_json::to_string(&SyncResults {
        summary: Some(summary),
        channels: outcomes.to_vec(),
    })?;
    diesel::update(
        sync_progress::table
            .filter(sync_progress::user_id.eq(user_id))
            .filter(sync_progress::job_id.eq(job_id)),
    )
    .set((
        sync_progress::status.eq(SyncStatus::Completed.as_str()),
        // Single-unit scopes never advance mid-run; a finished job always
        // shows progress == total.
        sync_progress::progress.eq(sync_progress::total),
        sync_progress::current_channel.eq(None::<String>),
        sync_progress::completed_at.eq(now),
        sync_progress::results.eq(&results),
        sync_progress::expires_at.eq(now + Duration::hours(COMPLETED_TTL_HOURS)),
    ))
    .execute(conn)?;
    Ok(())
}

/// Mark a run failed. Permanent failures (retry budget exhausted) are kept
/// around longer so operators can see them. A job can fail before its first
/// progress write (enumeration failure), so a missing row is created here.
pub fn fail(
    conn: &mut StoreConnection,
    user_id: i32,
    job_id: &str,
    error: &str,
    permanent: bool,
) -> Result<()> {
    let now = Utc::now().naive_utc();
    let (status, ttl) = if permanent {
        (
            SyncStatus::FailedPermanently,
            Duration::days(FAILED_PERMANENTLY_TTL_DAYS),
        )
    } else {
        (SyncStatus::Failed, Duration::hours(FAILED_TTL_HOURS))
    };

    let updated = diesel::update(
        sync_progress::table
            .filter(sync_progress::user_id.eq(user_id))
            .filter(sync_progress::job_id.eq(job_id)),
    )
    .set((
        sync_progress::status.eq(status.as_str()),
        sync_progress::failed_at.eq(now),
        sync_progress::error.eq(error),
        sync_progress::expires_at.eq(now + ttl),
    ))
    .execute(conn)?;

    if updated == 0 {
        let results = serde_json::to_string(&SyncResults::default())?;
        let record = NewProgress {
            user_id,
            job_id,
            status: status.as_str(),
            progress: 0,
            total: 0,
            current_channel: None,
            started_at: now,
            completed_at: None,
            failed_at: Some(now),
            error: Some(error),
            results: &results,
            expires_at: Some(now + ttl),
        };
        diesel::insert_into(sync_progress::table)
            .values(&record)
            .execute(conn)?;
    }
    Ok(())
}

pub fn load(
    conn: &mut StoreConnection,
    user_id: i32,
    job_id: &str,
) -> Result<Option<ProgressRecord>> {
    Ok(sync_progress::table
        .filter(sync_progress::user_id.eq(user_id))
        .filter(sync_progress::job_id.eq(job_id))
        .first(conn)
        .optional()?)
}

pub fn for_user(conn: &mut StoreConnection, user_id: i32) -> Result<Vec<ProgressRecord>> {
    Ok(sync_progress::table
        .filter(sync_progress::user_id.eq(user_id))
        .order(sync_progress::started_at.desc())
        .load(conn)?)
}

pub fn all(conn: &mut StoreConnection) -> Result<Vec<ProgressRecord>> {
    Ok(sync_progress::table
        .order(sync_progress::started_at.desc())
        .load(conn)?)
}

/// Delete rows whose TTL has elapsed. Returns how many were removed.
pub fn purge_expired(conn: &mut StoreConnection, now: NaiveDateTime) -> Result<usize> {
    Ok(diesel::delete(
        sync_progress::table.filter(sync_progress::expires_at.le(now)),
    )
    .execute(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::init_store_db;
    use diesel::sqlite::SqliteConnection;

    fn test_conn() -> (tempfile::TempDir, SqliteConnection) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("archive.db");
        init_store_db(&db_path).unwrap();
        let conn =
            SqliteConnection::establish(&format!("sqlite://{}", db_path.display())).unwrap();
        (dir, conn)
    }

    fn summary() -> JobSummary {
        JobSummary {
            channels_synced: 2,
            channels_failed: 1,
            messages_fetched: 30,
            messages_saved: 24,
            elapsed_secs: 12,
            avg_secs_per_channel: 4.0,
        }
    }

    fn outcome(channel_id: &str, success: bool) -> ChannelOutcome {
        ChannelOutcome {
            channel_id: channel_id.to_string(),
            channel_name: format!("#{channel_id}"),
            success,
            messages_fetched: 10,
            messages_saved: 8,
            sync_type: "incremental".to_string(),
            error: None,
        }
    }

    #[test]
    fn lifecycle_start_advance_complete() {
        let (_dir, mut conn) = test_conn();

        start(&mut conn, 1, "sync:all", 3).unwrap();
        let record = load(&mut conn, 1, "sync:all").unwrap().unwrap();
        assert_eq!(record.sync_status(), Some(SyncStatus::Running));
        assert_eq!(record.total, 3);
        assert!(record.expires_at.is_none());

        let partial = vec![outcome("C1", true)];
        advance(&mut conn, 1, "sync:all", 1, Some("general"), &partial).unwrap();
        let record = load(&mut conn, 1, "sync:all").unwrap().unwrap();
        assert_eq!(record.progress, 1);
        assert_eq!(record.current_channel.as_deref(), Some("general"));
        assert_eq!(record.outcomes().len(), 1);

        let full = vec![outcome("C1", true), outcome("C2", true), outcome("C3", false)];
        complete(&mut conn, 1, "sync:all", &full, summary()).unwrap();
        let record = load(&mut conn, 1, "sync:all").unwrap().unwrap();
        assert_eq!(record.sync_status(), Some(SyncStatus::Completed));
        assert_eq!(record.progress, record.total);
        assert!(record.current_channel.is_none());
        assert!(record.completed_at.is_some());
        assert!(record.expires_at.is_some());
        assert_eq!(record.outcomes().len(), 3);
        let stored_summary = record.sync_results().summary.unwrap();
        assert_eq!(stored_summary.messages_saved, 24);
    }

    #[test]
    fn restart_replaces_previous_row() {
        let (_dir, mut conn) = test_conn();

        start(&mut conn, 1, "sync:all", 3).unwrap();
        fail(&mut conn, 1, "sync:all", "rate limited", false).unwrap();

        start(&mut conn, 1, "sync:all", 5).unwrap();
        let record = load(&mut conn, 1, "sync:all").unwrap().unwrap();
        assert_eq!(record.sync_status(), Some(SyncStatus::Running));
        assert_eq!(record.total, 5);
        assert!(record.error.is_none());
    }

    #[test]
    fn fail_before_start_creates_the_row() {
        let (_dir, mut conn) = test_conn();

        fail(&mut conn, 9, "sync:T1:all", "channel listing failed", true).unwrap();
        let record = load(&mut conn, 9, "sync:T1:all").unwrap().unwrap();
        assert_eq!(record.sync_status(), Some(SyncStatus::FailedPermanently));
        assert_eq!(record.error.as_deref(), Some("channel listing failed"));
        assert_eq!(record.total, 0);
    }

    #[test]
    fn permanent_failures_outlive_transient_ones() {
        let (_dir, mut conn) = test_conn();

        start(&mut conn, 1, "sync:all", 1).unwrap();
        fail(&mut conn, 1, "sync:all", "boom", false).unwrap();
        start(&mut conn, 2, "sync:all", 1).unwrap();
        fail(&mut conn, 2, "sync:all", "boom", true).unwrap();

        let transient = load(&mut conn, 1, "sync:all").unwrap().unwrap();
        let permanent = load(&mut conn, 2, "sync:all").unwrap().unwrap();
        assert_eq!(permanent.sync_status(), Some(SyncStatus::FailedPermanently));
        assert!(permanent.expires_at.unwrap() > transient.expires_at.unwrap());
    }

    #[test]
    fn purge_removes_only_expired_rows() {
        let (_dir, mut conn) = test_conn();

        start(&mut conn, 1, "sync:all", 1).unwrap();
        complete(&mut conn, 1, "sync:all", &[], summary()).unwrap();
        start(&mut conn, 2, "sync:all", 1).unwrap();

        // Nothing has expired yet.
        assert_eq!(purge_expired(&mut conn, Utc::now().naive_utc()).unwrap(), 0);

        // Well past the completed-row TTL.
        let later = Utc::now().naive_utc() + Duration::hours(2);
        assert_eq!(purge_expired(&mut conn, later).unwrap(), 1);
        assert!(load(&mut conn, 1, "sync:all").unwrap().is_none());
        assert!(load(&mut conn, 2, "sync:all").unwrap().is_some());
    }
}
