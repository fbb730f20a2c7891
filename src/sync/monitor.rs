//! Health view over the progress table: counts by status, stuck-job
//! detection, and TTL cleanup.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use super::orchestrator::AdminNotifier;
use crate::store::db::StoreConnection;
use crate::store::operations;
use crate::store::progress::{self, ProgressRecord, SyncStatus};

pub const DEFAULT_STUCK_AFTER: Duration = Duration::hours(2);

#[derive(Debug, Default, Serialize)]
pub struct MonitorReport {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub failed_permanently: usize,
    /// Running jobs whose started_at is older than the stuck threshold.
    pub stuck: Vec<StuckJob>,
}

#[derive(Debug, Serialize)]
pub struct StuckJob {
    pub user_id: i32,
    pub job_id: String,
    pub running_for_secs: i64,
}

impl MonitorReport {
    pub fn is_healthy(&self) -> bool {
        self.failed == 0 && self.failed_permanently == 0 && self.stuck.is_empty()
    }
}

/// Classifies every progress row. Read-only; never mutates job state.
pub fn scan(conn: &mut StoreConnection, stuck_after: Duration) -> Result<MonitorReport> {
    let now = Utc::now().naive_utc();
    let mut report = MonitorReport::default();

    for record in progress::all(conn)? {
        match record.sync_status() {
            Some(SyncStatus::Pending) => report.pending += 1,
            Some(SyncStatus::Running) => {
                report.running += 1;
                let age = now - record.started_at;
                if age > stuck_after {
                    report.stuck.push(StuckJob {
                        user_id: record.user_id,
                        job_id: record.job_id.clone(),
                        running_for_secs: age.num_seconds(),
                    });
                }
            }
            Some(SyncStatus::Completed) => report.completed += 1,
            Some(SyncStatus::Failed) => report.failed += 1,
            Some(SyncStatus::FailedPermanently) => report.failed_permanently += 1,
            None => {}
        }
    }
    Ok(report)
}

/// Jobs needing operator attention: failed either way, or stuck.
pub fn problem_jobs(
    conn: &mut StoreConnection,
    stuck_after: Duration,
) -> Result<Vec<ProgressRecord>> {
    let now = Utc::now().naive_utc();
    Ok(progress::all(conn)?
        .into_iter()
        .filter(|record| match record.sync_status() {
            Some(SyncStatus::Failed) | Some(SyncStatus::FailedPermanently) => true,
            Some(SyncStatus::Running) => now - record.started_at > stuck_after,
            _ => false,
        })
        .collect())
}

/// Pushes every failed or stuck job to the admin notifier, one message per
/// job. Returns how many were reported.
pub fn notify_problems(
    conn: &mut StoreConnection,
    stuck_after: Duration,
    notifier: &dyn AdminNotifier,
) -> Result<usize> {
    let problems = problem_jobs(conn, stuck_after)?;
    if problems.is_empty() {
        return Ok(0);
    }

    let admins = operations::active_admins(conn)?;
    for record in &problems {
        let detail = match record.sync_status() {
            Some(SyncStatus::Running) => "appears stuck".to_string(),
            _ => format!("is {}", record.status),
        };
        let mut message = format!(
            "sync job {} for user {} {} (started {})",
            record.job_id, record.user_id, detail, record.started_at
        );
        if let Some(error) = &record.error {
            message.push_str(&format!(": {error}"));
        }
        notifier.notify(&admins, &message);
    }
    Ok(problems.len())
}

/// Deletes progress rows whose TTL has elapsed. Returns the removed count.
pub fn cleanup(conn: &mut StoreConnection) -> Result<usize> {
    let removed = progress::purge_expired(conn, Utc::now().naive_utc())?;
    if removed > 0 {
        info!(removed, "purged expired sync progress");
    }
    Ok(removed)
}
