use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slarchive::api::{auth, SlackClient};
use slarchive::cli::{Cli, Command, OutputFormat, SyncCommand};
use slarchive::config::Config;
use slarchive::store::db::{create_store_pool, get_connection, StoreConnection};
use slarchive::store::models::UserRecord;
use slarchive::store::progress::{self, ProgressRecord};
use slarchive::store::operations;
use slarchive::sync::monitor::{self, MonitorReport, DEFAULT_STUCK_AFTER};
use slarchive::sync::orchestrator::{JobError, LogNotifier};
use slarchive::sync::{CancelFlag, FileIngestion, Orchestrator, SyncJob, SyncScope};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::from_env()?;
    let pool = create_store_pool(&config.db_path)
        .with_context(|| format!("Failed to open archive at {}", config.db_path.display()))?;

    match cli.command {
        Command::Cleanup => {
            let mut conn = get_connection(&pool).await?;
            let removed = monitor::cleanup(&mut conn)?;
            println!("Removed {removed} expired progress record(s)");
        }
        Command::Status { user, format } => {
            let mut conn = get_connection(&pool).await?;
            print_status(&mut conn, user.as_deref(), format)?;
            monitor::notify_problems(&mut conn, DEFAULT_STUCK_AFTER, &LogNotifier)?;
        }
        Command::Sync { scope } => {
            let bot_token = config.require_bot_token()?.to_string();
            let client = SlackClient::new()?;

            let identity = auth::test_auth(&client, &bot_token)
                .await
                .context("auth.test failed; check SLACK_BOT_TOKEN")?;
            info!(workspace = %identity.team, team_id = %identity.team_id, "authenticated");

            let mut conn = get_connection(&pool).await?;
            operations::upsert_workspace(&mut conn, &identity.team_id, &identity.team, &bot_token)?;
            let bot_user = operations::ensure_archive_user(
                &mut conn,
                &identity.team_id,
                &identity.user_id,
                &identity.user,
            )?;

            let (job, dry_run) = build_job(&mut conn, &scope, &identity.team_id, &bot_user)?;
            drop(conn);

            let files = FileIngestion::new(config.archive_dir.clone());
            let orchestrator = Orchestrator::new(pool.clone(), &client, &files, &bot_token)
                .with_user_token(config.user_token.clone());

            if dry_run {
                let planned = orchestrator.plan(&job).await?;
                println!("Would sync {} channel(s):", planned.len());
                for channel in &planned {
                    println!("  {}  {}", channel.id, channel.name);
                }
                return Ok(());
            }

            let cancel = CancelFlag::new();
            {
                let cancel = cancel.clone();
                ctrlc::set_handler(move || {
                    eprintln!("\nStopping after the current page...");
                    cancel.cancel();
                })
                .context("Failed to install the ctrl-c handler")?;
            }

            match orchestrator.run(&job, cancel).await {
                Ok(summary) => {
                    println!(
                        "Synced {} channel(s) ({} failed): {} message(s) saved of {} fetched in {}s",
                        summary.channels_synced,
                        summary.channels_failed,
                        summary.messages_saved,
                        summary.messages_fetched,
                        summary.elapsed_secs,
                    );
                }
                Err(JobError::Cancelled) => {
                    println!("Sync cancelled; progress up to this point is saved.");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "slarchive=debug" } else { "slarchive=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Maps a sync subcommand to a job. `--user` switches the acting identity to
/// an already-archived user; the default is the bot's own identity.
fn build_job(
    conn: &mut StoreConnection,
    scope: &SyncCommand,
    workspace_id: &str,
    bot_user: &UserRecord,
) -> Result<(SyncJob, bool)> {
    let acting_user = |conn: &mut StoreConnection, slack_id: &Option<String>| -> Result<i32> {
        match slack_id {
            Some(id) => match operations::find_user_by_slack_id(conn, id)? {
                Some(user) => Ok(user.id),
                None => bail!("unknown user {id}; run `slarchive sync users` first"),
            },
            None => Ok(bot_user.id),
        }
    };

    let job = |user_id, scope, channel_ids, full_sync, force, limit| SyncJob {
        user_id,
        workspace_id: workspace_id.to_string(),
        scope,
        channel_ids,
        full_sync,
        force,
        limit,
    };

    Ok(match scope {
        SyncCommand::All {
            full,
            channels,
            limit,
            dry_run,
            user,
        } => {
            let user_id = acting_user(conn, user)?;
            let ids = (!channels.is_empty()).then(|| channels.clone());
            (job(user_id, SyncScope::All, ids, *full, false, *limit), *dry_run)
        }
        SyncCommand::Dms {
            full,
            limit,
            dry_run,
            user,
        } => {
            let user_id = acting_user(conn, user)?;
            (job(user_id, SyncScope::Dms, None, *full, false, *limit), *dry_run)
        }
        SyncCommand::Users { limit } => {
            (job(bot_user.id, SyncScope::UserDirectory, None, false, false, *limit), false)
        }
        SyncCommand::Members { channels } => {
            let ids = (!channels.is_empty()).then(|| channels.clone());
            (job(bot_user.id, SyncScope::Membership, ids, false, false, None), false)
        }
        SyncCommand::Files { force, limit } => {
            (job(bot_user.id, SyncScope::Files, None, false, *force, *limit), false)
        }
    })
}

#[derive(Serialize)]
struct StatusOutput {
    report: MonitorReport,
    jobs: Vec<ProgressRecord>,
}

fn print_status(
    conn: &mut StoreConnection,
    user: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let jobs = match user {
        Some(slack_id) => {
            let user = operations::find_user_by_slack_id(conn, slack_id)?
                .with_context(|| format!("unknown user {slack_id}"))?;
            progress::for_user(conn, user.id)?
        }
        None => progress::all(conn)?,
    };
    let report = monitor::scan(conn, DEFAULT_STUCK_AFTER)?;

    match format {
        OutputFormat::Json => {
            let output = StatusOutput { report, jobs };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Human => {
            println!(
                "Jobs: {} running, {} completed, {} failed, {} permanently failed",
                report.running, report.completed, report.failed, report.failed_permanently
            );
            for stuck in &report.stuck {
                println!(
                    "  STUCK: user {} job {} (running {}s)",
                    stuck.user_id, stuck.job_id, stuck.running_for_secs
                );
            }
            if jobs.is_empty() {
                println!("No sync jobs recorded.");
            }
            for record in &jobs {
                let mut line = format!(
                    "  user {:>4}  {:<24} {:<20} {}/{}",
                    record.user_id, record.job_id, record.status, record.progress, record.total
                );
                if let Some(channel) = &record.current_channel {
                    line.push_str(&format!("  @ {channel}"));
                }
                if let Some(error) = &record.error {
                    line.push_str(&format!("  ({error})"));
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}
