use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "slarchive",
    version,
    about = "Archives a Slack workspace into a local searchable store"
)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull messages, users, memberships or files from Slack.
    Sync {
        #[command(subcommand)]
        scope: SyncCommand,
    },
    /// Show sync job progress and health.
    Status {
        /// Limit to one archive user's jobs (Slack user id).
        #[arg(long)]
        user: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
    /// Delete expired sync progress rows.
    Cleanup,
}

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Sync every accessible channel.
    All {
        /// Re-read full history instead of starting at the watermark.
        #[arg(long)]
        full: bool,
        /// Restrict to specific channel ids (repeatable).
        #[arg(long = "channel")]
        channels: Vec<String>,
        /// Cap the number of channels synced.
        #[arg(long)]
        limit: Option<u32>,
        /// Print the target channel set without syncing.
        #[arg(long)]
        dry_run: bool,
        /// Act as this Slack user instead of the bot identity.
        #[arg(long)]
        user: Option<String>,
    },
    /// Sync direct messages and group DMs only.
    Dms {
        #[arg(long)]
        full: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        user: Option<String>,
    },
    /// Sync the workspace user directory.
    Users {
        /// Cap the number of users fetched.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Reconcile channel memberships.
    Members {
        #[arg(long = "channel")]
        channels: Vec<String>,
    },
    /// Download workspace files into the archive.
    Files {
        /// Re-download files that are already archived.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_all_with_flags() {
        let cli = Cli::try_parse_from([
            "slarchive", "sync", "all", "--full", "--channel", "C1", "--channel", "C2",
            "--limit", "5", "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Command::Sync {
                scope:
                    SyncCommand::All {
                        full,
                        channels,
                        limit,
                        dry_run,
                        user,
                    },
            } => {
                assert!(full);
                assert_eq!(channels, vec!["C1", "C2"]);
                assert_eq!(limit, Some(5));
                assert!(dry_run);
                assert!(user.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_status_format() {
        let cli = Cli::try_parse_from(["slarchive", "status", "--format", "json"]).unwrap();
        match cli.command {
            Command::Status { format, user } => {
                assert_eq!(format, OutputFormat::Json);
                assert!(user.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["slarchive", "sync", "users", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["slarchive", "export"]).is_err());
    }
}
