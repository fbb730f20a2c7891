use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Environment-driven configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token (xoxb-). Optional so status/cleanup work without one;
    /// sync commands call `require_bot_token`.
    pub bot_token: Option<String>,
    /// User token (xoxp-) for DM and private-channel reads.
    pub user_token: Option<String>,
    pub db_path: PathBuf,
    pub archive_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = || -> Result<PathBuf> {
            dirs::data_dir()
                .map(|d| d.join("slarchive"))
                .context("Could not determine a data directory; set SLARCHIVE_DB and SLARCHIVE_ARCHIVE_DIR")
        };

        let db_path = match get("SLARCHIVE_DB") {
            Some(path) => PathBuf::from(path),
            None => data_dir()?.join("archive.db"),
        };
        let archive_dir = match get("SLARCHIVE_ARCHIVE_DIR") {
            Some(path) => PathBuf::from(path),
            None => data_dir()?.join("files"),
        };

        Ok(Self {
            bot_token: get("SLACK_BOT_TOKEN").filter(|t| !t.is_empty()),
            user_token: get("SLACK_USER_TOKEN").filter(|t| !t.is_empty()),
            db_path,
            archive_dir,
        })
    }

    pub fn require_bot_token(&self) -> Result<&str> {
        match self.bot_token.as_deref() {
            Some(token) => Ok(token),
            None => bail!(
                "SLACK_BOT_TOKEN is not set. Create a bot token at https://api.slack.com/apps \
                 and export it:\n\n    export SLACK_BOT_TOKEN=xoxb-..."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        Config::from_lookup(|name| map.get(name).map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn explicit_paths_win_over_defaults() {
        let config = config_from(&[
            ("SLACK_BOT_TOKEN", "xoxb-abc"),
            ("SLARCHIVE_DB", "/tmp/x/archive.db"),
            ("SLARCHIVE_ARCHIVE_DIR", "/tmp/x/files"),
        ]);
        assert_eq!(config.db_path, PathBuf::from("/tmp/x/archive.db"));
        assert_eq!(config.archive_dir, PathBuf::from("/tmp/x/files"));
        assert_eq!(config.require_bot_token().unwrap(), "xoxb-abc");
    }

    #[test]
    fn missing_token_gives_actionable_error() {
        let config = config_from(&[
            ("SLARCHIVE_DB", "/tmp/x/archive.db"),
            ("SLARCHIVE_ARCHIVE_DIR", "/tmp/x/files"),
        ]);
        let err = config.require_bot_token().unwrap_err();
        assert!(err.to_string().contains("SLACK_BOT_TOKEN"));
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let config = config_from(&[
            ("SLACK_BOT_TOKEN", ""),
            ("SLARCHIVE_DB", "/tmp/x/archive.db"),
            ("SLARCHIVE_ARCHIVE_DIR", "/tmp/x/files"),
        ]);
        assert!(config.bot_token.is_none());
    }
}
