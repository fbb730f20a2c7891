use serde::{Deserialize, Serialize};

use super::ResponseMetadata;

#[derive(Debug, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub real_name: Option<String>,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    pub is_admin: Option<bool>,
}

impl User {
    /// Display name prefers the human-readable real_name over the handle.
    pub fn display_name(&self) -> &str {
        match self.real_name.as_deref() {
            Some(real) if !real.is_empty() => real,
            _ => &self.name,
        }
    }

    /// Slack omits emails for bots and restricted profiles; the archive still
    /// needs a stable, unique address per user.
    pub fn email_or_default(&self) -> String {
        match self.profile.email.as_deref() {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => format!("{}@slack.local", self.id),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub image_72: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsersListResponse {
    #[serde(default)]
    pub members: Vec<User>,
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct UserInfoResponse {
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, real_name: Option<&str>, email: Option<&str>) -> User {
        User {
            id: "U123".to_string(),
            name: name.to_string(),
            real_name: real_name.map(String::from),
            profile: UserProfile {
                email: email.map(String::from),
                display_name: None,
                image_72: None,
            },
            deleted: false,
            is_bot: false,
            is_admin: None,
        }
    }

    #[test]
    fn display_name_prefers_real_name() {
        assert_eq!(user("jdoe", Some("Jane Doe"), None).display_name(), "Jane Doe");
        assert_eq!(user("jdoe", None, None).display_name(), "jdoe");
        assert_eq!(user("jdoe", Some(""), None).display_name(), "jdoe");
    }

    #[test]
    fn email_falls_back_to_slack_local() {
        assert_eq!(
            user("jdoe", None, Some("jane@example.com")).email_or_default(),
            "jane@example.com"
        );
        assert_eq!(user("jdoe", None, None).email_or_default(), "U123@slack.local");
    }
}
