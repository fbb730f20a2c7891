use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::debug;

use super::db::StoreConnection;
use super::models::{
    ChannelRecord, FileRecord, MemberRecord, NewChannel, NewFile, NewMember, NewMessage, NewUser,
    UserRecord, WorkspaceRecord,
};
use super::schema::{channel_members, channels, messages, slack_files, users, workspaces};
use crate::models::user::User;

// Workspace operations

pub fn upsert_workspace(
    conn: &mut StoreConnection,
    id: &str,
    name: &str,
    bot_token: &str,
) -> Result<()> {
    let record = WorkspaceRecord {
        id: id.to_string(),
        name: name.to_string(),
        bot_token: bot_token.to_string(),
        created_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(workspaces::table)
        .values(&record)
        .on_conflict(workspaces::id)
        .do_update()
        .set((
            workspaces::name.eq(&record.name),
            workspaces::bot_token.eq(&record.bot_token),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn workspace(conn: &mut StoreConnection, id: &str) -> Result<Option<WorkspaceRecord>> {
    Ok(workspaces::table
        .filter(workspaces::id.eq(id))
        .first(conn)
        .optional()?)
}

// Channel operations

/// Upsert a channel, refreshing name/flags/member_count but never touching
/// the sync watermark (`last_synced_at`).
pub fn upsert_channel(conn: &mut StoreConnection, channel: &NewChannel) -> Result<()> {
    diesel::insert_into(channels::table)
        .values(channel)
        .on_conflict((channels::id, channels::workspace_id))
        .do_update()
        .set((
            channels::name.eq(&channel.name),
            channels::is_private.eq(channel.is_private),
            channels::is_im.eq(channel.is_im),
            channels::is_mpim.eq(channel.is_mpim),
            channels::is_archived.eq(channel.is_archived),
            channels::member_count.eq(channel.member_count),
            channels::updated_at.eq(channel.updated_at),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn channel(
    conn: &mut StoreConnection,
    workspace_id: &str,
    channel_id: &str,
) -> Result<Option<ChannelRecord>> {
    Ok(channels::table
        .filter(channels::id.eq(channel_id))
        .filter(channels::workspace_id.eq(workspace_id))
        .first(conn)
        .optional()?)
}

/// All channels of a workspace, most recently updated first — the channel
/// ordering sync jobs use.
pub fn channels_for_workspace(
    conn: &mut StoreConnection,
    workspace_id: &str,
) -> Result<Vec<ChannelRecord>> {
    Ok(channels::table
        .filter(channels::workspace_id.eq(workspace_id))
        .order(channels::updated_at.desc())
        .load(conn)?)
}

pub fn set_channel_synced(
    conn: &mut StoreConnection,
    workspace_id: &str,
    channel_id: &str,
    at: NaiveDateTime,
) -> Result<()> {
    diesel::update(
        channels::table
            .filter(channels::id.eq(channel_id))
            .filter(channels::workspace_id.eq(workspace_id)),
    )
    .set(channels::last_synced_at.eq(at))
    .execute(conn)?;
    Ok(())
}

// Message operations

/// The watermark for incremental sync: ts of the newest stored message.
///
/// Slack ts strings are fixed-width (`<10-digit seconds>.<6-digit micros>`)
/// until 2286, so lexicographic MAX matches numeric order without losing
/// fractional precision.
pub fn latest_message_ts(
    conn: &mut StoreConnection,
    workspace_id: &str,
    channel_id: &str,
) -> Result<Option<String>> {
    Ok(messages::table
        .filter(messages::workspace_id.eq(workspace_id))
        .filter(messages::channel_id.eq(channel_id))
        .select(messages::ts)
        .order(messages::ts.desc())
        .first(conn)
        .optional()?)
}

/// Upsert keyed by slack_message_id. Returns true only when a net-new row was
/// inserted; a pre-existing id refreshes text/reply_count and returns false.
/// The UNIQUE constraint on (workspace_id, slack_message_id) is the hard
/// idempotency invariant; insert_or_ignore tolerates concurrent writers.
pub fn insert_message_if_new(conn: &mut StoreConnection, message: &NewMessage) -> Result<bool> {
    let existing: Option<i32> = messages::table
        .filter(messages::workspace_id.eq(&message.workspace_id))
        .filter(messages::slack_message_id.eq(&message.slack_message_id))
        .select(messages::id)
        .first(conn)
        .optional()?;

    if existing.is_some() {
        diesel::update(
            messages::table
                .filter(messages::workspace_id.eq(&message.workspace_id))
                .filter(messages::slack_message_id.eq(&message.slack_message_id)),
        )
        .set((
            messages::text.eq(&message.text),
            messages::reply_count.eq(message.reply_count),
        ))
        .execute(conn)?;
        return Ok(false);
    }

    let inserted = diesel::insert_or_ignore_into(messages::table)
        .values(message)
        .execute(conn)?;
    Ok(inserted > 0)
}

pub fn message_count(
    conn: &mut StoreConnection,
    workspace_id: &str,
    channel_id: &str,
) -> Result<i64> {
    Ok(messages::table
        .filter(messages::workspace_id.eq(workspace_id))
        .filter(messages::channel_id.eq(channel_id))
        .count()
        .get_result(conn)?)
}

// User operations

pub fn find_user_by_slack_id(
    conn: &mut StoreConnection,
    slack_user_id: &str,
) -> Result<Option<UserRecord>> {
    Ok(users::table
        .filter(users::slack_user_id.eq(slack_user_id))
        .first(conn)
        .optional()?)
}

pub fn user_by_id(conn: &mut StoreConnection, id: i32) -> Result<Option<UserRecord>> {
    Ok(users::table.filter(users::id.eq(id)).first(conn).optional()?)
}

/// Idempotent upsert of an archive user from a Slack directory entry, keyed
/// by the external slack_user_id. Returns the record and whether it was
/// newly created.
pub fn upsert_slack_user(
    conn: &mut StoreConnection,
    workspace_id: &str,
    user: &User,
) -> Result<(UserRecord, bool)> {
    let now = Utc::now().naive_utc();
    let name = user.display_name().to_string();
    let email = user.email_or_default();
    let avatar_url = user.profile.image_72.clone();

    if let Some(existing) = find_user_by_slack_id(conn, &user.id)? {
        diesel::update(users::table.filter(users::id.eq(existing.id)))
            .set((
                users::name.eq(&name),
                users::email.eq(&email),
                users::avatar_url.eq(&avatar_url),
                users::is_active.eq(!user.deleted),
                users::updated_at.eq(now),
            ))
            .execute(conn)?;
        let refreshed = user_by_id(conn, existing.id)?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished during upsert", existing.id))?;
        return Ok((refreshed, false));
    }

    let record = NewUser {
        slack_user_id: user.id.clone(),
        workspace_id: workspace_id.to_string(),
        name,
        email,
        avatar_url,
        is_active: !user.deleted,
        is_admin: user.is_admin.unwrap_or(false),
        access_token: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(users::table).values(&record).execute(conn)?;

    let created = find_user_by_slack_id(conn, &user.id)?
        .ok_or_else(|| anyhow::anyhow!("user {} missing after insert", user.id))?;
    debug!(slack_user_id = %user.id, "created archive user");
    Ok((created, true))
}

/// The identity a bot-token sync runs as when no acting user is given.
/// Created as an admin so AccessPolicy grants it the full public archive.
pub fn ensure_archive_user(
    conn: &mut StoreConnection,
    workspace_id: &str,
    slack_user_id: &str,
    name: &str,
) -> Result<UserRecord> {
    if let Some(existing) = find_user_by_slack_id(conn, slack_user_id)? {
        return Ok(existing);
    }

    let now = Utc::now().naive_utc();
    let record = NewUser {
        slack_user_id: slack_user_id.to_string(),
        workspace_id: workspace_id.to_string(),
        name: name.to_string(),
        email: format!("{}@slack.local", slack_user_id),
        avatar_url: None,
        is_active: true,
        is_admin: true,
        access_token: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(users::table).values(&record).execute(conn)?;
    find_user_by_slack_id(conn, slack_user_id)?
        .ok_or_else(|| anyhow::anyhow!("archive user missing after insert"))
}

pub fn active_admins(conn: &mut StoreConnection) -> Result<Vec<UserRecord>> {
    Ok(users::table
        .filter(users::is_admin.eq(true))
        .filter(users::is_active.eq(true))
        .load(conn)?)
}

// Membership operations

/// Record a current membership; re-joining clears any previous left_at.
pub fn upsert_membership(
    conn: &mut StoreConnection,
    channel_id: &str,
    workspace_id: &str,
    user_id: i32,
) -> Result<bool> {
    let existing: Option<MemberRecord> = channel_members::table
        .filter(channel_members::channel_id.eq(channel_id))
        .filter(channel_members::workspace_id.eq(workspace_id))
        .filter(channel_members::user_id.eq(user_id))
        .first(conn)
        .optional()?;

    match existing {
        Some(member) => {
            if member.left_at.is_some() {
                diesel::update(
                    channel_members::table
                        .filter(channel_members::channel_id.eq(channel_id))
                        .filter(channel_members::workspace_id.eq(workspace_id))
                        .filter(channel_members::user_id.eq(user_id)),
                )
                .set(channel_members::left_at.eq(None::<NaiveDateTime>))
                .execute(conn)?;
            }
            Ok(false)
        }
        None => {
            let record = NewMember {
                channel_id: channel_id.to_string(),
                workspace_id: workspace_id.to_string(),
                user_id,
                joined_at: Utc::now().naive_utc(),
                left_at: None,
            };
            diesel::insert_into(channel_members::table)
                .values(&record)
                .execute(conn)?;
            Ok(true)
        }
    }
}

pub fn mark_member_left(
    conn: &mut StoreConnection,
    channel_id: &str,
    workspace_id: &str,
    user_id: i32,
    at: NaiveDateTime,
) -> Result<()> {
    diesel::update(
        channel_members::table
            .filter(channel_members::channel_id.eq(channel_id))
            .filter(channel_members::workspace_id.eq(workspace_id))
            .filter(channel_members::user_id.eq(user_id))
            .filter(channel_members::left_at.is_null()),
    )
    .set(channel_members::left_at.eq(at))
    .execute(conn)?;
    Ok(())
}

/// A user is a current member iff a membership row exists with left_at NULL.
pub fn is_current_member(
    conn: &mut StoreConnection,
    channel_id: &str,
    workspace_id: &str,
    user_id: i32,
) -> Result<bool> {
    let found: Option<i32> = channel_members::table
        .filter(channel_members::channel_id.eq(channel_id))
        .filter(channel_members::workspace_id.eq(workspace_id))
        .filter(channel_members::user_id.eq(user_id))
        .filter(channel_members::left_at.is_null())
        .select(channel_members::user_id)
        .first(conn)
        .optional()?;
    Ok(found.is_some())
}

pub fn current_member_user_ids(
    conn: &mut StoreConnection,
    channel_id: &str,
    workspace_id: &str,
) -> Result<Vec<i32>> {
    Ok(channel_members::table
        .filter(channel_members::channel_id.eq(channel_id))
        .filter(channel_members::workspace_id.eq(workspace_id))
        .filter(channel_members::left_at.is_null())
        .select(channel_members::user_id)
        .load(conn)?)
}

// File operations

pub fn find_file_by_slack_id(
    conn: &mut StoreConnection,
    slack_file_id: &str,
) -> Result<Option<FileRecord>> {
    Ok(slack_files::table
        .filter(slack_files::slack_file_id.eq(slack_file_id))
        .first(conn)
        .optional()?)
}

/// Upsert keyed by slack_file_id. Returns true when the row is net-new.
pub fn upsert_file(conn: &mut StoreConnection, file: &NewFile) -> Result<bool> {
    let existing = find_file_by_slack_id(conn, &file.slack_file_id)?;
    if let Some(record) = existing {
        diesel::update(slack_files::table.filter(slack_files::id.eq(record.id)))
            .set((
                slack_files::name.eq(&file.name),
                slack_files::title.eq(&file.title),
                slack_files::mimetype.eq(&file.mimetype),
                slack_files::file_type.eq(&file.file_type),
                slack_files::size.eq(file.size),
                slack_files::url_private.eq(&file.url_private),
                slack_files::url_public.eq(&file.url_public),
                slack_files::storage_path.eq(&file.storage_path),
                slack_files::thumbnails.eq(&file.thumbnails),
                slack_files::is_public.eq(file.is_public),
                slack_files::status.eq(&file.status),
                slack_files::updated_at.eq(file.updated_at),
            ))
            .execute(conn)?;
        return Ok(false);
    }

    diesel::insert_or_ignore_into(slack_files::table)
        .values(file)
        .execute(conn)?;
    Ok(true)
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

    fn sample_message(ts: &str) -> NewMessage {
        NewMessage {
            slack_message_id: ts.to_string(),
            workspace_id: "T1".to_string(),
            channel_id: "C1".to_string(),
            user_id: None,
            text: "hello".to_string(),
            ts: ts.to_string(),
            thread_ts: None,
            reply_count: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn message_upsert_is_idempotent() {
        let (_dir, mut conn) = test_conn();

        assert!(insert_message_if_new(&mut conn, &sample_message("100.000100")).unwrap());
        // Same external id again: refreshed, not re-inserted.
        assert!(!insert_message_if_new(&mut conn, &sample_message("100.000100")).unwrap());
        assert_eq!(message_count(&mut conn, "T1", "C1").unwrap(), 1);
    }

    #[test]
    fn watermark_is_newest_ts() {
        let (_dir, mut conn) = test_conn();
        for ts in ["1700000100.000001", "1700000300.000003", "1700000200.000002"] {
            insert_message_if_new(&mut conn, &sample_message(ts)).unwrap();
        }
        assert_eq!(
            latest_message_ts(&mut conn, "T1", "C1").unwrap().as_deref(),
            Some("1700000300.000003")
        );
        assert_eq!(latest_message_ts(&mut conn, "T1", "C9").unwrap(), None);
    }

    #[test]
    fn channel_upsert_preserves_watermark() {
        let (_dir, mut conn) = test_conn();
        let channel = NewChannel {
            id: "C1".to_string(),
            workspace_id: "T1".to_string(),
            name: "general".to_string(),
            is_private: false,
            is_im: false,
            is_mpim: false,
            is_archived: false,
            member_count: Some(5),
            updated_at: Utc::now().naive_utc(),
        };
        upsert_channel(&mut conn, &channel).unwrap();

        let synced_at = Utc::now().naive_utc();
        set_channel_synced(&mut conn, "T1", "C1", synced_at).unwrap();

        // Re-upsert with a renamed channel; the watermark must survive.
        let renamed = NewChannel {
            name: "general-renamed".to_string(),
            updated_at: Utc::now().naive_utc(),
            ..channel
        };
        upsert_channel(&mut conn, &renamed).unwrap();

        let stored = super::channel(&mut conn, "T1", "C1").unwrap().unwrap();
        assert_eq!(stored.name, "general-renamed");
        assert_eq!(stored.last_synced_at, Some(synced_at));
    }

    #[test]
    fn membership_lifecycle() {
        let (_dir, mut conn) = test_conn();

        assert!(upsert_membership(&mut conn, "D1", "T1", 7).unwrap());
        assert!(is_current_member(&mut conn, "D1", "T1", 7).unwrap());

        mark_member_left(&mut conn, "D1", "T1", 7, Utc::now().naive_utc()).unwrap();
        assert!(!is_current_member(&mut conn, "D1", "T1", 7).unwrap());

        // Re-joining clears left_at.
        assert!(!upsert_membership(&mut conn, "D1", "T1", 7).unwrap());
        assert!(is_current_member(&mut conn, "D1", "T1", 7).unwrap());
    }

    #[test]
    fn slack_user_upsert_keyed_by_external_id() {
        let (_dir, mut conn) = test_conn();
        let user = crate::models::user::User {
            id: "U42".to_string(),
            name: "jdoe".to_string(),
            real_name: Some("Jane Doe".to_string()),
            profile: Default::default(),
            deleted: false,
            is_bot: false,
            is_admin: None,
        };

        let (first, created) = upsert_slack_user(&mut conn, "T1", &user).unwrap();
        assert!(created);
        assert_eq!(first.name, "Jane Doe");
        assert_eq!(first.email, "U42@slack.local");

        let (second, created) = upsert_slack_user(&mut conn, "T1", &user).unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }
}
