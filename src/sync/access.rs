//! Who may read which channel, and with which token.

use anyhow::{bail, Result};

use crate::store::db::StoreConnection;
use crate::store::models::{ChannelRecord, UserRecord};
use crate::store::operations;

/// Pure access decision. Admins read everything; public channels are open to
/// any archive user; membership-gated channels (private, DM, group DM) need a
/// current membership row.
pub fn can_access(user: &UserRecord, channel: &ChannelRecord, is_current_member: bool) -> bool {
    if user.is_admin {
        return true;
    }
    if !channel.is_membership_gated() {
        return true;
    }
    is_current_member
}

/// Store-backed wrapper: loads the membership row and delegates.
pub fn user_can_access(
    conn: &mut StoreConnection,
    user: &UserRecord,
    channel: &ChannelRecord,
) -> Result<bool> {
    if user.is_admin || !channel.is_membership_gated() {
        return Ok(true);
    }
    let member =
        operations::is_current_member(conn, &channel.id, &channel.workspace_id, user.id)?;
    Ok(can_access(user, channel, member))
}

/// Token selection: the bot token reads public channels; membership-gated
/// channels need the syncing user's own token.
pub fn token_for_channel<'a>(
    channel: &ChannelRecord,
    bot_token: &'a str,
    user_token: Option<&'a str>,
) -> Result<&'a str> {
    if !channel.is_membership_gated() {
        return Ok(bot_token);
    }
    match user_token {
        Some(token) => Ok(token),
        None => bail!(
            "channel {} requires a user token (private/DM channels are not readable with the bot token)",
            channel.id
        ),
    }
}
