diesel::table! {
    workspaces (id) {
        id -> Text,
        name -> Text,
        bot_token -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    channels (id, workspace_id) {
        id -> Text,
        workspace_id -> Text,
        name -> Text,
        is_private -> Bool,
        is_im -> Bool,
        is_mpim -> Bool,
        is_archived -> Bool,
        member_count -> Nullable<Integer>,
        last_synced_at -> Nullable<Timestamp>,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    channel_members (channel_id, workspace_id, user_id) {
        channel_id -> Text,
        workspace_id -> Text,
        user_id -> Integer,
        joined_at -> Timestamp,
        left_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        slack_user_id -> Text,
        workspace_id -> Text,
        name -> Text,
        email -> Text,
        avatar_url -> Nullable<Text>,
        is_active -> Bool,
        is_admin -> Bool,
        access_token -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    messages (id) {
        id -> Integer,
        slack_message_id -> Text,
        workspace_id -> Text,
        channel_id -> Text,
        user_id -> Nullable<Integer>,
        text -> Text,
        ts -> Text,
        thread_ts -> Nullable<Text>,
        reply_count -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    slack_files (id) {
        id -> Integer,
        slack_file_id -> Text,
        workspace_id -> Text,
        name -> Text,
        title -> Text,
        mimetype -> Text,
        file_type -> Text,
        size -> BigInt,
        url_private -> Nullable<Text>,
        url_public -> Nullable<Text>,
        storage_path -> Nullable<Text>,
        thumbnails -> Text,
        is_public -> Bool,
        user_id -> Nullable<Integer>,
        channel_id -> Nullable<Text>,
        message_ts -> Nullable<Text>,
        status -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    sync_progress (user_id, job_id) {
        user_id -> Integer,
        job_id -> Text,
        status -> Text,
        progress -> Integer,
        total -> Integer,
        current_channel -> Nullable<Text>,
        started_at -> Timestamp,
        completed_at -> Nullable<Timestamp>,
        failed_at -> Nullable<Timestamp>,
        error -> Nullable<Text>,
        results -> Text,
        expires_at -> Nullable<Timestamp>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    workspaces,
    channels,
    channel_members,
    users,
    messages,
    slack_files,
    sync_progress,
);
