use guildhall_core::{
    can_delete_channel, is_protected_channel_name, ChannelKind, ChannelName, MemberRole,
};
use sqlx::Row;
use ulid::Ulid;

use crate::server::{
    auth::now_unix,
    core::{AppState, ChannelRecord},
    db::{channel_kind_to_i16, ensure_db_schema},
    errors::ApiError,
};

use super::{load_server_view, profile_by_email, require_member_role, ServerView};

/// Creates a channel on the server. Admins and moderators only; the
/// default channel name is reserved.
pub(crate) async fn create_channel(
    state: &AppState,
    server_id: &str,
    name: &ChannelName,
    kind: ChannelKind,
    caller_email: &str,
) -> Result<ServerView, ApiError> {
    if is_protected_channel_name(name.as_str()) {
        return Err(ApiError::InvalidInput);
    }
    let profile = profile_by_email(state, caller_email).await?;
    require_member_role(
        state,
        server_id,
        &profile.profile_id,
        &[MemberRole::Admin, MemberRole::Moderator],
    )
    .await?;

    let channel_id = Ulid::new().to_string();
    let now = now_unix();

    if let Some(pool) = &state.db_pool {
        sqlx::query(
            "INSERT INTO channels
                (channel_id, server_id, name, kind, created_by_profile_id, created_at_unix)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&channel_id)
        .bind(server_id)
        .bind(name.as_str())
        .bind(channel_kind_to_i16(kind))
        .bind(&profile.profile_id)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
    } else {
        let mut servers = state.servers.write().await;
        let server = servers.get_mut(server_id).ok_or(ApiError::ServerNotFound)?;
        server.channels.insert(
            channel_id.clone(),
            ChannelRecord {
                channel_id: channel_id.clone(),
                name: name.as_str().to_owned(),
                kind,
                created_by_profile_id: profile.profile_id.clone(),
                created_at_unix: now,
            },
        );
    }

    tracing::info!(event = "channel.create", %server_id, %channel_id);
    load_server_view(state, server_id).await
}

/// Deletes a channel. Only its creator may, and the default channel
/// never goes away.
pub(crate) async fn delete_channel(
    state: &AppState,
    channel_id: &str,
    caller_email: &str,
) -> Result<(), ApiError> {
    let profile = profile_by_email(state, caller_email).await?;
    ensure_db_schema(state).await?;

    if let Some(pool) = &state.db_pool {
        let row = sqlx::query(
            "SELECT server_id, name, created_by_profile_id FROM channels WHERE channel_id = $1",
        )
        .bind(channel_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        let row = row.ok_or(ApiError::ChannelNotFound)?;
        let name: String = row.try_get("name").map_err(|_| ApiError::Internal)?;
        let created_by: String = row
            .try_get("created_by_profile_id")
            .map_err(|_| ApiError::Internal)?;
        let server_id: String = row.try_get("server_id").map_err(|_| ApiError::Internal)?;

        check_deletable(&name, created_by == profile.profile_id, &server_id, channel_id)?;

        sqlx::query("DELETE FROM channels WHERE channel_id = $1")
            .bind(channel_id)
            .execute(pool)
            .await
            .map_err(|_| ApiError::Internal)?;
    } else {
        let mut servers = state.servers.write().await;
        let (server_id, server) = servers
            .iter_mut()
            .find(|(_, server)| server.channels.contains_key(channel_id))
            .ok_or(ApiError::ChannelNotFound)?;
        let server_id = server_id.clone();
        let channel = server
            .channels
            .get(channel_id)
            .ok_or(ApiError::ChannelNotFound)?;
        let name = channel.name.clone();
        let caller_is_creator = channel.created_by_profile_id == profile.profile_id;

        check_deletable(&name, caller_is_creator, &server_id, channel_id)?;
        server.channels.remove(channel_id);
    }

    tracing::info!(event = "channel.delete", %channel_id);
    Ok(())
}

fn check_deletable(
    name: &str,
    caller_is_creator: bool,
    server_id: &str,
    channel_id: &str,
) -> Result<(), ApiError> {
    if can_delete_channel(caller_is_creator, name) {
        return Ok(());
    }
    if is_protected_channel_name(name) {
        tracing::warn!(
            event = "channel.delete",
            outcome = "protected_default",
            %server_id,
            %channel_id,
        );
        return Err(ApiError::Forbidden);
    }
    // Non-creators get the same answer as a missing channel.
    Err(ApiError::ChannelNotFound)
}
