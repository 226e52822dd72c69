use std::collections::HashMap;

use guildhall_core::{ChannelKind, MemberRole, ServerName, DEFAULT_CHANNEL_NAME};
use ulid::Ulid;
use uuid::Uuid;

use crate::server::{
    auth::now_unix,
    core::{AppState, ChannelRecord, MemberRecord, ServerRecord},
    db::{channel_kind_to_i16, ensure_db_schema, role_to_i16},
    errors::ApiError,
};

use super::{
    load_server_view, member_for_profile, profile_by_email, require_member_role, ServerView,
};

/// Creates the server together with its `general` channel and the
/// creator's admin membership. All three records land atomically: one
/// transaction on Postgres, one write-lock critical section in memory.
pub(crate) async fn create_server(
    state: &AppState,
    name: &ServerName,
    creator_profile_id: &str,
    image_url: String,
) -> Result<ServerView, ApiError> {
    ensure_db_schema(state).await?;
    let server_id = Ulid::new().to_string();
    let channel_id = Ulid::new().to_string();
    let member_id = Ulid::new().to_string();
    let invite_code = Uuid::new_v4().to_string();
    let now = now_unix();

    if let Some(pool) = &state.db_pool {
        let mut tx = pool.begin().await.map_err(|_| ApiError::Internal)?;
        let creator = sqlx::query(
            "SELECT profile_id FROM profiles WHERE profile_id = $1 FOR UPDATE",
        )
        .bind(creator_profile_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
        if creator.is_none() {
            return Err(ApiError::ProfileNotFound);
        }

        sqlx::query(
            "INSERT INTO servers
                (server_id, name, image_url, invite_code, created_by_profile_id, created_at_unix)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&server_id)
        .bind(name.as_str())
        .bind(&image_url)
        .bind(&invite_code)
        .bind(creator_profile_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
        sqlx::query(
            "INSERT INTO channels
                (channel_id, server_id, name, kind, created_by_profile_id, created_at_unix)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&channel_id)
        .bind(&server_id)
        .bind(DEFAULT_CHANNEL_NAME)
        .bind(channel_kind_to_i16(ChannelKind::Text))
        .bind(creator_profile_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
        sqlx::query(
            "INSERT INTO members (member_id, server_id, profile_id, role, created_at_unix)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&member_id)
        .bind(&server_id)
        .bind(creator_profile_id)
        .bind(role_to_i16(MemberRole::Admin))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
        tx.commit().await.map_err(|_| ApiError::Internal)?;
    } else {
        {
            let profiles = state.profiles.read().await;
            if !profiles.contains_key(creator_profile_id) {
                return Err(ApiError::ProfileNotFound);
            }
        }

        let mut channels = HashMap::new();
        channels.insert(
            channel_id.clone(),
            ChannelRecord {
                channel_id: channel_id.clone(),
                name: String::from(DEFAULT_CHANNEL_NAME),
                kind: ChannelKind::Text,
                created_by_profile_id: creator_profile_id.to_owned(),
                created_at_unix: now,
            },
        );
        let mut members = HashMap::new();
        members.insert(
            member_id.clone(),
            MemberRecord {
                member_id: member_id.clone(),
                profile_id: creator_profile_id.to_owned(),
                role: MemberRole::Admin,
                created_at_unix: now,
            },
        );
        state.servers.write().await.insert(
            server_id.clone(),
            ServerRecord {
                name: name.as_str().to_owned(),
                image_url,
                invite_code,
                created_by_profile_id: creator_profile_id.to_owned(),
                created_at_unix: now,
                channels,
                members,
            },
        );
    }

    tracing::info!(
        event = "server.create",
        %server_id,
        profile_id = %creator_profile_id,
    );
    load_server_view(state, &server_id).await
}

/// Returns the server with its nested channels and members, but only to
/// one of its members.
pub(crate) async fn server_for_member(
    state: &AppState,
    server_id: &str,
    caller_email: &str,
) -> Result<ServerView, ApiError> {
    let profile = profile_by_email(state, caller_email).await?;

    if let Some(pool) = &state.db_pool {
        let membership = sqlx::query(
            "SELECT 1 FROM members WHERE server_id = $1 AND profile_id = $2",
        )
        .bind(server_id)
        .bind(&profile.profile_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        if membership.is_none() {
            return Err(ApiError::ServerNotFound);
        }
    } else {
        let servers = state.servers.read().await;
        let server = servers.get(server_id).ok_or(ApiError::ServerNotFound)?;
        if member_for_profile(server, &profile.profile_id).is_none() {
            return Err(ApiError::ServerNotFound);
        }
    }

    load_server_view(state, server_id).await
}

/// All servers the caller belongs to, newest first. A caller whose
/// profile has not been provisioned yet simply has no servers.
pub(crate) async fn servers_for_member(
    state: &AppState,
    caller_email: &str,
) -> Result<Vec<ServerView>, ApiError> {
    let profile = match profile_by_email(state, caller_email).await {
        Ok(profile) => profile,
        Err(ApiError::ProfileNotFound) => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };

    let server_ids = if let Some(pool) = &state.db_pool {
        sqlx::query_scalar::<_, String>(
            "SELECT s.server_id
             FROM members m
             JOIN servers s ON s.server_id = m.server_id
             WHERE m.profile_id = $1
             ORDER BY s.created_at_unix DESC, s.server_id DESC",
        )
        .bind(&profile.profile_id)
        .fetch_all(pool)
        .await
        .map_err(|_| ApiError::Internal)?
    } else {
        let servers = state.servers.read().await;
        let mut ids: Vec<_> = servers
            .iter()
            .filter(|(_, server)| member_for_profile(server, &profile.profile_id).is_some())
            .map(|(server_id, server)| (server.created_at_unix, server_id.clone()))
            .collect();
        ids.sort_by(|a, b| b.cmp(a));
        ids.into_iter().map(|(_, server_id)| server_id).collect()
    };

    let mut views = Vec::with_capacity(server_ids.len());
    for server_id in server_ids {
        views.push(load_server_view(state, &server_id).await?);
    }
    Ok(views)
}

/// Replaces the invite code with a fresh one; the old code stops
/// resolving for future redemptions. Admins only.
pub(crate) async fn regenerate_invite_code(
    state: &AppState,
    server_id: &str,
    caller_email: &str,
) -> Result<ServerView, ApiError> {
    let profile = profile_by_email(state, caller_email).await?;
    require_member_role(state, server_id, &profile.profile_id, &[MemberRole::Admin]).await?;
    let invite_code = Uuid::new_v4().to_string();

    if let Some(pool) = &state.db_pool {
        let updated = sqlx::query("UPDATE servers SET invite_code = $2 WHERE server_id = $1")
            .bind(server_id)
            .bind(&invite_code)
            .execute(pool)
            .await
            .map_err(|_| ApiError::Internal)?;
        if updated.rows_affected() == 0 {
            return Err(ApiError::ServerNotFound);
        }
    } else {
        let mut servers = state.servers.write().await;
        let server = servers.get_mut(server_id).ok_or(ApiError::ServerNotFound)?;
        server.invite_code = invite_code;
    }

    tracing::info!(event = "server.invite_code.regenerate", %server_id);
    load_server_view(state, server_id).await
}

/// Renames the server and replaces its image. Admins only.
pub(crate) async fn update_server(
    state: &AppState,
    server_id: &str,
    name: &ServerName,
    image_url: String,
    caller_email: &str,
) -> Result<ServerView, ApiError> {
    let profile = profile_by_email(state, caller_email).await?;
    require_member_role(state, server_id, &profile.profile_id, &[MemberRole::Admin]).await?;

    if let Some(pool) = &state.db_pool {
        let updated =
            sqlx::query("UPDATE servers SET name = $2, image_url = $3 WHERE server_id = $1")
                .bind(server_id)
                .bind(name.as_str())
                .bind(&image_url)
                .execute(pool)
                .await
                .map_err(|_| ApiError::Internal)?;
        if updated.rows_affected() == 0 {
            return Err(ApiError::ServerNotFound);
        }
    } else {
        let mut servers = state.servers.write().await;
        let server = servers.get_mut(server_id).ok_or(ApiError::ServerNotFound)?;
        server.name = name.as_str().to_owned();
        server.image_url = image_url;
    }

    tracing::info!(event = "server.update", %server_id);
    load_server_view(state, server_id).await
}

/// Deletes the server; channels and members go with it. Admins only.
pub(crate) async fn delete_server(
    state: &AppState,
    server_id: &str,
    caller_email: &str,
) -> Result<(), ApiError> {
    let profile = profile_by_email(state, caller_email).await?;
    require_member_role(state, server_id, &profile.profile_id, &[MemberRole::Admin]).await?;

    if let Some(pool) = &state.db_pool {
        let deleted = sqlx::query("DELETE FROM servers WHERE server_id = $1")
            .bind(server_id)
            .execute(pool)
            .await
            .map_err(|_| ApiError::Internal)?;
        if deleted.rows_affected() == 0 {
            return Err(ApiError::ServerNotFound);
        }
    } else {
        let mut servers = state.servers.write().await;
        servers.remove(server_id).ok_or(ApiError::ServerNotFound)?;
    }

    tracing::info!(event = "server.delete", %server_id, profile_id = %profile.profile_id);
    Ok(())
}

/// Removes every membership the caller holds in the server; zero rows is
/// not an error.
pub(crate) async fn leave_server(
    state: &AppState,
    server_id: &str,
    caller_email: &str,
) -> Result<(), ApiError> {
    let profile = profile_by_email(state, caller_email).await?;

    if let Some(pool) = &state.db_pool {
        let exists = sqlx::query("SELECT 1 FROM servers WHERE server_id = $1")
            .bind(server_id)
            .fetch_optional(pool)
            .await
            .map_err(|_| ApiError::Internal)?;
        if exists.is_none() {
            return Err(ApiError::ServerNotFound);
        }
        sqlx::query("DELETE FROM members WHERE server_id = $1 AND profile_id = $2")
            .bind(server_id)
            .bind(&profile.profile_id)
            .execute(pool)
            .await
            .map_err(|_| ApiError::Internal)?;
    } else {
        let mut servers = state.servers.write().await;
        let server = servers.get_mut(server_id).ok_or(ApiError::ServerNotFound)?;
        server
            .members
            .retain(|_, member| member.profile_id != profile.profile_id);
    }

    tracing::info!(event = "server.leave", %server_id, profile_id = %profile.profile_id);
    Ok(())
}
