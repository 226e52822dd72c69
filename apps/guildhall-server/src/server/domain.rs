use guildhall_core::{ChannelKind, MemberRole};
use sqlx::Row;

mod channels;
mod members;
mod profiles;
mod servers;

pub(crate) use channels::{create_channel, delete_channel};
pub(crate) use members::{add_member_to_server, change_member_role, delete_member};
pub(crate) use profiles::{create_profile, profile_by_email, profile_by_id};
pub(crate) use servers::{
    create_server, delete_server, leave_server, regenerate_invite_code, server_for_member,
    servers_for_member, update_server,
};

use super::{
    core::{AppState, MemberRecord, ServerRecord},
    db::{channel_kind_from_i16, ensure_db_schema, role_from_i16},
    errors::ApiError,
};

#[derive(Debug, Clone)]
pub(crate) struct ProfileView {
    pub(crate) profile_id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct MemberView {
    pub(crate) member_id: String,
    pub(crate) server_id: String,
    pub(crate) role: MemberRole,
    pub(crate) profile: ProfileView,
}

#[derive(Debug, Clone)]
pub(crate) struct ChannelView {
    pub(crate) channel_id: String,
    pub(crate) server_id: String,
    pub(crate) name: String,
    pub(crate) kind: ChannelKind,
    pub(crate) created_by_profile_id: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerView {
    pub(crate) server_id: String,
    pub(crate) name: String,
    pub(crate) image_url: String,
    pub(crate) invite_code: String,
    pub(crate) created_by_profile_id: String,
    pub(crate) channels: Vec<ChannelView>,
    pub(crate) members: Vec<MemberView>,
}

#[derive(Debug, Clone)]
pub(crate) struct MemberSummary {
    pub(crate) member_id: String,
    pub(crate) role: MemberRole,
}

/// The one authorization gate for server-scoped mutations: resolve the
/// caller's membership and require one of the allowed roles. Callers that
/// are not members at all get the same not-found as a missing server, so
/// the check never leaks server existence.
pub(crate) async fn require_member_role(
    state: &AppState,
    server_id: &str,
    profile_id: &str,
    allowed: &[MemberRole],
) -> Result<MemberSummary, ApiError> {
    ensure_db_schema(state).await?;

    if let Some(pool) = &state.db_pool {
        let row = sqlx::query(
            "SELECT member_id, role
             FROM members
             WHERE server_id = $1 AND profile_id = $2",
        )
        .bind(server_id)
        .bind(profile_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        let row = row.ok_or(ApiError::ServerNotFound)?;
        let role = role_from_i16(row.try_get::<i16, _>("role").map_err(|_| ApiError::Internal)?)
            .ok_or(ApiError::Internal)?;
        let member_id: String = row.try_get("member_id").map_err(|_| ApiError::Internal)?;
        return check_role(MemberSummary { member_id, role }, allowed, server_id, profile_id);
    }

    let servers = state.servers.read().await;
    let server = servers.get(server_id).ok_or(ApiError::ServerNotFound)?;
    let member = member_for_profile(server, profile_id).ok_or(ApiError::ServerNotFound)?;
    let summary = MemberSummary {
        member_id: member.member_id.clone(),
        role: member.role,
    };
    drop(servers);
    check_role(summary, allowed, server_id, profile_id)
}

fn check_role(
    member: MemberSummary,
    allowed: &[MemberRole],
    server_id: &str,
    profile_id: &str,
) -> Result<MemberSummary, ApiError> {
    if allowed.contains(&member.role) {
        Ok(member)
    } else {
        tracing::warn!(
            event = "authz.require_role",
            outcome = "forbidden",
            %server_id,
            %profile_id,
            member_id = %member.member_id,
            role = member.role.as_str(),
        );
        Err(ApiError::Forbidden)
    }
}

pub(crate) fn member_for_profile<'a>(
    server: &'a ServerRecord,
    profile_id: &str,
) -> Option<&'a MemberRecord> {
    server
        .members
        .values()
        .find(|member| member.profile_id == profile_id)
}

pub(crate) fn admin_count_in_record(server: &ServerRecord) -> usize {
    server
        .members
        .values()
        .filter(|member| member.role == MemberRole::Admin)
        .count()
}

/// Load a server with its channels and members (members carry their
/// profiles), the shape every server-returning operation responds with.
pub(crate) async fn load_server_view(
    state: &AppState,
    server_id: &str,
) -> Result<ServerView, ApiError> {
    if let Some(pool) = &state.db_pool {
        let server_row = sqlx::query(
            "SELECT name, image_url, invite_code, created_by_profile_id
             FROM servers
             WHERE server_id = $1",
        )
        .bind(server_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        let server_row = server_row.ok_or(ApiError::ServerNotFound)?;

        let channel_rows = sqlx::query(
            "SELECT channel_id, name, kind, created_by_profile_id
             FROM channels
             WHERE server_id = $1
             ORDER BY created_at_unix ASC, channel_id ASC",
        )
        .bind(server_id)
        .fetch_all(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        let mut channels = Vec::with_capacity(channel_rows.len());
        for row in channel_rows {
            let kind_raw: i16 = row.try_get("kind").map_err(|_| ApiError::Internal)?;
            channels.push(ChannelView {
                channel_id: row.try_get("channel_id").map_err(|_| ApiError::Internal)?,
                server_id: server_id.to_owned(),
                name: row.try_get("name").map_err(|_| ApiError::Internal)?,
                kind: channel_kind_from_i16(kind_raw).ok_or(ApiError::Internal)?,
                created_by_profile_id: row
                    .try_get("created_by_profile_id")
                    .map_err(|_| ApiError::Internal)?,
            });
        }

        let member_rows = sqlx::query(
            "SELECT m.member_id, m.role,
                    p.profile_id, p.name, p.email, p.image_url
             FROM members m
             JOIN profiles p ON p.profile_id = m.profile_id
             WHERE m.server_id = $1
             ORDER BY m.created_at_unix ASC, m.member_id ASC",
        )
        .bind(server_id)
        .fetch_all(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        let mut members = Vec::with_capacity(member_rows.len());
        for row in member_rows {
            let role_raw: i16 = row.try_get("role").map_err(|_| ApiError::Internal)?;
            members.push(MemberView {
                member_id: row.try_get("member_id").map_err(|_| ApiError::Internal)?,
                server_id: server_id.to_owned(),
                role: role_from_i16(role_raw).ok_or(ApiError::Internal)?,
                profile: ProfileView {
                    profile_id: row.try_get("profile_id").map_err(|_| ApiError::Internal)?,
                    name: row.try_get("name").map_err(|_| ApiError::Internal)?,
                    email: row.try_get("email").map_err(|_| ApiError::Internal)?,
                    image_url: row.try_get("image_url").map_err(|_| ApiError::Internal)?,
                },
            });
        }

        return Ok(ServerView {
            server_id: server_id.to_owned(),
            name: server_row.try_get("name").map_err(|_| ApiError::Internal)?,
            image_url: server_row
                .try_get("image_url")
                .map_err(|_| ApiError::Internal)?,
            invite_code: server_row
                .try_get("invite_code")
                .map_err(|_| ApiError::Internal)?,
            created_by_profile_id: server_row
                .try_get("created_by_profile_id")
                .map_err(|_| ApiError::Internal)?,
            channels,
            members,
        });
    }

    let servers = state.servers.read().await;
    let server = servers.get(server_id).ok_or(ApiError::ServerNotFound)?.clone();
    drop(servers);

    let mut channel_records: Vec<_> = server.channels.values().cloned().collect();
    channel_records
        .sort_by(|a, b| (a.created_at_unix, &a.channel_id).cmp(&(b.created_at_unix, &b.channel_id)));
    let channels = channel_records
        .into_iter()
        .map(|channel| ChannelView {
            channel_id: channel.channel_id,
            server_id: server_id.to_owned(),
            name: channel.name,
            kind: channel.kind,
            created_by_profile_id: channel.created_by_profile_id,
        })
        .collect();

    let mut member_records: Vec<_> = server.members.values().cloned().collect();
    member_records
        .sort_by(|a, b| (a.created_at_unix, &a.member_id).cmp(&(b.created_at_unix, &b.member_id)));
    let profiles = state.profiles.read().await;
    let mut members = Vec::with_capacity(member_records.len());
    for member in member_records {
        let profile = profiles
            .get(&member.profile_id)
            .ok_or(ApiError::Internal)?;
        members.push(MemberView {
            member_id: member.member_id,
            server_id: server_id.to_owned(),
            role: member.role,
            profile: ProfileView {
                profile_id: profile.profile_id.clone(),
                name: profile.name.clone(),
                email: profile.email.clone(),
                image_url: profile.image_url.clone(),
            },
        });
    }

    Ok(ServerView {
        server_id: server_id.to_owned(),
        name: server.name,
        image_url: server.image_url,
        invite_code: server.invite_code,
        created_by_profile_id: server.created_by_profile_id,
        channels,
        members,
    })
}
