use guildhall_core::{can_assign_member_role, can_remove_member, MemberRole};
use sqlx::Row;
use ulid::Ulid;

use crate::server::{
    auth::now_unix,
    core::{AppState, MemberRecord},
    db::{ensure_db_schema, role_from_i16, role_to_i16},
    errors::ApiError,
};

use super::{
    admin_count_in_record, load_server_view, member_for_profile, profile_by_email, ServerView,
};

/// Redeems an invite code for the caller. The existence check and the
/// insert share a transaction (the server row is locked), and the unique
/// member index backstops concurrent redemptions.
pub(crate) async fn add_member_to_server(
    state: &AppState,
    invite_code: &str,
    caller_email: &str,
) -> Result<ServerView, ApiError> {
    let profile = profile_by_email(state, caller_email).await?;
    let member_id = Ulid::new().to_string();
    let now = now_unix();

    let server_id = if let Some(pool) = &state.db_pool {
        let mut tx = pool.begin().await.map_err(|_| ApiError::Internal)?;
        let server_id = sqlx::query_scalar::<_, String>(
            "SELECT server_id FROM servers WHERE invite_code = $1 FOR UPDATE",
        )
        .bind(invite_code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?
        .ok_or(ApiError::ServerNotFound)?;

        let existing = sqlx::query(
            "SELECT 1 FROM members WHERE server_id = $1 AND profile_id = $2",
        )
        .bind(&server_id)
        .bind(&profile.profile_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
        if existing.is_some() {
            return duplicate_member(&server_id, &profile.profile_id);
        }

        sqlx::query(
            "INSERT INTO members (member_id, server_id, profile_id, role, created_at_unix)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&member_id)
        .bind(&server_id)
        .bind(&profile.profile_id)
        .bind(role_to_i16(MemberRole::Guest))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            // The unique (server, profile) index catches redemptions that
            // raced past the existence check.
            if error
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                ApiError::MemberAlreadyExists
            } else {
                ApiError::Internal
            }
        })?;
        tx.commit().await.map_err(|_| ApiError::Internal)?;
        server_id
    } else {
        let mut servers = state.servers.write().await;
        let (server_id, server) = servers
            .iter_mut()
            .find(|(_, server)| server.invite_code == invite_code)
            .ok_or(ApiError::ServerNotFound)?;
        let server_id = server_id.clone();
        if member_for_profile(server, &profile.profile_id).is_some() {
            return duplicate_member(&server_id, &profile.profile_id);
        }
        server.members.insert(
            member_id.clone(),
            MemberRecord {
                member_id: member_id.clone(),
                profile_id: profile.profile_id.clone(),
                role: MemberRole::Guest,
                created_at_unix: now,
            },
        );
        server_id
    };

    tracing::info!(
        event = "member.join",
        %server_id,
        %member_id,
        profile_id = %profile.profile_id,
    );
    load_server_view(state, &server_id).await
}

fn duplicate_member(server_id: &str, profile_id: &str) -> Result<ServerView, ApiError> {
    tracing::warn!(
        event = "member.join",
        outcome = "duplicate",
        %server_id,
        %profile_id,
    );
    Err(ApiError::MemberAlreadyExists)
}

/// Changes a member's role. The caller must be an admin of the same
/// server, never acting on their own row, and the last admin cannot be
/// demoted. Check and write share the transaction.
pub(crate) async fn change_member_role(
    state: &AppState,
    member_id: &str,
    new_role: MemberRole,
    caller_email: &str,
) -> Result<ServerView, ApiError> {
    let profile = profile_by_email(state, caller_email).await?;
    ensure_db_schema(state).await?;

    let server_id = if let Some(pool) = &state.db_pool {
        let mut tx = pool.begin().await.map_err(|_| ApiError::Internal)?;
        let target = fetch_member_for_update(&mut tx, member_id).await?;
        let caller = fetch_caller_membership(&mut tx, &target.server_id, &profile.profile_id)
            .await?
            .ok_or(ApiError::Forbidden)?;
        let admins = count_admins(&mut tx, &target.server_id).await?;

        let target_is_actor = target.profile_id == profile.profile_id;
        let target_is_last_admin = target.role == MemberRole::Admin && admins <= 1;
        if !can_assign_member_role(caller.role, target_is_actor, target_is_last_admin) {
            return role_change_forbidden(&target.server_id, member_id, &profile.profile_id);
        }

        sqlx::query("UPDATE members SET role = $2 WHERE member_id = $1")
            .bind(member_id)
            .bind(role_to_i16(new_role))
            .execute(&mut *tx)
            .await
            .map_err(|_| ApiError::Internal)?;
        tx.commit().await.map_err(|_| ApiError::Internal)?;
        target.server_id
    } else {
        let mut servers = state.servers.write().await;
        let (server_id, server) = servers
            .iter_mut()
            .find(|(_, server)| server.members.contains_key(member_id))
            .ok_or(ApiError::MemberNotFound)?;
        let server_id = server_id.clone();
        let caller = member_for_profile(server, &profile.profile_id)
            .ok_or(ApiError::Forbidden)?;
        let caller_role = caller.role;
        let target = server.members.get(member_id).ok_or(ApiError::MemberNotFound)?;

        let target_is_actor = target.profile_id == profile.profile_id;
        let target_is_last_admin =
            target.role == MemberRole::Admin && admin_count_in_record(server) <= 1;
        if !can_assign_member_role(caller_role, target_is_actor, target_is_last_admin) {
            return role_change_forbidden(&server_id, member_id, &profile.profile_id);
        }

        let target = server
            .members
            .get_mut(member_id)
            .ok_or(ApiError::MemberNotFound)?;
        target.role = new_role;
        server_id
    };

    tracing::info!(
        event = "member.role.change",
        %server_id,
        %member_id,
        role = new_role.as_str(),
    );
    load_server_view(state, &server_id).await
}

/// Removes a member: an admin of the same server may remove anyone else,
/// and anyone may remove themselves, but the last admin stays.
pub(crate) async fn delete_member(
    state: &AppState,
    member_id: &str,
    caller_email: &str,
) -> Result<ServerView, ApiError> {
    let profile = profile_by_email(state, caller_email).await?;
    ensure_db_schema(state).await?;

    let server_id = if let Some(pool) = &state.db_pool {
        let mut tx = pool.begin().await.map_err(|_| ApiError::Internal)?;
        let target = fetch_member_for_update(&mut tx, member_id).await?;
        let caller = fetch_caller_membership(&mut tx, &target.server_id, &profile.profile_id)
            .await?
            .ok_or(ApiError::Forbidden)?;
        let admins = count_admins(&mut tx, &target.server_id).await?;

        let target_is_actor = target.profile_id == profile.profile_id;
        let target_is_last_admin = target.role == MemberRole::Admin && admins <= 1;
        if !can_remove_member(caller.role, target_is_actor, target_is_last_admin) {
            return removal_forbidden(&target.server_id, member_id, &profile.profile_id);
        }

        sqlx::query("DELETE FROM members WHERE member_id = $1")
            .bind(member_id)
            .execute(&mut *tx)
            .await
            .map_err(|_| ApiError::Internal)?;
        tx.commit().await.map_err(|_| ApiError::Internal)?;
        target.server_id
    } else {
        let mut servers = state.servers.write().await;
        let (server_id, server) = servers
            .iter_mut()
            .find(|(_, server)| server.members.contains_key(member_id))
            .ok_or(ApiError::MemberNotFound)?;
        let server_id = server_id.clone();
        let caller = member_for_profile(server, &profile.profile_id)
            .ok_or(ApiError::Forbidden)?;
        let caller_role = caller.role;
        let target = server.members.get(member_id).ok_or(ApiError::MemberNotFound)?;

        let target_is_actor = target.profile_id == profile.profile_id;
        let target_is_last_admin =
            target.role == MemberRole::Admin && admin_count_in_record(server) <= 1;
        if !can_remove_member(caller_role, target_is_actor, target_is_last_admin) {
            return removal_forbidden(&server_id, member_id, &profile.profile_id);
        }

        server.members.remove(member_id);
        server_id
    };

    tracing::info!(
        event = "member.remove",
        %server_id,
        %member_id,
        profile_id = %profile.profile_id,
    );
    load_server_view(state, &server_id).await
}

struct TargetMember {
    server_id: String,
    profile_id: String,
    role: MemberRole,
}

struct CallerMembership {
    role: MemberRole,
}

async fn fetch_member_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    member_id: &str,
) -> Result<TargetMember, ApiError> {
    let row = sqlx::query(
        "SELECT server_id, profile_id, role FROM members WHERE member_id = $1 FOR UPDATE",
    )
    .bind(member_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|_| ApiError::Internal)?;
    let row = row.ok_or(ApiError::MemberNotFound)?;
    Ok(TargetMember {
        server_id: row.try_get("server_id").map_err(|_| ApiError::Internal)?,
        profile_id: row.try_get("profile_id").map_err(|_| ApiError::Internal)?,
        role: role_from_i16(row.try_get::<i16, _>("role").map_err(|_| ApiError::Internal)?)
            .ok_or(ApiError::Internal)?,
    })
}

async fn fetch_caller_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    server_id: &str,
    profile_id: &str,
) -> Result<Option<CallerMembership>, ApiError> {
    let row = sqlx::query(
        "SELECT role FROM members WHERE server_id = $1 AND profile_id = $2 FOR UPDATE",
    )
    .bind(server_id)
    .bind(profile_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|_| ApiError::Internal)?;
    let Some(row) = row else {
        return Ok(None);
    };
    let role = role_from_i16(row.try_get::<i16, _>("role").map_err(|_| ApiError::Internal)?)
        .ok_or(ApiError::Internal)?;
    Ok(Some(CallerMembership { role }))
}

async fn count_admins(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    server_id: &str,
) -> Result<i64, ApiError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM members WHERE server_id = $1 AND role = $2",
    )
    .bind(server_id)
    .bind(role_to_i16(MemberRole::Admin))
    .fetch_one(&mut **tx)
    .await
    .map_err(|_| ApiError::Internal)
}

fn role_change_forbidden(
    server_id: &str,
    member_id: &str,
    profile_id: &str,
) -> Result<ServerView, ApiError> {
    tracing::warn!(
        event = "member.role.change",
        outcome = "forbidden",
        %server_id,
        %member_id,
        %profile_id,
    );
    Err(ApiError::Forbidden)
}

fn removal_forbidden(
    server_id: &str,
    member_id: &str,
    profile_id: &str,
) -> Result<ServerView, ApiError> {
    tracing::warn!(
        event = "member.remove",
        outcome = "forbidden",
        %server_id,
        %member_id,
        %profile_id,
    );
    Err(ApiError::Forbidden)
}
