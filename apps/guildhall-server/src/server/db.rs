use guildhall_core::{ChannelKind, MemberRole};

use super::{core::AppState, errors::ApiError};

/// Idempotent schema bootstrap. Runs at most once per process, serialized
/// across processes by a Postgres advisory lock.
pub(crate) async fn ensure_db_schema(state: &AppState) -> Result<(), ApiError> {
    const SCHEMA_INIT_LOCK_ID: i64 = 0x4755_494c_4448_4c4c;
    let Some(pool) = &state.db_pool else {
        return Ok(());
    };

    state
        .db_init
        .get_or_try_init(|| async move {
            let mut tx = pool.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(SCHEMA_INIT_LOCK_ID)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS profiles (
                    profile_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT UNIQUE NOT NULL,
                    image_url TEXT NULL,
                    created_at_unix BIGINT NOT NULL
                )",
            )
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS servers (
                    server_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    image_url TEXT NOT NULL,
                    invite_code TEXT UNIQUE NOT NULL,
                    created_by_profile_id TEXT NOT NULL
                        REFERENCES profiles(profile_id) ON DELETE CASCADE,
                    created_at_unix BIGINT NOT NULL
                )",
            )
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS channels (
                    channel_id TEXT PRIMARY KEY,
                    server_id TEXT NOT NULL REFERENCES servers(server_id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    kind SMALLINT NOT NULL,
                    created_by_profile_id TEXT NOT NULL
                        REFERENCES profiles(profile_id) ON DELETE CASCADE,
                    created_at_unix BIGINT NOT NULL
                )",
            )
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS members (
                    member_id TEXT PRIMARY KEY,
                    server_id TEXT NOT NULL REFERENCES servers(server_id) ON DELETE CASCADE,
                    profile_id TEXT NOT NULL
                        REFERENCES profiles(profile_id) ON DELETE CASCADE,
                    role SMALLINT NOT NULL,
                    created_at_unix BIGINT NOT NULL
                )",
            )
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_members_server_profile_unique
                    ON members(server_id, profile_id)",
            )
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_members_profile ON members(profile_id)",
            )
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_channels_server ON channels(server_id)",
            )
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<(), sqlx::Error>(())
        })
        .await
        .map_err(|_| ApiError::Internal)?;
    Ok(())
}

pub(crate) fn role_to_i16(role: MemberRole) -> i16 {
    match role {
        MemberRole::Admin => 2,
        MemberRole::Moderator => 1,
        MemberRole::Guest => 0,
    }
}

pub(crate) fn role_from_i16(value: i16) -> Option<MemberRole> {
    match value {
        2 => Some(MemberRole::Admin),
        1 => Some(MemberRole::Moderator),
        0 => Some(MemberRole::Guest),
        _ => None,
    }
}

pub(crate) fn channel_kind_to_i16(kind: ChannelKind) -> i16 {
    match kind {
        ChannelKind::Text => 0,
        ChannelKind::Audio => 1,
        ChannelKind::Video => 2,
    }
}

pub(crate) fn channel_kind_from_i16(value: i16) -> Option<ChannelKind> {
    match value {
        0 => Some(ChannelKind::Text),
        1 => Some(ChannelKind::Audio),
        2 => Some(ChannelKind::Video),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{channel_kind_from_i16, channel_kind_to_i16, role_from_i16, role_to_i16};
    use guildhall_core::{ChannelKind, MemberRole};

    #[test]
    fn role_columns_round_trip() {
        for role in [MemberRole::Admin, MemberRole::Moderator, MemberRole::Guest] {
            assert_eq!(role_from_i16(role_to_i16(role)), Some(role));
        }
        assert_eq!(role_from_i16(9), None);
    }

    #[test]
    fn channel_kind_columns_round_trip() {
        for kind in [ChannelKind::Text, ChannelKind::Audio, ChannelKind::Video] {
            assert_eq!(channel_kind_from_i16(channel_kind_to_i16(kind)), Some(kind));
        }
        assert_eq!(channel_kind_from_i16(9), None);
    }
}
