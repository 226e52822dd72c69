use guildhall_core::ProfileId;
use sqlx::Row;

use crate::server::{
    auth::now_unix,
    core::{AppState, ProfileRecord},
    db::ensure_db_schema,
    errors::ApiError,
};

use super::ProfileView;

/// First-authentication provisioning: creates the profile, or returns the
/// existing one when the email is already registered, so repeated calls
/// are safe.
pub(crate) async fn create_profile(
    state: &AppState,
    name: &str,
    email: &str,
    image_url: Option<String>,
) -> Result<ProfileView, ApiError> {
    ensure_db_schema(state).await?;
    let profile_id = ProfileId::new().to_string();
    let created_at_unix = now_unix();

    if let Some(pool) = &state.db_pool {
        let mut tx = pool.begin().await.map_err(|_| ApiError::Internal)?;
        sqlx::query(
            "INSERT INTO profiles (profile_id, name, email, image_url, created_at_unix)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(&profile_id)
        .bind(name)
        .bind(email)
        .bind(&image_url)
        .bind(created_at_unix)
        .execute(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
        let row = sqlx::query(
            "SELECT profile_id, name, email, image_url FROM profiles WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&mut *tx)
        .await
        .map_err(|_| ApiError::Internal)?;
        tx.commit().await.map_err(|_| ApiError::Internal)?;
        return profile_view_from_row(&row);
    }

    // Lock order is fixed everywhere: email index first, then profiles.
    let mut by_email = state.profile_ids_by_email.write().await;
    let mut profiles = state.profiles.write().await;
    if let Some(existing_id) = by_email.get(email) {
        let existing = profiles.get(existing_id).ok_or(ApiError::Internal)?;
        return Ok(view_from_record(existing));
    }

    let record = ProfileRecord {
        profile_id: profile_id.clone(),
        name: name.to_owned(),
        email: email.to_owned(),
        image_url,
        created_at_unix,
    };
    let view = view_from_record(&record);
    profiles.insert(profile_id.clone(), record);
    by_email.insert(email.to_owned(), profile_id.clone());
    drop(profiles);
    drop(by_email);
    tracing::info!(event = "profile.create", %profile_id);
    Ok(view)
}

pub(crate) async fn profile_by_id(
    state: &AppState,
    profile_id: &str,
) -> Result<ProfileView, ApiError> {
    ensure_db_schema(state).await?;

    if let Some(pool) = &state.db_pool {
        let row = sqlx::query(
            "SELECT profile_id, name, email, image_url FROM profiles WHERE profile_id = $1",
        )
        .bind(profile_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        let row = row.ok_or(ApiError::ProfileNotFound)?;
        return profile_view_from_row(&row);
    }

    let profiles = state.profiles.read().await;
    let record = profiles.get(profile_id).ok_or(ApiError::ProfileNotFound)?;
    Ok(view_from_record(record))
}

pub(crate) async fn profile_by_email(
    state: &AppState,
    email: &str,
) -> Result<ProfileView, ApiError> {
    ensure_db_schema(state).await?;

    if let Some(pool) = &state.db_pool {
        let row = sqlx::query(
            "SELECT profile_id, name, email, image_url FROM profiles WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiError::Internal)?;
        let row = row.ok_or(ApiError::ProfileNotFound)?;
        return profile_view_from_row(&row);
    }

    let by_email = state.profile_ids_by_email.read().await;
    let profile_id = by_email.get(email).ok_or(ApiError::ProfileNotFound)?.clone();
    drop(by_email);
    let profiles = state.profiles.read().await;
    let record = profiles.get(&profile_id).ok_or(ApiError::Internal)?;
    Ok(view_from_record(record))
}

fn profile_view_from_row(row: &sqlx::postgres::PgRow) -> Result<ProfileView, ApiError> {
    Ok(ProfileView {
        profile_id: row.try_get("profile_id").map_err(|_| ApiError::Internal)?,
        name: row.try_get("name").map_err(|_| ApiError::Internal)?,
        email: row.try_get("email").map_err(|_| ApiError::Internal)?,
        image_url: row.try_get("image_url").map_err(|_| ApiError::Internal)?,
    })
}

fn view_from_record(record: &ProfileRecord) -> ProfileView {
    ProfileView {
        profile_id: record.profile_id.clone(),
        name: record.name.clone(),
        email: record.email.clone(),
        image_url: record.image_url.clone(),
    }
}
