use anyhow::anyhow;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use pasetors::{
    claims::{Claims, ClaimsValidationRules},
    local,
    token::UntrustedToken,
    version4::V4,
    Local,
};

use super::{core::AppState, errors::ApiError};

/// Verified identity claims attached to a request. Minting tokens is the
/// identity provider's job; this side only verifies and extracts.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) subject: String,
    pub(crate) email: String,
}

pub(crate) fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthenticated)?;
    let claims = verify_identity_token(state, token).map_err(|_| ApiError::Unauthenticated)?;
    let subject = claims
        .get_claim("sub")
        .and_then(serde_json::Value::as_str)
        .ok_or(ApiError::Unauthenticated)?
        .to_owned();
    let email = claims
        .get_claim("email")
        .and_then(serde_json::Value::as_str)
        .ok_or(ApiError::Unauthenticated)?
        .to_owned();
    Ok(Identity { subject, email })
}

fn verify_identity_token(state: &AppState, token: &str) -> anyhow::Result<Claims> {
    let untrusted = UntrustedToken::<Local, V4>::try_from(token).map_err(|e| anyhow!("{e}"))?;
    let validation_rules = ClaimsValidationRules::new();
    let trusted = local::decrypt(&state.identity_key, &untrusted, &validation_rules, None, None)
        .map_err(|e| anyhow!("token decrypt failed: {e}"))?;
    trusted
        .payload_claims()
        .cloned()
        .ok_or_else(|| anyhow!("token claims missing"))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    header.strip_prefix("Bearer ")
}

pub(crate) fn now_unix() -> i64 {
    let now = std::time::SystemTime::now();
    let seconds = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0))
        .as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

#[cfg(test)]
pub(crate) fn issue_identity_token(
    state: &AppState,
    subject: &str,
    email: &str,
) -> anyhow::Result<String> {
    let mut claims = Claims::new_expires_in(&std::time::Duration::from_secs(15 * 60))
        .map_err(|e| anyhow!("claims init failed: {e}"))?;
    claims
        .subject(subject)
        .map_err(|e| anyhow!("claim sub failed: {e}"))?;
    claims
        .add_additional("email", email)
        .map_err(|e| anyhow!("claim email failed: {e}"))?;
    local::encrypt(&state.identity_key, &claims, None, None)
        .map_err(|e| anyhow!("token mint failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::{authenticate, issue_identity_token};
    use crate::server::core::{AppConfig, AppState};
    use axum::http::HeaderMap;

    fn test_state() -> AppState {
        let config = AppConfig {
            image_root: std::env::temp_dir().join(format!("guildhall-auth-{}", ulid::Ulid::new())),
            ..AppConfig::default()
        };
        AppState::new(&config).expect("state initializes")
    }

    #[test]
    fn round_trips_subject_and_email_claims() {
        let state = test_state();
        let token =
            issue_identity_token(&state, "auth0|alice", "alice@example.com").expect("token mints");

        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        let identity = authenticate(&state, &headers).expect("token verifies");
        assert_eq!(identity.subject, "auth0|alice");
        assert_eq!(identity.email, "alice@example.com");
    }

    #[test]
    fn rejects_missing_malformed_and_foreign_tokens() {
        let state = test_state();
        let headers = HeaderMap::new();
        assert!(authenticate(&state, &headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer not-a-token".parse().unwrap());
        assert!(authenticate(&state, &headers).is_err());

        let other_state = test_state();
        let foreign_token = issue_identity_token(&other_state, "auth0|mallory", "m@example.com")
            .expect("token mints");
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            format!("Bearer {foreign_token}").parse().unwrap(),
        );
        assert!(authenticate(&state, &headers).is_err());
    }
}
