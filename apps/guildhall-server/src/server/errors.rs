use async_graphql::ErrorExtensions;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Every failure a store operation or the API layer can surface. Each
/// variant carries a stable machine-readable code so clients can branch
/// without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiError {
    Unauthenticated,
    ProfileNotFound,
    ServerNotFound,
    ChannelNotFound,
    MemberNotFound,
    NotFound,
    Forbidden,
    MemberAlreadyExists,
    ImageRequired,
    InvalidInput,
    PayloadTooLarge,
    Internal,
}

impl ApiError {
    pub(crate) const fn code(self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::ProfileNotFound => "PROFILE_NOT_FOUND",
            Self::ServerNotFound => "SERVER_NOT_FOUND",
            Self::ChannelNotFound => "CHANNEL_NOT_FOUND",
            Self::MemberNotFound => "MEMBER_NOT_FOUND",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::MemberAlreadyExists => "MEMBER_ALREADY_EXISTS",
            Self::ImageRequired => "IMAGE_REQUIRED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Internal => "INTERNAL_SERVER_ERROR",
        }
    }

    pub(crate) const fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "not authenticated",
            Self::ProfileNotFound => "profile not found",
            Self::ServerNotFound => "server not found",
            Self::ChannelNotFound => "channel not found",
            Self::MemberNotFound => "member not found",
            Self::NotFound => "resource not found",
            Self::Forbidden => "insufficient role for this operation",
            Self::MemberAlreadyExists => "member already exists",
            Self::ImageRequired => "an image upload is required",
            Self::InvalidInput => "invalid input",
            Self::PayloadTooLarge => "payload exceeds the configured limit",
            Self::Internal => "internal error",
        }
    }

    const fn status(self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::ProfileNotFound
            | Self::ServerNotFound
            | Self::ChannelNotFound
            | Self::MemberNotFound
            | Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::MemberAlreadyExists => StatusCode::CONFLICT,
            Self::ImageRequired | Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<guildhall_core::DomainError> for ApiError {
    fn from(_: guildhall_core::DomainError) -> Self {
        Self::InvalidInput
    }
}

impl From<ApiError> for async_graphql::Error {
    fn from(error: ApiError) -> Self {
        async_graphql::Error::new(error.message())
            .extend_with(|_, extensions| extensions.set("code", error.code()))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(ErrorBody { error: self.code() })).into_response()
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::ApiError;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ApiError::ProfileNotFound.code(), "PROFILE_NOT_FOUND");
        assert_eq!(ApiError::MemberAlreadyExists.code(), "MEMBER_ALREADY_EXISTS");
        assert_eq!(ApiError::ImageRequired.code(), "IMAGE_REQUIRED");
    }

    #[test]
    fn graphql_conversion_carries_the_code_extension() {
        let error = async_graphql::Error::from(ApiError::Forbidden);
        let server_error = error.into_server_error(async_graphql::Pos::default());
        let serialized = serde_json::to_value(&server_error).expect("server error serializes");
        assert_eq!(serialized["extensions"]["code"], "FORBIDDEN");
    }
}
