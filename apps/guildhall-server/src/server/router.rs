use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{
    core::{AppConfig, AppState},
    graphql::build_schema,
    handlers::{download_image, graphql_handler, health, ApiState},
};

/// Build the axum router with global security middleware.
///
/// # Errors
/// Returns an error if configured limits or origins are invalid.
pub fn build_router(config: &AppConfig) -> anyhow::Result<Router> {
    let (router, _) = build_router_with_state(config)?;
    Ok(router)
}

pub(crate) fn build_router_with_state(config: &AppConfig) -> anyhow::Result<(Router, AppState)> {
    if config.max_image_bytes == 0 {
        return Err(anyhow!("image size limit must be at least 1 byte"));
    }
    if config.public_base_url.is_empty() {
        return Err(anyhow!("public base url must not be empty"));
    }

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .period(Duration::from_secs(60))
            .burst_size(config.rate_limit_requests_per_minute)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("invalid governor configuration"))?,
    );
    let app_state = AppState::new(config)?;
    let schema = build_schema(app_state.clone());
    let api_state = ApiState {
        app: app_state.clone(),
        schema,
    };
    let request_id_header = HeaderName::from_static("x-request-id");
    let governor_layer = GovernorLayer::new(governor_config);

    // Mutations carry at most one multipart image, so this route alone
    // gets headroom above the JSON body limit.
    let graphql_route = Router::new()
        .route("/graphql", post(graphql_handler))
        .layer(DefaultBodyLimit::max(
            config.max_image_bytes.saturating_add(config.max_body_bytes),
        ));

    let router = Router::new()
        .route("/health", get(health))
        .route("/images/{object_name}", get(download_image))
        .merge(graphql_route)
        .with_state(api_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
                .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.request_timeout,
                ))
                .layer(governor_layer)
                .layer(cors_layer(config)?),
        );

    Ok((router, app_state))
}

fn cors_layer(config: &AppConfig) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::with_capacity(config.allowed_origins.len());
    for origin in &config.allowed_origins {
        origins.push(
            origin
                .parse::<HeaderValue>()
                .map_err(|e| anyhow!("invalid allowed origin {origin:?}: {e}"))?,
        );
    }

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("apollo-require-preflight"),
            HeaderName::from_static("x-apollo-operation-name"),
        ])
        .allow_credentials(true))
}
