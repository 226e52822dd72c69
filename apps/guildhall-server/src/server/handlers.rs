use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{
    auth::authenticate, core::AppState, errors::ApiError, graphql::AppSchema, storage,
};

/// Router state: the shared application state plus the executable schema
/// built over it.
#[derive(Clone)]
pub(crate) struct ApiState {
    pub(crate) app: AppState,
    pub(crate) schema: AppSchema,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// The single GraphQL endpoint. Authentication is optional at the
/// transport: a verified identity is attached to the request data and
/// each operation decides whether it requires one.
pub(crate) async fn graphql_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner();
    if let Ok(identity) = authenticate(&state.app, &headers) {
        request = request.data(identity);
    }
    state.schema.execute(request).await.into()
}

pub(crate) async fn download_image(
    State(state): State<ApiState>,
    Path(object_name): Path<String>,
) -> Result<Response, ApiError> {
    let (bytes, content_type) = storage::load_image(&state.app, &object_name).await?;
    Ok(([(CONTENT_TYPE, content_type)], bytes).into_response())
}
