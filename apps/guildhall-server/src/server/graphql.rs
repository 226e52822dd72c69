use async_graphql::{Context, EmptySubscription, Schema};

pub(crate) mod mutation;
pub(crate) mod query;
pub(crate) mod types;

use mutation::MutationRoot;
use query::QueryRoot;

use super::{auth::Identity, core::AppState, errors::ApiError};

pub(crate) type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the GraphQL schema with the shared application state injected as
/// context data. The per-request identity is attached by the transport
/// handler.
pub(crate) fn build_schema(state: AppState) -> AppSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(state)
        .finish()
}

/// The verified identity the transport attached to this request.
pub(crate) fn require_identity(ctx: &Context<'_>) -> async_graphql::Result<Identity> {
    ctx.data_opt::<Identity>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthenticated.into())
}
