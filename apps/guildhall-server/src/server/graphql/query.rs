use async_graphql::{Context, Object, Result as GraphQLResult, ID};

use crate::server::{core::AppState, domain};

use super::{
    require_identity,
    types::{ProfileObject, ServerObject},
};

pub(crate) struct QueryRoot;

#[Object]
impl QueryRoot {
    /// All servers the caller is a member of.
    async fn get_servers(&self, ctx: &Context<'_>) -> GraphQLResult<Vec<ServerObject>> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let views = domain::servers_for_member(state, &identity.email).await?;
        Ok(views.into_iter().map(Into::into).collect())
    }

    /// One server, with channels and members, visible to members only.
    async fn get_server(&self, ctx: &Context<'_>, id: ID) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let view = domain::server_for_member(state, id.as_str(), &identity.email).await?;
        Ok(view.into())
    }

    async fn get_profile_by_id(
        &self,
        ctx: &Context<'_>,
        profile_id: ID,
    ) -> GraphQLResult<ProfileObject> {
        let state = ctx.data::<AppState>()?;
        require_identity(ctx)?;
        let view = domain::profile_by_id(state, profile_id.as_str()).await?;
        Ok(view.into())
    }
}
