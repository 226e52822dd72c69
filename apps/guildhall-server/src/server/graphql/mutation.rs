use std::io::Read as _;

use async_graphql::{Context, Object, Result as GraphQLResult, Upload, ID};
use guildhall_core::{ChannelName, Email, ProfileName, ServerName};

use crate::server::{core::AppState, domain, errors::ApiError, storage};

use super::{
    require_identity,
    types::{
        CreateChannelInput, CreateProfileInput, CreateServerInput, MemberRole, ProfileObject,
        ServerObject, UpdateServerInput,
    },
};

const MAX_INVITE_CODE_CHARS: usize = 64;

pub(crate) struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Provision the caller's profile from their verified identity.
    /// Repeat calls return the existing profile.
    async fn create_profile(
        &self,
        ctx: &Context<'_>,
        input: CreateProfileInput,
    ) -> GraphQLResult<ProfileObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let name = ProfileName::try_from(input.name).map_err(ApiError::from)?;
        let email = Email::try_from(input.email).map_err(ApiError::from)?;
        if email.as_str() != identity.email {
            return Err(ApiError::InvalidInput.into());
        }
        let view =
            domain::create_profile(state, name.as_str(), email.as_str(), input.image_url).await?;
        Ok(view.into())
    }

    async fn create_server(
        &self,
        ctx: &Context<'_>,
        input: CreateServerInput,
        file: Option<Upload>,
    ) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        require_identity(ctx)?;
        let name = ServerName::try_from(input.name).map_err(ApiError::from)?;
        let image_url = store_required_image(ctx, state, file).await?;
        let view =
            domain::create_server(state, &name, input.profile_id.as_str(), image_url).await?;
        Ok(view.into())
    }

    async fn update_server(
        &self,
        ctx: &Context<'_>,
        input: UpdateServerInput,
        file: Option<Upload>,
    ) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let name = ServerName::try_from(input.name).map_err(ApiError::from)?;
        let image_url = store_required_image(ctx, state, file).await?;
        let view = domain::update_server(
            state,
            input.server_id.as_str(),
            &name,
            image_url,
            &identity.email,
        )
        .await?;
        Ok(view.into())
    }

    async fn regenerate_invite_code(
        &self,
        ctx: &Context<'_>,
        server_id: ID,
    ) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let view =
            domain::regenerate_invite_code(state, server_id.as_str(), &identity.email).await?;
        Ok(view.into())
    }

    async fn create_channel(
        &self,
        ctx: &Context<'_>,
        input: CreateChannelInput,
    ) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let name = ChannelName::try_from(input.name).map_err(ApiError::from)?;
        let view = domain::create_channel(
            state,
            input.server_id.as_str(),
            &name,
            input.channel_type.into(),
            &identity.email,
        )
        .await?;
        Ok(view.into())
    }

    async fn leave_server(&self, ctx: &Context<'_>, server_id: ID) -> GraphQLResult<ID> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        domain::leave_server(state, server_id.as_str(), &identity.email).await?;
        Ok(server_id)
    }

    async fn delete_server(&self, ctx: &Context<'_>, server_id: ID) -> GraphQLResult<ID> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        domain::delete_server(state, server_id.as_str(), &identity.email).await?;
        Ok(server_id)
    }

    async fn delete_channel(&self, ctx: &Context<'_>, channel_id: ID) -> GraphQLResult<ID> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        domain::delete_channel(state, channel_id.as_str(), &identity.email).await?;
        Ok(channel_id)
    }

    async fn add_member_to_server(
        &self,
        ctx: &Context<'_>,
        invite_code: String,
    ) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        if invite_code.is_empty() || invite_code.len() > MAX_INVITE_CODE_CHARS {
            return Err(ApiError::InvalidInput.into());
        }
        let view = domain::add_member_to_server(state, &invite_code, &identity.email).await?;
        Ok(view.into())
    }

    async fn change_member_role(
        &self,
        ctx: &Context<'_>,
        member_id: ID,
        role: MemberRole,
    ) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let view =
            domain::change_member_role(state, member_id.as_str(), role.into(), &identity.email)
                .await?;
        Ok(view.into())
    }

    async fn delete_member(&self, ctx: &Context<'_>, member_id: ID) -> GraphQLResult<ServerObject> {
        let state = ctx.data::<AppState>()?;
        let identity = require_identity(ctx)?;
        let view = domain::delete_member(state, member_id.as_str(), &identity.email).await?;
        Ok(view.into())
    }
}

/// Uploads are mandatory where they appear: read the single file within
/// the configured cap and hand it to the image store.
async fn store_required_image(
    ctx: &Context<'_>,
    state: &AppState,
    file: Option<Upload>,
) -> GraphQLResult<String> {
    let upload = file.ok_or(ApiError::ImageRequired)?;
    let value = upload.value(ctx).map_err(|_| ApiError::InvalidInput)?;
    let filename = value.filename.clone();

    let limit = u64::try_from(state.runtime.max_image_bytes).map_err(|_| ApiError::Internal)?;
    let mut bytes = Vec::new();
    value
        .content
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|_| ApiError::Internal)?;
    if bytes.len() > state.runtime.max_image_bytes {
        return Err(ApiError::PayloadTooLarge.into());
    }

    Ok(storage::store_image(state, &filename, bytes).await?)
}
