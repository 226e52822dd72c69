use async_graphql::{Enum, InputObject, SimpleObject, ID};

use crate::server::domain::{ChannelView, MemberView, ProfileView, ServerView};

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "guildhall_core::MemberRole")]
pub(crate) enum MemberRole {
    Admin,
    Moderator,
    Guest,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "ChannelType", remote = "guildhall_core::ChannelKind")]
pub(crate) enum ChannelType {
    Text,
    Audio,
    Video,
}

#[derive(SimpleObject, Clone)]
#[graphql(name = "Profile")]
pub(crate) struct ProfileObject {
    pub(crate) id: ID,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) image_url: Option<String>,
}

impl From<ProfileView> for ProfileObject {
    fn from(view: ProfileView) -> Self {
        Self {
            id: ID(view.profile_id),
            name: view.name,
            email: view.email,
            image_url: view.image_url,
        }
    }
}

#[derive(SimpleObject, Clone)]
#[graphql(name = "Member")]
pub(crate) struct MemberObject {
    pub(crate) id: ID,
    pub(crate) server_id: ID,
    pub(crate) role: MemberRole,
    pub(crate) profile: ProfileObject,
}

impl From<MemberView> for MemberObject {
    fn from(view: MemberView) -> Self {
        Self {
            id: ID(view.member_id),
            server_id: ID(view.server_id),
            role: view.role.into(),
            profile: view.profile.into(),
        }
    }
}

#[derive(SimpleObject, Clone)]
#[graphql(name = "Channel")]
pub(crate) struct ChannelObject {
    pub(crate) id: ID,
    pub(crate) server_id: ID,
    pub(crate) name: String,
    #[graphql(name = "type")]
    pub(crate) channel_type: ChannelType,
    pub(crate) created_by_profile_id: ID,
}

impl From<ChannelView> for ChannelObject {
    fn from(view: ChannelView) -> Self {
        Self {
            id: ID(view.channel_id),
            server_id: ID(view.server_id),
            name: view.name,
            channel_type: view.kind.into(),
            created_by_profile_id: ID(view.created_by_profile_id),
        }
    }
}

#[derive(SimpleObject, Clone)]
#[graphql(name = "Server")]
pub(crate) struct ServerObject {
    pub(crate) id: ID,
    pub(crate) name: String,
    pub(crate) image_url: String,
    pub(crate) invite_code: String,
    pub(crate) profile_id: ID,
    pub(crate) channels: Vec<ChannelObject>,
    pub(crate) members: Vec<MemberObject>,
}

impl From<ServerView> for ServerObject {
    fn from(view: ServerView) -> Self {
        Self {
            id: ID(view.server_id),
            name: view.name,
            image_url: view.image_url,
            invite_code: view.invite_code,
            profile_id: ID(view.created_by_profile_id),
            channels: view.channels.into_iter().map(Into::into).collect(),
            members: view.members.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(InputObject)]
pub(crate) struct CreateProfileInput {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) image_url: Option<String>,
}

#[derive(InputObject)]
pub(crate) struct CreateServerInput {
    pub(crate) name: String,
    pub(crate) profile_id: ID,
}

#[derive(InputObject)]
pub(crate) struct UpdateServerInput {
    pub(crate) server_id: ID,
    pub(crate) name: String,
}

#[derive(InputObject)]
pub(crate) struct CreateChannelInput {
    pub(crate) server_id: ID,
    pub(crate) name: String,
    #[graphql(name = "type")]
    pub(crate) channel_type: ChannelType,
}
