#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Returns the project code name.
#[must_use]
pub const fn project_name() -> &'static str {
    "guildhall"
}

/// Name of the default channel every server is created with. It can never
/// be deleted, and the name is reserved so no second copy can be created.
pub const DEFAULT_CHANNEL_NAME: &str = "general";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("name is invalid")]
    InvalidName,
    #[error("channel kind is invalid")]
    InvalidChannelKind,
    #[error("member role is invalid")]
    InvalidMemberRole,
    #[error("email is invalid")]
    InvalidEmail,
    #[error("profile name is invalid")]
    InvalidProfileName,
    #[error("profile id is invalid")]
    InvalidProfileId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileId(Ulid);

impl ProfileId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for ProfileId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let parsed = Ulid::from_string(&value).map_err(|_| DomainError::InvalidProfileId)?;
        Ok(Self(parsed))
    }
}

impl core::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerName(String);

impl ServerName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value, 1, 64)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChannelName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value, 1, 64)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileName(String);

impl ProfileName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProfileName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value, 1, 64).map_err(|_| DomainError::InvalidProfileName)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_email(&value)?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Audio,
    Video,
}

impl ChannelKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl TryFrom<String> for ChannelKind {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "text" => Ok(Self::Text),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            _ => Err(DomainError::InvalidChannelKind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Moderator,
    Guest,
}

impl MemberRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Guest => "guest",
        }
    }
}

impl TryFrom<String> for MemberRole {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "guest" => Ok(Self::Guest),
            _ => Err(DomainError::InvalidMemberRole),
        }
    }
}

#[must_use]
pub fn role_rank(role: MemberRole) -> u8 {
    match role {
        MemberRole::Admin => 3,
        MemberRole::Moderator => 2,
        MemberRole::Guest => 1,
    }
}

/// Channel creation is reserved to admins and moderators.
#[must_use]
pub fn can_manage_channels(role: MemberRole) -> bool {
    matches!(role, MemberRole::Admin | MemberRole::Moderator)
}

#[must_use]
pub fn is_protected_channel_name(name: &str) -> bool {
    name == DEFAULT_CHANNEL_NAME
}

/// A channel may be deleted only by its creator, and the default channel
/// never.
#[must_use]
pub fn can_delete_channel(caller_is_creator: bool, channel_name: &str) -> bool {
    caller_is_creator && !is_protected_channel_name(channel_name)
}

/// Role transitions are applied by an admin of the same server to someone
/// else's membership. Acting on one's own row is refused outright, which
/// also forecloses self-escalation, and the last admin cannot be demoted.
#[must_use]
pub fn can_assign_member_role(
    actor: MemberRole,
    target_is_actor: bool,
    target_is_last_admin: bool,
) -> bool {
    if target_is_actor || target_is_last_admin {
        return false;
    }
    matches!(actor, MemberRole::Admin)
}

/// Members are removed by an admin of the same server, or remove
/// themselves; either way the last admin stays.
#[must_use]
pub fn can_remove_member(
    actor: MemberRole,
    target_is_actor: bool,
    target_is_last_admin: bool,
) -> bool {
    if target_is_last_admin {
        return false;
    }
    target_is_actor || matches!(actor, MemberRole::Admin)
}

fn validate_name(value: &str, min: usize, max: usize) -> Result<(), DomainError> {
    if !(min..=max).contains(&value.len()) {
        return Err(DomainError::InvalidName);
    }

    if value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Ok(());
    }

    Err(DomainError::InvalidName)
}

fn validate_email(value: &str) -> Result<(), DomainError> {
    if !(3..=254).contains(&value.len()) {
        return Err(DomainError::InvalidEmail);
    }
    if value.chars().any(char::is_whitespace) {
        return Err(DomainError::InvalidEmail);
    }
    let Some((local, domain)) = value.split_once('@') else {
        return Err(DomainError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(DomainError::InvalidEmail);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        can_assign_member_role, can_delete_channel, can_manage_channels, can_remove_member,
        is_protected_channel_name, project_name, role_rank, ChannelKind, ChannelName, DomainError,
        Email, MemberRole, ProfileId, ProfileName, ServerName, DEFAULT_CHANNEL_NAME,
    };

    #[test]
    fn project_name_is_stable() {
        assert_eq!(project_name(), "guildhall");
    }

    #[test]
    fn server_and_channel_names_enforce_bounds() {
        let server = ServerName::try_from(String::from("Rust Hideout")).unwrap();
        let channel = ChannelName::try_from(String::from("general")).unwrap();
        assert_eq!(server.as_str(), "Rust Hideout");
        assert_eq!(channel.as_str(), "general");
        assert_eq!(
            ServerName::try_from(String::new()).unwrap_err(),
            DomainError::InvalidName
        );
        assert_eq!(
            ChannelName::try_from("x".repeat(65)).unwrap_err(),
            DomainError::InvalidName
        );
        assert_eq!(
            ServerName::try_from(String::from("bad\u{7}name")).unwrap_err(),
            DomainError::InvalidName
        );
    }

    #[test]
    fn profile_name_enforces_bounds() {
        let name = ProfileName::try_from(String::from("Alice Example")).unwrap();
        assert_eq!(name.as_str(), "Alice Example");
        assert_eq!(
            ProfileName::try_from(String::new()).unwrap_err(),
            DomainError::InvalidProfileName
        );
    }

    #[test]
    fn email_invariants_enforced() {
        let email = Email::try_from(String::from("alice@example.com")).unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
        for bad in ["", "no-at-sign", "@example.com", "alice@", "a b@example.com"] {
            assert_eq!(
                Email::try_from(String::from(bad)).unwrap_err(),
                DomainError::InvalidEmail
            );
        }
    }

    #[test]
    fn channel_kind_enforces_allowed_values() {
        assert_eq!(
            ChannelKind::try_from(String::from("text")).unwrap(),
            ChannelKind::Text
        );
        assert_eq!(
            ChannelKind::try_from(String::from("audio")).unwrap(),
            ChannelKind::Audio
        );
        assert_eq!(
            ChannelKind::try_from(String::from("video")).unwrap(),
            ChannelKind::Video
        );
        assert_eq!(
            ChannelKind::try_from(String::from("voice")).unwrap_err(),
            DomainError::InvalidChannelKind
        );
    }

    #[test]
    fn member_role_round_trips() {
        for role in [MemberRole::Admin, MemberRole::Moderator, MemberRole::Guest] {
            assert_eq!(
                MemberRole::try_from(String::from(role.as_str())).unwrap(),
                role
            );
        }
        assert_eq!(
            MemberRole::try_from(String::from("owner")).unwrap_err(),
            DomainError::InvalidMemberRole
        );
    }

    #[test]
    fn role_hierarchy_is_ordered() {
        assert!(role_rank(MemberRole::Admin) > role_rank(MemberRole::Moderator));
        assert!(role_rank(MemberRole::Moderator) > role_rank(MemberRole::Guest));
    }

    #[test]
    fn channel_management_is_reserved_to_admins_and_moderators() {
        assert!(can_manage_channels(MemberRole::Admin));
        assert!(can_manage_channels(MemberRole::Moderator));
        assert!(!can_manage_channels(MemberRole::Guest));
    }

    #[test]
    fn default_channel_is_protected() {
        assert!(is_protected_channel_name(DEFAULT_CHANNEL_NAME));
        assert!(!is_protected_channel_name("random"));
        assert!(!can_delete_channel(true, DEFAULT_CHANNEL_NAME));
        assert!(!can_delete_channel(false, "random"));
        assert!(can_delete_channel(true, "random"));
    }

    #[test]
    fn role_assignment_rules_are_enforced() {
        assert!(can_assign_member_role(MemberRole::Admin, false, false));
        assert!(!can_assign_member_role(MemberRole::Moderator, false, false));
        assert!(!can_assign_member_role(MemberRole::Guest, false, false));
        assert!(!can_assign_member_role(MemberRole::Admin, true, false));
        assert!(!can_assign_member_role(MemberRole::Admin, false, true));
    }

    #[test]
    fn member_removal_rules_are_enforced() {
        assert!(can_remove_member(MemberRole::Admin, false, false));
        assert!(!can_remove_member(MemberRole::Moderator, false, false));
        assert!(can_remove_member(MemberRole::Guest, true, false));
        assert!(!can_remove_member(MemberRole::Admin, true, true));
        assert!(!can_remove_member(MemberRole::Admin, false, true));
    }

    #[test]
    fn profile_id_round_trip_and_parse_validation() {
        let id = ProfileId::new();
        let parsed = ProfileId::try_from(id.to_string()).unwrap();
        assert_eq!(id, parsed);

        let invalid = ProfileId::try_from(String::from("not-a-ulid")).unwrap_err();
        assert_eq!(invalid, DomainError::InvalidProfileId);
    }
}
