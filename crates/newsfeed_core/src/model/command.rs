//! Inbound commands consumed by workers.
//!
//! # Responsibility
//! - Define the wire shape of bus messages (`serde`, tagged by `type`).
//! - Reject structurally invalid commands before any store is touched.
//!
//! # Invariants
//! - A command that fails [`Command::validate`] can never succeed on retry.

use crate::model::{ContentId, GroupId, UserId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Structurally invalid command. Logged and dropped, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidDeltaError {
    /// Payload is not a decodable command.
    Malformed(String),
    /// An identifier field holds the nil uuid.
    NilId { field: &'static str },
}

impl Display for InvalidDeltaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(details) => write!(f, "malformed command payload: {details}"),
            Self::NilId { field } => write!(f, "command field `{field}` holds the nil id"),
        }
    }
}

impl Error for InvalidDeltaError {}

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    UserFollowGroups {
        user_id: UserId,
        group_ids: Vec<GroupId>,
    },
    #[serde(rename_all = "camelCase")]
    UserUnfollowGroups {
        user_id: UserId,
        group_ids: Vec<GroupId>,
    },
    /// Content was created or its lifecycle attributes changed.
    #[serde(rename_all = "camelCase")]
    ContentUpserted {
        content_id: ContentId,
        /// Epoch ms; absent while the content is a draft.
        #[serde(default)]
        published_at: Option<i64>,
        #[serde(default)]
        is_hidden: bool,
        created_at: i64,
    },
    #[serde(rename_all = "camelCase")]
    ContentGroupsChanged {
        content_id: ContentId,
        #[serde(default)]
        old_group_ids: Vec<GroupId>,
        #[serde(default)]
        new_group_ids: Vec<GroupId>,
    },
    #[serde(rename_all = "camelCase")]
    GroupArchiveStateChanged {
        group_ids: Vec<GroupId>,
        archived: bool,
    },
    /// Content was hard-deleted; every feed entry for it must go.
    #[serde(rename_all = "camelCase")]
    ContentDeleted { content_id: ContentId },
}

impl Command {
    /// Decodes and validates one JSON bus message.
    pub fn from_json(payload: &str) -> Result<Self, InvalidDeltaError> {
        let command: Command = serde_json::from_str(payload)
            .map_err(|err| InvalidDeltaError::Malformed(err.to_string()))?;
        command.validate()?;
        Ok(command)
    }

    /// Stable short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserFollowGroups { .. } => "user_follow_groups",
            Self::UserUnfollowGroups { .. } => "user_unfollow_groups",
            Self::ContentUpserted { .. } => "content_upserted",
            Self::ContentGroupsChanged { .. } => "content_groups_changed",
            Self::GroupArchiveStateChanged { .. } => "group_archive_state_changed",
            Self::ContentDeleted { .. } => "content_deleted",
        }
    }

    pub fn validate(&self) -> Result<(), InvalidDeltaError> {
        match self {
            Self::UserFollowGroups { user_id, group_ids }
            | Self::UserUnfollowGroups { user_id, group_ids } => {
                ensure_not_nil(*user_id, "userId")?;
                ensure_all_not_nil(group_ids, "groupIds")
            }
            Self::ContentUpserted { content_id, .. } => ensure_not_nil(*content_id, "contentId"),
            Self::ContentGroupsChanged {
                content_id,
                old_group_ids,
                new_group_ids,
            } => {
                ensure_not_nil(*content_id, "contentId")?;
                ensure_all_not_nil(old_group_ids, "oldGroupIds")?;
                ensure_all_not_nil(new_group_ids, "newGroupIds")
            }
            Self::GroupArchiveStateChanged { group_ids, .. } => {
                ensure_all_not_nil(group_ids, "groupIds")
            }
            Self::ContentDeleted { content_id } => ensure_not_nil(*content_id, "contentId"),
        }
    }
}

fn ensure_not_nil(id: Uuid, field: &'static str) -> Result<(), InvalidDeltaError> {
    if id.is_nil() {
        return Err(InvalidDeltaError::NilId { field });
    }
    Ok(())
}

fn ensure_all_not_nil(ids: &[Uuid], field: &'static str) -> Result<(), InvalidDeltaError> {
    ids.iter().try_for_each(|id| ensure_not_nil(*id, field))
}

#[cfg(test)]
mod tests {
    use super::{Command, InvalidDeltaError};
    use uuid::Uuid;

    #[test]
    fn decodes_follow_command_from_bus_payload() {
        let user = Uuid::new_v4();
        let group = Uuid::new_v4();
        let payload = format!(
            r#"{{"type":"user_follow_groups","userId":"{user}","groupIds":["{group}"]}}"#
        );

        let command = Command::from_json(&payload).unwrap();
        assert_eq!(
            command,
            Command::UserFollowGroups {
                user_id: user,
                group_ids: vec![group],
            }
        );
        assert_eq!(command.name(), "user_follow_groups");
    }

    #[test]
    fn content_change_group_lists_default_to_empty() {
        let content = Uuid::new_v4();
        let payload = format!(r#"{{"type":"content_groups_changed","contentId":"{content}"}}"#);

        match Command::from_json(&payload).unwrap() {
            Command::ContentGroupsChanged {
                old_group_ids,
                new_group_ids,
                ..
            } => {
                assert!(old_group_ids.is_empty());
                assert!(new_group_ids.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn content_upsert_defaults_to_visible_draft() {
        let content = Uuid::new_v4();
        let payload = format!(
            r#"{{"type":"content_upserted","contentId":"{content}","createdAt":7}}"#
        );

        assert_eq!(
            Command::from_json(&payload).unwrap(),
            Command::ContentUpserted {
                content_id: content,
                published_at: None,
                is_hidden: false,
                created_at: 7,
            }
        );
    }

    #[test]
    fn malformed_group_id_is_invalid_delta() {
        let payload = format!(
            r#"{{"type":"user_unfollow_groups","userId":"{}","groupIds":["not-a-uuid"]}}"#,
            Uuid::new_v4()
        );
        let err = Command::from_json(&payload).unwrap_err();
        assert!(matches!(err, InvalidDeltaError::Malformed(_)));
    }

    #[test]
    fn nil_ids_are_rejected() {
        let command = Command::GroupArchiveStateChanged {
            group_ids: vec![Uuid::new_v4(), Uuid::nil()],
            archived: true,
        };
        assert_eq!(
            command.validate().unwrap_err(),
            InvalidDeltaError::NilId { field: "groupIds" }
        );
    }
}
