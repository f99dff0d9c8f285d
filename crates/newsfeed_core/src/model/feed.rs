//! Materialized feed records and the outbound membership event.

use crate::model::{ContentId, UserId};
use serde::{Deserialize, Serialize};

/// Direction of a feed membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedAction {
    /// Content becomes eligible for the user's feed.
    Publish,
    /// Content leaves the user's feed.
    Remove,
}

impl FeedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Remove => "remove",
        }
    }
}

/// Per-user feed membership event, delivered at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMembershipChanged {
    pub content_id: ContentId,
    pub user_id: UserId,
    pub action: FeedAction,
}

impl FeedMembershipChanged {
    pub fn publish(content_id: ContentId, user_id: UserId) -> Self {
        Self {
            content_id,
            user_id,
            action: FeedAction::Publish,
        }
    }

    pub fn remove(content_id: ContentId, user_id: UserId) -> Self {
        Self {
            content_id,
            user_id,
            action: FeedAction::Remove,
        }
    }
}

/// One row of a user's materialized feed.
///
/// Presence means the content is eligible to appear in that user's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub user_id: UserId,
    pub content_id: ContentId,
    pub seen: bool,
}
