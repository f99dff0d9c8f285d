//! Follow graph records.

use crate::model::{GroupId, UserId};
use serde::{Deserialize, Serialize};

/// Resumable position in a follower scan.
///
/// Wraps the follow-edge `sequence`. A scan starting at [`FollowCursor::START`]
/// sees every edge; later cursors only see edges inserted after that point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FollowCursor(pub i64);

impl FollowCursor {
    pub const START: FollowCursor = FollowCursor(0);
}

/// One persisted user -> group follow edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub user_id: UserId,
    pub group_id: GroupId,
    /// Strictly increasing per insert, never reused, gaps allowed.
    pub sequence: i64,
    /// Epoch ms insert timestamp.
    pub created_at: i64,
}

/// One page of a follower scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowersPage {
    /// Distinct follower ids in cursor order.
    pub user_ids: Vec<UserId>,
    /// Cursor to pass to the next call. Equals the input cursor on an empty page.
    pub next_cursor: FollowCursor,
}
