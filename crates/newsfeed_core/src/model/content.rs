//! Content lifecycle and content <-> group graph records.

use crate::model::{ContentId, GroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Content lifecycle attributes that decide feed eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: ContentId,
    /// Epoch ms publish timestamp; `None` while the content is a draft.
    pub published_at: Option<i64>,
    pub is_hidden: bool,
    /// Epoch ms creation timestamp. Backfill orders by this, newest first.
    pub created_at: i64,
}

impl ContentRecord {
    /// Returns whether the content may appear in any feed.
    pub fn is_feed_eligible(&self) -> bool {
        self.published_at.is_some() && !self.is_hidden
    }
}

/// Change of one content item's group membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentGroupDelta {
    pub content_id: ContentId,
    /// Groups in the new set but not in the old one, ascending.
    pub attached_group_ids: Vec<GroupId>,
    /// Groups in the old set but not in the new one, ascending.
    pub detached_group_ids: Vec<GroupId>,
}

impl ContentGroupDelta {
    /// Computes attached/detached groups by set difference.
    ///
    /// Duplicate ids in either input are collapsed.
    pub fn between(content_id: ContentId, new_group_ids: &[GroupId], old_group_ids: &[GroupId]) -> Self {
        let new_set: BTreeSet<GroupId> = new_group_ids.iter().copied().collect();
        let old_set: BTreeSet<GroupId> = old_group_ids.iter().copied().collect();
        Self {
            content_id,
            attached_group_ids: new_set.difference(&old_set).copied().collect(),
            detached_group_ids: old_set.difference(&new_set).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attached_group_ids.is_empty() && self.detached_group_ids.is_empty()
    }
}

/// Archive state of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembershipSnapshot {
    pub group_id: GroupId,
    pub is_archived: bool,
}

/// Effective (non-archived) groups of one content item, as pushed to read models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveContentGroups {
    pub content_id: ContentId,
    pub group_ids: Vec<GroupId>,
}

/// Cursor metadata of one association page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageInfo {
    /// Pass as `after` to fetch the next page. `None` on an empty page.
    pub end_cursor: Option<i64>,
    pub has_next_page: bool,
}

#[cfg(test)]
mod tests {
    use super::ContentGroupDelta;
    use uuid::Uuid;

    #[test]
    fn delta_keeps_retained_groups_out_of_both_sides() {
        let content = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let delta = ContentGroupDelta::between(content, &[a, c, c], &[a, b]);
        assert_eq!(delta.attached_group_ids, vec![c]);
        assert_eq!(delta.detached_group_ids, vec![b]);
    }

    #[test]
    fn identical_sets_produce_empty_delta() {
        let a = Uuid::new_v4();
        let delta = ContentGroupDelta::between(Uuid::new_v4(), &[a], &[a]);
        assert!(delta.is_empty());
    }
}
