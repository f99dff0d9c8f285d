//! Follow / unfollow command processing.
//!
//! # Responsibility
//! - Persist follow graph changes.
//! - Backfill the feed for newly followed groups, bounded by the backfill cap.
//! - Remove feed rows that are no longer reachable after an unfollow.
//!
//! # Invariants
//! - One follow command never creates more feed rows than the backfill cap.
//! - Unfollow cleanup keeps content still visible through any followed group.
//! - Cleanup always runs for the requested groups, so a redelivered unfollow
//!   whose edges are already gone still converges.

use crate::config::EngineConfig;
use crate::model::{GroupId, UserId};
use crate::repo::dedup_ids;
use crate::repo::feed_repo::FeedStore;
use crate::repo::follow_repo::FollowStore;
use crate::service::ServiceResult;
use log::info;

/// Outcome of one follow command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowReport {
    /// Groups whose edge did not exist before.
    pub added_group_ids: Vec<GroupId>,
    /// Feed rows created by backfill.
    pub backfilled: usize,
}

/// Outcome of one unfollow command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnfollowReport {
    pub removed_group_ids: Vec<GroupId>,
    pub removed_entries: usize,
}

pub struct FollowChangeProcessor<F: FollowStore, D: FeedStore> {
    follows: F,
    feed: D,
    backfill_cap: u32,
}

impl<F: FollowStore, D: FeedStore> FollowChangeProcessor<F, D> {
    pub fn new(follows: F, feed: D, config: &EngineConfig) -> Self {
        Self {
            follows,
            feed,
            backfill_cap: config.backfill_cap,
        }
    }

    pub fn on_user_follow_groups(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> ServiceResult<FollowReport> {
        let added_group_ids = self.follows.follow(user_id, group_ids)?;
        let mut remaining = self.backfill_cap;
        let mut backfilled = 0;

        for group_id in &added_group_ids {
            if remaining == 0 {
                info!(
                    "event=follow_backfill module=follow status=skipped user_id={user_id} group_id={group_id} reason=cap_reached"
                );
                continue;
            }
            let inserted = self.feed.backfill_for_user(user_id, *group_id, remaining)?;
            remaining = remaining.saturating_sub(inserted as u32);
            backfilled += inserted;
        }

        info!(
            "event=follow module=follow status=ok user_id={} requested={} added={} backfilled={}",
            user_id,
            group_ids.len(),
            added_group_ids.len(),
            backfilled
        );
        Ok(FollowReport {
            added_group_ids,
            backfilled,
        })
    }

    pub fn on_user_unfollow_groups(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> ServiceResult<UnfollowReport> {
        let removed_group_ids = self.follows.unfollow(user_id, group_ids)?;

        // Read after the delete: a group the user re-followed concurrently stays protected.
        let still_followed = self.follows.followed_group_ids(user_id)?;
        let left_group_ids: Vec<GroupId> = dedup_ids(group_ids)
            .into_iter()
            .filter(|group_id| !still_followed.contains(group_id))
            .collect();

        let removed_entries =
            self.feed
                .remove_unfollowed_content(user_id, &left_group_ids, &still_followed)?;

        info!(
            "event=unfollow module=follow status=ok user_id={} requested={} removed={} cleaned_entries={}",
            user_id,
            group_ids.len(),
            removed_group_ids.len(),
            removed_entries
        );
        Ok(UnfollowReport {
            removed_group_ids,
            removed_entries,
        })
    }
}
