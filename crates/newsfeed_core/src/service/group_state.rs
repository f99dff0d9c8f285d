//! Group archive / unarchive batch processing.
//!
//! # Responsibility
//! - Flip the archive flag of groups that are not yet in the target state.
//! - Re-page the content <-> group association of the affected groups and push
//!   each content item's effective group list to auxiliary read models.
//!
//! # Invariants
//! - Association pages are bounded by the configured page size and walked
//!   with an `after` cursor until a page is empty or has no successor.
//! - The feed table is not touched; archived content is hidden at read time.

use crate::bus::ReadModelProjector;
use crate::config::EngineConfig;
use crate::model::GroupId;
use crate::repo::content_repo::ContentStore;
use crate::repo::dedup_ids;
use crate::service::ServiceResult;
use log::{debug, info};

/// Outcome of one archive-state command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStateReport {
    /// Groups whose flag actually changed.
    pub changed_group_ids: Vec<GroupId>,
    pub contents_projected: usize,
    pub batches: usize,
}

pub struct GroupStateBatchProcessor<C: ContentStore, P: ReadModelProjector> {
    content: C,
    projector: P,
    batch_size: u32,
}

impl<C: ContentStore, P: ReadModelProjector> GroupStateBatchProcessor<C, P> {
    pub fn new(content: C, projector: P, config: &EngineConfig) -> Self {
        Self {
            content,
            projector,
            batch_size: config.page_size,
        }
    }

    pub fn on_groups_archived_or_unarchived(
        &self,
        group_ids: &[GroupId],
        to_archived: bool,
    ) -> ServiceResult<GroupStateReport> {
        let group_ids = dedup_ids(group_ids);
        let mut report = GroupStateReport::default();
        if group_ids.is_empty() {
            return Ok(report);
        }

        // Unknown groups count as changed so they get registered in the target state.
        let known = self.content.group_states(&group_ids)?;
        report.changed_group_ids = group_ids
            .iter()
            .copied()
            .filter(|group_id| {
                !known
                    .iter()
                    .any(|state| state.group_id == *group_id && state.is_archived == to_archived)
            })
            .collect();
        self.content
            .set_groups_archived(&report.changed_group_ids, to_archived)?;

        // Pages every requested group, not only the flipped ones, so a redelivery
        // after a partial run still refreshes the read models.
        let mut after = None;
        loop {
            let (content_ids, page) =
                self.content
                    .content_ids_in_groups_page(&group_ids, after, self.batch_size)?;
            if content_ids.is_empty() {
                break;
            }

            let updates = self.content.effective_group_ids(&content_ids)?;
            self.projector.project_effective_groups(&updates)?;
            report.contents_projected += updates.len();
            report.batches += 1;
            debug!(
                "event=group_state_batch module=group_state status=ok batch={} contents={}",
                report.batches,
                updates.len()
            );

            if !page.has_next_page {
                break;
            }
            after = page.end_cursor;
        }

        info!(
            "event=group_state module=group_state status=ok archived={} requested={} changed={} contents={} batches={}",
            to_archived,
            group_ids.len(),
            report.changed_group_ids.len(),
            report.contents_projected,
            report.batches
        );
        Ok(report)
    }
}
