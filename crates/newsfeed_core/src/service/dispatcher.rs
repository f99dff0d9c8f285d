//! Content fan-out dispatcher.
//!
//! # Responsibility
//! - Turn a content group change into attached/detached group sets.
//! - Stream the affected followers to the message sink page by page.
//!
//! # Invariants
//! - Pages within one pass are strictly sequential; the cursor only advances.
//! - The detach pass never removes users that still follow a group in the
//!   new group set.
//! - A pass ends on an empty page or a page shorter than the page size.

use crate::bus::MessageSink;
use crate::config::EngineConfig;
use crate::model::content::ContentGroupDelta;
use crate::model::feed::{FeedAction, FeedMembershipChanged};
use crate::model::follow::FollowCursor;
use crate::model::{ContentId, GroupId, UserId};
use crate::repo::follow_repo::FollowStore;
use crate::repo::RepoResult;
use crate::service::ServiceResult;
use log::{debug, info};
use std::time::Instant;

/// Lazy, finite sequence of follower batches over a cursor-paged scan.
///
/// Yields one `Vec<UserId>` per page. Stops after an empty page, a short page,
/// or the first error. [`FollowerBatches::cursor`] exposes the position after
/// the last yielded page, so an interrupted scan can resume with
/// [`FollowerBatches::resume_from`].
pub struct FollowerBatches<'s, F: FollowStore + ?Sized> {
    store: &'s F,
    group_ids: Vec<GroupId>,
    exclude_group_ids: Vec<GroupId>,
    cursor: FollowCursor,
    page_size: u32,
    finished: bool,
}

impl<'s, F: FollowStore + ?Sized> FollowerBatches<'s, F> {
    pub fn new(
        store: &'s F,
        group_ids: Vec<GroupId>,
        exclude_group_ids: Vec<GroupId>,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            finished: group_ids.is_empty() || page_size == 0,
            group_ids,
            exclude_group_ids,
            cursor: FollowCursor::START,
            page_size,
        }
    }

    /// Starts the scan after `cursor` instead of the beginning.
    pub fn resume_from(mut self, cursor: FollowCursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn cursor(&self) -> FollowCursor {
        self.cursor
    }
}

impl<F: FollowStore + ?Sized> Iterator for FollowerBatches<'_, F> {
    type Item = RepoResult<Vec<UserId>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let page = match self.store.get_followers(
            &self.group_ids,
            &self.exclude_group_ids,
            self.cursor,
            self.page_size,
        ) {
            Ok(page) => page,
            Err(err) => {
                self.finished = true;
                return Some(Err(err));
            }
        };

        if page.user_ids.is_empty() {
            self.finished = true;
            return None;
        }
        if page.user_ids.len() < self.page_size as usize {
            self.finished = true;
        }
        self.cursor = page.next_cursor;
        Some(Ok(page.user_ids))
    }
}

/// Totals of one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub published: usize,
    pub removed: usize,
    pub pages: usize,
}

/// Fans content group changes out to followers through a [`MessageSink`].
pub struct NewsfeedDispatcher<F: FollowStore, S: MessageSink> {
    follows: F,
    sink: S,
    page_size: u32,
}

impl<F: FollowStore, S: MessageSink> NewsfeedDispatcher<F, S> {
    pub fn new(follows: F, sink: S, config: &EngineConfig) -> Self {
        Self {
            follows,
            sink,
            page_size: config.page_size,
        }
    }

    /// Publishes `publish` events to followers of newly attached groups and
    /// `remove` events to followers of detached groups that no longer reach
    /// the content through any group in `new_group_ids`.
    pub fn dispatch_content_id_to_groups(
        &self,
        content_id: ContentId,
        new_group_ids: &[GroupId],
        old_group_ids: &[GroupId],
    ) -> ServiceResult<DispatchReport> {
        let started_at = Instant::now();
        let delta = ContentGroupDelta::between(content_id, new_group_ids, old_group_ids);
        let mut report = DispatchReport::default();
        if delta.is_empty() {
            debug!("event=dispatch module=dispatcher status=skipped content_id={content_id} reason=no_delta");
            return Ok(report);
        }

        info!(
            "event=dispatch module=dispatcher status=start content_id={} attached={} detached={}",
            content_id,
            delta.attached_group_ids.len(),
            delta.detached_group_ids.len()
        );

        if !delta.attached_group_ids.is_empty() {
            let batches = FollowerBatches::new(
                &self.follows,
                delta.attached_group_ids.clone(),
                Vec::new(),
                self.page_size,
            );
            report.published = self.run_pass(content_id, FeedAction::Publish, batches, &mut report.pages)?;
        }

        if !delta.detached_group_ids.is_empty() {
            let mut retained = new_group_ids.to_vec();
            retained.sort_unstable();
            retained.dedup();
            let batches = FollowerBatches::new(
                &self.follows,
                delta.detached_group_ids.clone(),
                retained,
                self.page_size,
            );
            report.removed = self.run_pass(content_id, FeedAction::Remove, batches, &mut report.pages)?;
        }

        info!(
            "event=dispatch module=dispatcher status=ok content_id={} published={} removed={} pages={} duration_ms={}",
            content_id,
            report.published,
            report.removed,
            report.pages,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn run_pass(
        &self,
        content_id: ContentId,
        action: FeedAction,
        batches: FollowerBatches<'_, F>,
        pages: &mut usize,
    ) -> ServiceResult<usize> {
        let mut total = 0;
        for batch in batches {
            let user_ids = batch?;
            let events: Vec<FeedMembershipChanged> = user_ids
                .into_iter()
                .map(|user_id| FeedMembershipChanged {
                    content_id,
                    user_id,
                    action,
                })
                .collect();
            self.sink.publish(&events)?;
            total += events.len();
            *pages += 1;
            debug!(
                "event=dispatch_page module=dispatcher status=ok content_id={} action={} users={}",
                content_id,
                action.as_str(),
                events.len()
            );
        }
        Ok(total)
    }
}
