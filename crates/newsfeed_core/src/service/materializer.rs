//! Feed membership consumer.
//!
//! # Responsibility
//! - Apply `publish` / `remove` events to the materialized feed.
//! - Drain an in-process queue with at-least-once semantics.
//! - Purge hard-deleted content from every feed.
//!
//! # Invariants
//! - Applying the same event twice leaves the feed unchanged.
//! - A batch that fails to apply is handed back to the queue, in order.

use crate::bus::MemorySink;
use crate::model::feed::FeedMembershipChanged;
use crate::model::ContentId;
use crate::repo::feed_repo::{FeedApplyStats, FeedStore};
use crate::repo::RepoResult;
use log::{error, info};

pub struct NewsfeedMaterializer<D: FeedStore> {
    feed: D,
}

impl<D: FeedStore> NewsfeedMaterializer<D> {
    pub fn new(feed: D) -> Self {
        Self { feed }
    }

    pub fn apply(&self, events: &[FeedMembershipChanged]) -> RepoResult<FeedApplyStats> {
        let stats = self.feed.apply(events)?;
        info!(
            "event=materialize module=materializer status=ok events={} inserted={} removed={}",
            events.len(),
            stats.inserted,
            stats.removed
        );
        Ok(stats)
    }

    /// Drains `queue` in batches of `batch_size` until it is empty.
    ///
    /// Returns the number of events applied. On error the failed batch is
    /// requeued and the error returned; earlier batches stay applied.
    pub fn consume(&self, queue: &MemorySink, batch_size: usize) -> RepoResult<usize> {
        let mut applied = 0;
        loop {
            let batch = queue.take_batch(batch_size.max(1));
            if batch.is_empty() {
                return Ok(applied);
            }
            if let Err(err) = self.feed.apply(&batch) {
                error!(
                    "event=materialize module=materializer status=error events={} error={}",
                    batch.len(),
                    err
                );
                queue.requeue(batch);
                return Err(err);
            }
            applied += batch.len();
        }
    }

    pub fn on_content_deleted(&self, content_id: ContentId) -> RepoResult<usize> {
        let removed = self.feed.remove_content_everywhere(content_id)?;
        info!(
            "event=content_purge module=materializer status=ok content_id={content_id} removed={removed}"
        );
        Ok(removed)
    }
}
