//! In-process transports.

use crate::bus::{MessageSink, ReadModelProjector, SinkError};
use crate::model::content::EffectiveContentGroups;
use crate::model::feed::FeedMembershipChanged;
use crate::model::{ContentId, GroupId};
use crate::repo::feed_repo::FeedStore;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// FIFO queue sink. A consumer drains it with [`MemorySink::take_batch`] and
/// hands failed batches back with [`MemorySink::requeue`].
#[derive(Debug, Default)]
pub struct MemorySink {
    queue: Mutex<VecDeque<FeedMembershipChanged>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes up to `max` events from the front of the queue.
    pub fn take_batch(&self, max: usize) -> Vec<FeedMembershipChanged> {
        let mut queue = self.lock();
        let count = max.min(queue.len());
        queue.drain(..count).collect()
    }

    /// Puts an unacknowledged batch back at the front, preserving its order.
    pub fn requeue(&self, batch: Vec<FeedMembershipChanged>) {
        let mut queue = self.lock();
        for event in batch.into_iter().rev() {
            queue.push_front(event);
        }
    }

    /// Copies the pending events without consuming them.
    pub fn snapshot(&self) -> Vec<FeedMembershipChanged> {
        self.lock().iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<FeedMembershipChanged>> {
        // A panicked producer leaves the queue itself consistent.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageSink for MemorySink {
    fn publish(&self, events: &[FeedMembershipChanged]) -> Result<(), SinkError> {
        self.lock().extend(events.iter().copied());
        Ok(())
    }
}

/// Sink that applies events straight to the feed store, for single-process
/// deployments where the materializer shares the worker's database.
pub struct MaterializingSink<D: FeedStore> {
    feed: D,
}

impl<D: FeedStore> MaterializingSink<D> {
    pub fn new(feed: D) -> Self {
        Self { feed }
    }
}

impl<D: FeedStore> MessageSink for MaterializingSink<D> {
    fn publish(&self, events: &[FeedMembershipChanged]) -> Result<(), SinkError> {
        self.feed.apply(events)?;
        Ok(())
    }
}

/// In-memory read model of each content item's effective groups.
#[derive(Debug, Default)]
pub struct MemoryReadModel {
    groups: Mutex<HashMap<ContentId, Vec<GroupId>>>,
    updates: Mutex<usize>,
}

impl MemoryReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effective_groups(&self, content_id: ContentId) -> Option<Vec<GroupId>> {
        self.groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&content_id)
            .cloned()
    }

    /// Number of projection calls received so far.
    pub fn update_calls(&self) -> usize {
        *self.updates.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReadModelProjector for MemoryReadModel {
    fn project_effective_groups(&self, updates: &[EffectiveContentGroups]) -> Result<(), SinkError> {
        let mut groups = self
            .groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for update in updates {
            groups.insert(update.content_id, update.group_ids.clone());
        }
        *self.updates.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}
