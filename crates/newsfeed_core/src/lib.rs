//! Newsfeed fan-out engine.
//!
//! Propagates content visibility changes (publish, group attach/detach,
//! group archive/unarchive, unfollow) into per-user materialized feeds over a
//! many-to-many user <-> group follow graph.

pub mod bus;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod worker;

pub use bus::{
    ErrorReporter, LogErrorReporter, MaterializingSink, MemoryReadModel, MemorySink, MessageSink,
    ReadModelProjector, SinkError,
};
pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::command::{Command, InvalidDeltaError};
pub use model::content::{
    ContentGroupDelta, ContentRecord, EffectiveContentGroups, GroupMembershipSnapshot, PageInfo,
};
pub use model::feed::{FeedAction, FeedEntry, FeedMembershipChanged};
pub use model::follow::{FollowCursor, FollowEdge, FollowersPage};
pub use model::{ContentId, GroupId, UserId};
pub use repo::content_repo::{ContentStore, SqliteContentStore};
pub use repo::feed_repo::{FeedApplyStats, FeedListQuery, FeedStore, SqliteFeedStore};
pub use repo::follow_repo::{FollowStore, SqliteFollowStore};
pub use repo::{RepoError, RepoResult};
pub use service::dispatcher::{DispatchReport, FollowerBatches, NewsfeedDispatcher};
pub use service::follow_change::{FollowChangeProcessor, FollowReport, UnfollowReport};
pub use service::group_state::{GroupStateBatchProcessor, GroupStateReport};
pub use service::materializer::NewsfeedMaterializer;
pub use service::{ServiceError, ServiceResult};
pub use worker::{Delivery, Worker};
