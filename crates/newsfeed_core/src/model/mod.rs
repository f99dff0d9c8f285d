//! Domain model for the follow graph, the content graph and feed membership.
//!
//! # Invariants
//! - Users, groups and content are identified by stable non-nil UUIDs.
//! - Transient deltas never own persisted state; stores do.

pub mod command;
pub mod content;
pub mod feed;
pub mod follow;

use uuid::Uuid;

/// Feed owner identity.
pub type UserId = Uuid;
/// Group identity. Users follow groups; content is posted into groups.
pub type GroupId = Uuid;
/// Content identity (post, article, series).
pub type ContentId = Uuid;
