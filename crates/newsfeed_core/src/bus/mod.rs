//! Outbound ports: feed event sink, read-model projection and error tracking.
//!
//! # Responsibility
//! - Define the single message-passing port the dispatcher publishes through.
//! - Define the collaborator interfaces for auxiliary read models and error
//!   tracking.
//!
//! # Invariants
//! - Sinks deliver at least once; consumers must tolerate duplicates.
//! - Implementations use interior mutability so one sink can be shared by
//!   reference across services.

use crate::model::content::EffectiveContentGroups;
use crate::model::feed::FeedMembershipChanged;
use crate::repo::RepoError;
use log::error;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;

pub use memory::{MaterializingSink, MemoryReadModel, MemorySink};

/// Failure to hand events to a transport or collaborator.
#[derive(Debug)]
pub enum SinkError {
    /// Transport is unreachable or refused the batch.
    Unavailable(String),
    /// The in-process transport failed while writing to the feed store.
    Store(RepoError),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Store(err) => err.is_transient(),
        }
    }
}

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(details) => write!(f, "message sink unavailable: {details}"),
            Self::Store(err) => write!(f, "message sink store failure: {err}"),
        }
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(_) => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RepoError> for SinkError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// At-least-once publisher of per-user feed membership events.
pub trait MessageSink {
    /// Publishes one batch. The batch is either accepted as a whole or the
    /// call fails and the caller's command is redelivered.
    fn publish(&self, events: &[FeedMembershipChanged]) -> Result<(), SinkError>;
}

impl<T: MessageSink + ?Sized> MessageSink for &T {
    fn publish(&self, events: &[FeedMembershipChanged]) -> Result<(), SinkError> {
        (**self).publish(events)
    }
}

/// Auxiliary read models (search index, content cache) that track each
/// content item's effective groups.
pub trait ReadModelProjector {
    fn project_effective_groups(&self, updates: &[EffectiveContentGroups]) -> Result<(), SinkError>;
}

impl<T: ReadModelProjector + ?Sized> ReadModelProjector for &T {
    fn project_effective_groups(&self, updates: &[EffectiveContentGroups]) -> Result<(), SinkError> {
        (**self).project_effective_groups(updates)
    }
}

/// Error-tracking collaborator notified of every failed command.
pub trait ErrorReporter {
    fn capture(&self, command: &str, error: &dyn Error);
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for &T {
    fn capture(&self, command: &str, error: &dyn Error) {
        (**self).capture(command, error)
    }
}

/// Reporter that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn capture(&self, command: &str, error: &dyn Error) {
        error!("event=error_captured module=bus status=error command={command} error={error}");
    }
}
