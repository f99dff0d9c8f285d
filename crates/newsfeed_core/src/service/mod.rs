//! Fan-out and feed maintenance use-cases.
//!
//! # Responsibility
//! - Orchestrate store and sink calls for each inbound command.
//! - Keep paging loops bounded by the configured page size.
//!
//! # Invariants
//! - Every use-case is safe to repeat: the bus redelivers on failure.

use crate::bus::SinkError;
use crate::model::command::InvalidDeltaError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod dispatcher;
pub mod follow_change;
pub mod group_state;
pub mod materializer;

/// Use-case failure, classified for the worker boundary.
#[derive(Debug)]
pub enum ServiceError {
    Repo(RepoError),
    Sink(SinkError),
    InvalidDelta(InvalidDeltaError),
}

impl ServiceError {
    /// Whether redelivering the command may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repo(err) => err.is_transient(),
            Self::Sink(err) => err.is_transient(),
            Self::InvalidDelta(_) => false,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Sink(err) => write!(f, "{err}"),
            Self::InvalidDelta(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Sink(err) => Some(err),
            Self::InvalidDelta(err) => Some(err),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<SinkError> for ServiceError {
    fn from(value: SinkError) -> Self {
        Self::Sink(value)
    }
}

impl From<InvalidDeltaError> for ServiceError {
    fn from(value: InvalidDeltaError) -> Self {
        Self::InvalidDelta(value)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
