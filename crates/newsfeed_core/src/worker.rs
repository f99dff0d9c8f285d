//! Command handler boundary.
//!
//! # Responsibility
//! - Route each inbound command to its use-case.
//! - Classify every outcome into ack, drop or redeliver.
//! - Report failures to the error-tracking collaborator without ever
//!   propagating a panic or error out of the worker loop.
//!
//! # Invariants
//! - A message is acknowledged only after its handler completed normally.
//! - Invalid commands are dropped; transient failures are redelivered.

use crate::bus::{ErrorReporter, MessageSink, ReadModelProjector};
use crate::config::EngineConfig;
use crate::model::command::Command;
use crate::model::content::ContentRecord;
use crate::model::{ContentId, GroupId};
use crate::repo::content_repo::{ContentStore, SqliteContentStore};
use crate::repo::feed_repo::SqliteFeedStore;
use crate::repo::follow_repo::SqliteFollowStore;
use crate::service::dispatcher::NewsfeedDispatcher;
use crate::service::follow_change::FollowChangeProcessor;
use crate::service::group_state::GroupStateBatchProcessor;
use crate::service::materializer::NewsfeedMaterializer;
use crate::service::ServiceResult;
use log::{info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// What the bus should do with the message after handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handler completed; remove the message.
    Ack,
    /// Message can never succeed; remove it without retry.
    Drop,
    /// Handler failed transiently; deliver the message again later.
    Redeliver,
}

impl Delivery {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Drop => "drop",
            Self::Redeliver => "redeliver",
        }
    }
}

#[derive(Debug)]
struct HandlerPanic(String);

impl Display for HandlerPanic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler panicked: {}", self.0)
    }
}

impl Error for HandlerPanic {}

/// One stateless worker bound to its own database connection.
pub struct Worker<'a> {
    content: SqliteContentStore<'a>,
    dispatcher: NewsfeedDispatcher<SqliteFollowStore<'a>, &'a dyn MessageSink>,
    follow_changes: FollowChangeProcessor<SqliteFollowStore<'a>, SqliteFeedStore<'a>>,
    group_state: GroupStateBatchProcessor<SqliteContentStore<'a>, &'a dyn ReadModelProjector>,
    materializer: NewsfeedMaterializer<SqliteFeedStore<'a>>,
    reporter: &'a dyn ErrorReporter,
}

impl<'a> Worker<'a> {
    pub fn new(
        conn: &'a Connection,
        sink: &'a dyn MessageSink,
        projector: &'a dyn ReadModelProjector,
        reporter: &'a dyn ErrorReporter,
        config: &EngineConfig,
    ) -> Self {
        Self {
            content: SqliteContentStore::new(conn),
            dispatcher: NewsfeedDispatcher::new(SqliteFollowStore::new(conn), sink, config),
            follow_changes: FollowChangeProcessor::new(
                SqliteFollowStore::new(conn),
                SqliteFeedStore::new(conn),
                config,
            ),
            group_state: GroupStateBatchProcessor::new(
                SqliteContentStore::new(conn),
                projector,
                config,
            ),
            materializer: NewsfeedMaterializer::new(SqliteFeedStore::new(conn)),
            reporter,
        }
    }

    /// Decodes one raw bus payload and handles it.
    pub fn handle_raw(&self, payload: &str) -> Delivery {
        match Command::from_json(payload) {
            Ok(command) => self.handle(&command),
            Err(err) => {
                warn!("event=command module=worker status=dropped command=unknown error={err}");
                self.reporter.capture("unknown", &err);
                Delivery::Drop
            }
        }
    }

    /// Handles one decoded command and classifies the outcome.
    pub fn handle(&self, command: &Command) -> Delivery {
        let started_at = Instant::now();
        let name = command.name();

        let outcome = catch_unwind(AssertUnwindSafe(|| -> ServiceResult<()> {
            command.validate()?;
            self.execute(command)
        }));

        let delivery = match outcome {
            Ok(Ok(())) => Delivery::Ack,
            Ok(Err(err)) => {
                self.reporter.capture(name, &err);
                if err.is_transient() {
                    Delivery::Redeliver
                } else {
                    Delivery::Drop
                }
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|value| value.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                self.reporter.capture(name, &HandlerPanic(message));
                Delivery::Drop
            }
        };

        info!(
            "event=command module=worker status={} command={} duration_ms={}",
            delivery.as_str(),
            name,
            started_at.elapsed().as_millis()
        );
        delivery
    }

    fn execute(&self, command: &Command) -> ServiceResult<()> {
        match command {
            Command::UserFollowGroups { user_id, group_ids } => {
                self.follow_changes.on_user_follow_groups(*user_id, group_ids)?;
            }
            Command::UserUnfollowGroups { user_id, group_ids } => {
                self.follow_changes
                    .on_user_unfollow_groups(*user_id, group_ids)?;
            }
            Command::ContentUpserted {
                content_id,
                published_at,
                is_hidden,
                created_at,
            } => self.on_content_upserted(&ContentRecord {
                content_id: *content_id,
                published_at: *published_at,
                is_hidden: *is_hidden,
                created_at: *created_at,
            })?,
            Command::ContentGroupsChanged {
                content_id,
                old_group_ids,
                new_group_ids,
            } => self.on_content_groups_changed(*content_id, old_group_ids, new_group_ids)?,
            Command::GroupArchiveStateChanged {
                group_ids,
                archived,
            } => {
                self.group_state
                    .on_groups_archived_or_unarchived(group_ids, *archived)?;
            }
            Command::ContentDeleted { content_id } => {
                self.content.delete_content(*content_id)?;
                self.materializer.on_content_deleted(*content_id)?;
            }
        }
        Ok(())
    }

    /// Stores the lifecycle record, then fans the content in or out of every
    /// associated group according to its current eligibility.
    ///
    /// The fan-out follows the stored state rather than the transition, so a
    /// redelivery after a partial run still reaches every follower.
    fn on_content_upserted(&self, record: &ContentRecord) -> ServiceResult<()> {
        self.content.upsert_content(record)?;
        let group_ids = self.content.content_group_ids(record.content_id)?;
        if group_ids.is_empty() {
            return Ok(());
        }

        if record.is_feed_eligible() {
            self.dispatcher
                .dispatch_content_id_to_groups(record.content_id, &group_ids, &[])?;
        } else {
            self.dispatcher
                .dispatch_content_id_to_groups(record.content_id, &[], &group_ids)?;
        }
        Ok(())
    }

    fn on_content_groups_changed(
        &self,
        content_id: ContentId,
        old_group_ids: &[GroupId],
        new_group_ids: &[GroupId],
    ) -> ServiceResult<()> {
        let Some(content) = self.content.get_content(content_id)? else {
            info!(
                "event=content_groups_changed module=worker status=skipped content_id={content_id} reason=unknown_content"
            );
            return Ok(());
        };

        self.content
            .replace_content_groups(content_id, new_group_ids)?;

        if !content.is_feed_eligible() {
            info!(
                "event=content_groups_changed module=worker status=skipped content_id={content_id} reason=not_published_or_hidden"
            );
            return Ok(());
        }

        self.dispatcher
            .dispatch_content_id_to_groups(content_id, new_group_ids, old_group_ids)?;
        Ok(())
    }
}
