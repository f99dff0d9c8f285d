//! Materialized per-user feed store.
//!
//! # Responsibility
//! - Apply feed membership events idempotently.
//! - Run the set-based writes of follow backfill, unfollow cleanup and
//!   content hard-delete.
//!
//! # Invariants
//! - `(user_id, content_id)` is unique; publish is `INSERT OR IGNORE`, remove
//!   is `DELETE`, so duplicate deliveries are no-ops.
//! - Feed reads hide content whose every group is archived.

use crate::model::feed::{FeedAction, FeedEntry, FeedMembershipChanged};
use crate::model::{ContentId, GroupId, UserId};
use crate::repo::{int_to_bool, parse_uuid, placeholders, uuid_values, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};

const FEED_DEFAULT_LIMIT: u32 = 20;
const FEED_LIMIT_MAX: u32 = 100;

/// Row counts produced by one [`FeedStore::apply`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedApplyStats {
    pub inserted: usize,
    pub removed: usize,
}

/// Query options for reading one user's feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedListQuery {
    pub user_id: UserId,
    /// Defaults to 20 and clamps to 100.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for the materialized feed.
pub trait FeedStore {
    /// Applies a batch of membership events in one transaction.
    fn apply(&self, events: &[FeedMembershipChanged]) -> RepoResult<FeedApplyStats>;
    /// Inserts up to `limit` of the newest published, non-hidden content of
    /// `group_id` into the user's feed. Returns the number of new rows.
    fn backfill_for_user(&self, user_id: UserId, group_id: GroupId, limit: u32) -> RepoResult<usize>;
    /// Removes feed rows reachable through `left_group_ids` unless the content
    /// is also in one of `still_followed_group_ids`, archived or not. Archived
    /// groups are filtered at read time, so their rows must survive unarchive.
    fn remove_unfollowed_content(
        &self,
        user_id: UserId,
        left_group_ids: &[GroupId],
        still_followed_group_ids: &[GroupId],
    ) -> RepoResult<usize>;
    /// Removes the content from every user's feed.
    fn remove_content_everywhere(&self, content_id: ContentId) -> RepoResult<usize>;
    /// Loads one feed row.
    fn get_entry(&self, user_id: UserId, content_id: ContentId) -> RepoResult<Option<FeedEntry>>;
    /// Lists visible content ids of one feed, newest first.
    fn list_feed(&self, query: &FeedListQuery) -> RepoResult<Vec<ContentId>>;
    /// Counts every feed row of one user, visible or not.
    fn count_entries(&self, user_id: UserId) -> RepoResult<usize>;
    /// Flags one row as seen. Returns `false` when the row is absent.
    fn mark_seen(&self, user_id: UserId, content_id: ContentId) -> RepoResult<bool>;
}

/// SQLite-backed feed store.
pub struct SqliteFeedStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFeedStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FeedStore for SqliteFeedStore<'_> {
    fn apply(&self, events: &[FeedMembershipChanged]) -> RepoResult<FeedApplyStats> {
        let mut stats = FeedApplyStats::default();
        if events.is_empty() {
            return Ok(stats);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO user_newsfeed (user_id, content_id, seen)
                 VALUES (?1, ?2, 0);",
            )?;
            let mut delete = tx.prepare(
                "DELETE FROM user_newsfeed WHERE user_id = ?1 AND content_id = ?2;",
            )?;
            for event in events {
                let user_id = event.user_id.to_string();
                let content_id = event.content_id.to_string();
                match event.action {
                    FeedAction::Publish => {
                        stats.inserted += insert.execute(params![user_id, content_id])?
                    }
                    FeedAction::Remove => {
                        stats.removed += delete.execute(params![user_id, content_id])?
                    }
                }
            }
        }
        tx.commit()?;
        Ok(stats)
    }

    fn backfill_for_user(&self, user_id: UserId, group_id: GroupId, limit: u32) -> RepoResult<usize> {
        if limit == 0 {
            return Ok(0);
        }
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO user_newsfeed (user_id, content_id, seen)
             SELECT ?1, c.content_id, 0
             FROM content_groups cg
             INNER JOIN contents c ON c.content_id = cg.content_id
             WHERE cg.group_id = ?2
               AND cg.is_archived = 0
               AND c.published_at IS NOT NULL
               AND c.is_hidden = 0
             ORDER BY c.created_at DESC, c.content_id ASC
             LIMIT ?3;",
            params![user_id.to_string(), group_id.to_string(), i64::from(limit)],
        )?;
        Ok(inserted)
    }

    fn remove_unfollowed_content(
        &self,
        user_id: UserId,
        left_group_ids: &[GroupId],
        still_followed_group_ids: &[GroupId],
    ) -> RepoResult<usize> {
        if left_group_ids.is_empty() {
            return Ok(0);
        }

        let mut sql = format!(
            "DELETE FROM user_newsfeed
             WHERE user_id = ?
               AND content_id IN (
                 SELECT left_cg.content_id
                 FROM content_groups left_cg
                 WHERE left_cg.group_id IN ({})
               )",
            placeholders(left_group_ids.len())
        );
        let mut bind_values: Vec<Value> = vec![Value::Text(user_id.to_string())];
        bind_values.extend(uuid_values(left_group_ids));

        if !still_followed_group_ids.is_empty() {
            sql.push_str(&format!(
                " AND NOT EXISTS (
                    SELECT 1
                    FROM content_groups kept
                    WHERE kept.content_id = user_newsfeed.content_id
                      AND kept.group_id IN ({})
                  )",
                placeholders(still_followed_group_ids.len())
            ));
            bind_values.extend(uuid_values(still_followed_group_ids));
        }
        sql.push(';');

        let removed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(removed)
    }

    fn remove_content_everywhere(&self, content_id: ContentId) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM user_newsfeed WHERE content_id = ?1;",
            [content_id.to_string()],
        )?;
        Ok(removed)
    }

    fn get_entry(&self, user_id: UserId, content_id: ContentId) -> RepoResult<Option<FeedEntry>> {
        let seen: Option<i64> = self
            .conn
            .query_row(
                "SELECT seen FROM user_newsfeed WHERE user_id = ?1 AND content_id = ?2;",
                params![user_id.to_string(), content_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(seen) = seen else {
            return Ok(None);
        };
        Ok(Some(FeedEntry {
            user_id,
            content_id,
            seen: int_to_bool(seen, "user_newsfeed.seen")?,
        }))
    }

    fn list_feed(&self, query: &FeedListQuery) -> RepoResult<Vec<ContentId>> {
        let limit = normalize_feed_limit(query.limit);
        let mut stmt = self.conn.prepare(
            "SELECT f.content_id
             FROM user_newsfeed f
             INNER JOIN contents c ON c.content_id = f.content_id
             WHERE f.user_id = ?1
               AND EXISTS (
                 SELECT 1
                 FROM content_groups cg
                 WHERE cg.content_id = f.content_id
                   AND cg.is_archived = 0
               )
             ORDER BY COALESCE(c.published_at, c.created_at) DESC, f.content_id ASC
             LIMIT ?2 OFFSET ?3;",
        )?;
        let mut rows = stmt.query(params![
            query.user_id.to_string(),
            i64::from(limit),
            i64::from(query.offset),
        ])?;
        let mut content_ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            content_ids.push(parse_uuid(&value, "user_newsfeed.content_id")?);
        }
        Ok(content_ids)
    }

    fn count_entries(&self, user_id: UserId) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM user_newsfeed WHERE user_id = ?1;",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn mark_seen(&self, user_id: UserId, content_id: ContentId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE user_newsfeed SET seen = 1 WHERE user_id = ?1 AND content_id = ?2;",
            params![user_id.to_string(), content_id.to_string()],
        )?;
        Ok(changed > 0)
    }
}

/// Applies default and upper bound to a feed page size.
pub fn normalize_feed_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(FEED_DEFAULT_LIMIT).clamp(1, FEED_LIMIT_MAX)
}
