//! Follow graph store.
//!
//! # Responsibility
//! - Persist user -> group follow edges with a per-insert sequence.
//! - Serve cursor-paged follower scans for fan-out.
//!
//! # Invariants
//! - `(user_id, group_id)` is unique; re-following is a no-op.
//! - `sequence` strictly increases per insert and is never reused.
//! - A follower scan over a static graph returns every follower exactly once:
//!   each user is ordered by its smallest matching edge sequence.

use crate::model::follow::{FollowCursor, FollowEdge, FollowersPage};
use crate::model::{GroupId, UserId};
use crate::repo::{dedup_ids, parse_uuid, placeholders, uuid_values, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};

/// Repository interface for the follow relation.
pub trait FollowStore {
    /// Inserts missing edges and returns the groups that were actually added.
    fn follow(&self, user_id: UserId, group_ids: &[GroupId]) -> RepoResult<Vec<GroupId>>;
    /// Deletes matching edges and returns the groups that were actually removed.
    fn unfollow(&self, user_id: UserId, group_ids: &[GroupId]) -> RepoResult<Vec<GroupId>>;
    /// Returns up to `limit` distinct followers of `group_ids` after `cursor`,
    /// skipping users that also follow any of `exclude_group_ids`.
    fn get_followers(
        &self,
        group_ids: &[GroupId],
        exclude_group_ids: &[GroupId],
        cursor: FollowCursor,
        limit: u32,
    ) -> RepoResult<FollowersPage>;
    /// Lists every group the user currently follows.
    fn followed_group_ids(&self, user_id: UserId) -> RepoResult<Vec<GroupId>>;
    /// Loads one edge, if present.
    fn get_edge(&self, user_id: UserId, group_id: GroupId) -> RepoResult<Option<FollowEdge>>;
}

/// SQLite-backed follow store.
pub struct SqliteFollowStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFollowStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FollowStore for SqliteFollowStore<'_> {
    fn follow(&self, user_id: UserId, group_ids: &[GroupId]) -> RepoResult<Vec<GroupId>> {
        let candidates = dedup_ids(group_ids);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let already_followed = select_followed_among(&tx, user_id, &candidates)?;
        let mut added = Vec::new();
        for group_id in candidates
            .into_iter()
            .filter(|group_id| !already_followed.contains(group_id))
        {
            // A concurrent worker may have inserted the edge since the read above.
            let changed = tx.execute(
                "INSERT OR IGNORE INTO follows (user_id, group_id) VALUES (?1, ?2);",
                params![user_id.to_string(), group_id.to_string()],
            )?;
            if changed == 1 {
                added.push(group_id);
            }
        }
        tx.commit()?;
        Ok(added)
    }

    fn unfollow(&self, user_id: UserId, group_ids: &[GroupId]) -> RepoResult<Vec<GroupId>> {
        let candidates = dedup_ids(group_ids);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut removed = Vec::new();
        for group_id in candidates {
            let changed = tx.execute(
                "DELETE FROM follows WHERE user_id = ?1 AND group_id = ?2;",
                params![user_id.to_string(), group_id.to_string()],
            )?;
            if changed > 0 {
                removed.push(group_id);
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn get_followers(
        &self,
        group_ids: &[GroupId],
        exclude_group_ids: &[GroupId],
        cursor: FollowCursor,
        limit: u32,
    ) -> RepoResult<FollowersPage> {
        let empty_page = FollowersPage {
            user_ids: Vec::new(),
            next_cursor: cursor,
        };
        if group_ids.is_empty() || limit == 0 {
            return Ok(empty_page);
        }

        // Grouping re-aggregates every matching edge on each page, so a full pass
        // is quadratic in followers / page size. Paging on a per-edge cursor
        // would be linear but could return a multi-group user on two pages.
        let mut sql = format!(
            "SELECT f.user_id AS user_id, MIN(f.sequence) AS first_sequence
             FROM follows f
             WHERE f.group_id IN ({})",
            placeholders(group_ids.len())
        );
        let mut bind_values: Vec<Value> = uuid_values(group_ids).collect();

        if !exclude_group_ids.is_empty() {
            sql.push_str(&format!(
                " AND NOT EXISTS (
                    SELECT 1
                    FROM follows kept
                    WHERE kept.user_id = f.user_id
                      AND kept.group_id IN ({})
                  )",
                placeholders(exclude_group_ids.len())
            ));
            bind_values.extend(uuid_values(exclude_group_ids));
        }

        sql.push_str(
            " GROUP BY f.user_id
              HAVING MIN(f.sequence) > ?
              ORDER BY first_sequence ASC
              LIMIT ?;",
        );
        bind_values.push(Value::Integer(cursor.0));
        bind_values.push(Value::Integer(i64::from(limit)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut page = empty_page;
        while let Some(row) = rows.next()? {
            let user_text: String = row.get("user_id")?;
            page.user_ids.push(parse_uuid(&user_text, "follows.user_id")?);
            page.next_cursor = FollowCursor(row.get("first_sequence")?);
        }
        Ok(page)
    }

    fn followed_group_ids(&self, user_id: UserId) -> RepoResult<Vec<GroupId>> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id
             FROM follows
             WHERE user_id = ?1
             ORDER BY sequence ASC;",
        )?;
        let mut rows = stmt.query([user_id.to_string()])?;
        let mut group_ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            group_ids.push(parse_uuid(&value, "follows.group_id")?);
        }
        Ok(group_ids)
    }

    fn get_edge(&self, user_id: UserId, group_id: GroupId) -> RepoResult<Option<FollowEdge>> {
        let raw = self
            .conn
            .query_row(
                "SELECT sequence, created_at
                 FROM follows
                 WHERE user_id = ?1 AND group_id = ?2;",
                params![user_id.to_string(), group_id.to_string()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        Ok(raw.map(|(sequence, created_at)| FollowEdge {
            user_id,
            group_id,
            sequence,
            created_at,
        }))
    }
}

fn select_followed_among(
    conn: &Connection,
    user_id: UserId,
    group_ids: &[GroupId],
) -> RepoResult<Vec<GroupId>> {
    let sql = format!(
        "SELECT group_id
         FROM follows
         WHERE user_id = ?
           AND group_id IN ({});",
        placeholders(group_ids.len())
    );
    let bind_values = std::iter::once(Value::Text(user_id.to_string())).chain(uuid_values(group_ids));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut followed = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        followed.push(parse_uuid(&value, "follows.group_id")?);
    }
    Ok(followed)
}
