//! Content lifecycle and content <-> group graph store.
//!
//! # Responsibility
//! - Track which content is published/hidden and when it was created.
//! - Own the content <-> group association and the per-group archive flag.
//! - Serve cursor-paged association scans for group-state batches.
//!
//! # Invariants
//! - `content_groups.is_archived` always mirrors `groups.is_archived`.
//! - Association replacement is idempotent: replaying the same group set is a no-op.

use crate::model::content::{
    ContentRecord, EffectiveContentGroups, GroupMembershipSnapshot, PageInfo,
};
use crate::model::{ContentId, GroupId};
use crate::repo::{
    bool_to_int, dedup_ids, int_to_bool, parse_uuid, placeholders, uuid_values, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};

/// Repository interface for content state and its group associations.
pub trait ContentStore {
    /// Inserts or updates one content lifecycle record.
    fn upsert_content(&self, record: &ContentRecord) -> RepoResult<()>;
    /// Loads one content record.
    fn get_content(&self, content_id: ContentId) -> RepoResult<Option<ContentRecord>>;
    /// Makes the association set of `content_id` equal to `group_ids`.
    fn replace_content_groups(&self, content_id: ContentId, group_ids: &[GroupId]) -> RepoResult<()>;
    /// Lists every associated group (archived or not), ascending.
    fn content_group_ids(&self, content_id: ContentId) -> RepoResult<Vec<GroupId>>;
    /// Loads the archive state of the known groups among `group_ids`.
    ///
    /// Unknown groups have no snapshot.
    fn group_states(&self, group_ids: &[GroupId]) -> RepoResult<Vec<GroupMembershipSnapshot>>;
    /// Sets the archive flag on groups and mirrors it onto their associations.
    fn set_groups_archived(&self, group_ids: &[GroupId], archived: bool) -> RepoResult<()>;
    /// Pages distinct content ids associated with any of `group_ids`.
    fn content_ids_in_groups_page(
        &self,
        group_ids: &[GroupId],
        after: Option<i64>,
        limit: u32,
    ) -> RepoResult<(Vec<ContentId>, PageInfo)>;
    /// Computes the non-archived groups of each given content item.
    fn effective_group_ids(&self, content_ids: &[ContentId]) -> RepoResult<Vec<EffectiveContentGroups>>;
    /// Hard-deletes one content item and its associations.
    fn delete_content(&self, content_id: ContentId) -> RepoResult<bool>;
}

/// SQLite-backed content store.
pub struct SqliteContentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContentStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ContentStore for SqliteContentStore<'_> {
    fn upsert_content(&self, record: &ContentRecord) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO contents (content_id, published_at, is_hidden, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (content_id) DO UPDATE SET
                published_at = excluded.published_at,
                is_hidden = excluded.is_hidden,
                created_at = excluded.created_at;",
            params![
                record.content_id.to_string(),
                record.published_at,
                bool_to_int(record.is_hidden),
                record.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_content(&self, content_id: ContentId) -> RepoResult<Option<ContentRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT published_at, is_hidden, created_at
                 FROM contents
                 WHERE content_id = ?1;",
                [content_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((published_at, is_hidden, created_at)) = raw else {
            return Ok(None);
        };
        Ok(Some(ContentRecord {
            content_id,
            published_at,
            is_hidden: int_to_bool(is_hidden, "contents.is_hidden")?,
            created_at,
        }))
    }

    fn replace_content_groups(&self, content_id: ContentId, group_ids: &[GroupId]) -> RepoResult<()> {
        let group_ids = dedup_ids(group_ids);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if group_ids.is_empty() {
            tx.execute(
                "DELETE FROM content_groups WHERE content_id = ?1;",
                [content_id.to_string()],
            )?;
        } else {
            let sql = format!(
                "DELETE FROM content_groups
                 WHERE content_id = ?
                   AND group_id NOT IN ({});",
                placeholders(group_ids.len())
            );
            let bind_values = std::iter::once(Value::Text(content_id.to_string()))
                .chain(uuid_values(&group_ids));
            tx.execute(&sql, params_from_iter(bind_values))?;
        }

        for group_id in &group_ids {
            tx.execute(
                "INSERT OR IGNORE INTO groups (group_id) VALUES (?1);",
                [group_id.to_string()],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO content_groups (content_id, group_id, is_archived)
                 SELECT ?1, g.group_id, g.is_archived
                 FROM groups g
                 WHERE g.group_id = ?2;",
                params![content_id.to_string(), group_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn content_group_ids(&self, content_id: ContentId) -> RepoResult<Vec<GroupId>> {
        load_group_ids(self.conn, content_id, false)
    }

    fn group_states(&self, group_ids: &[GroupId]) -> RepoResult<Vec<GroupMembershipSnapshot>> {
        let group_ids = dedup_ids(group_ids);
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT group_id, is_archived
             FROM groups
             WHERE group_id IN ({})
             ORDER BY group_id ASC;",
            placeholders(group_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(uuid_values(&group_ids)))?;
        let mut snapshots = Vec::new();
        while let Some(row) = rows.next()? {
            let group_text: String = row.get(0)?;
            snapshots.push(GroupMembershipSnapshot {
                group_id: parse_uuid(&group_text, "groups.group_id")?,
                is_archived: int_to_bool(row.get(1)?, "groups.is_archived")?,
            });
        }
        Ok(snapshots)
    }

    fn set_groups_archived(&self, group_ids: &[GroupId], archived: bool) -> RepoResult<()> {
        if group_ids.is_empty() {
            return Ok(());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for group_id in dedup_ids(group_ids) {
            tx.execute(
                "INSERT INTO groups (group_id, is_archived) VALUES (?1, ?2)
                 ON CONFLICT (group_id) DO UPDATE SET
                    is_archived = excluded.is_archived,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![group_id.to_string(), bool_to_int(archived)],
            )?;
            tx.execute(
                "UPDATE content_groups SET is_archived = ?2 WHERE group_id = ?1;",
                params![group_id.to_string(), bool_to_int(archived)],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn content_ids_in_groups_page(
        &self,
        group_ids: &[GroupId],
        after: Option<i64>,
        limit: u32,
    ) -> RepoResult<(Vec<ContentId>, PageInfo)> {
        if group_ids.is_empty() || limit == 0 {
            return Ok((Vec::new(), PageInfo::default()));
        }

        // One extra row tells whether another page exists.
        let sql = format!(
            "SELECT content_id, MIN(id) AS first_id
             FROM content_groups
             WHERE group_id IN ({})
             GROUP BY content_id
             HAVING MIN(id) > ?
             ORDER BY first_id ASC
             LIMIT ?;",
            placeholders(group_ids.len())
        );
        let mut bind_values: Vec<Value> = uuid_values(group_ids).collect();
        bind_values.push(Value::Integer(after.unwrap_or(0)));
        bind_values.push(Value::Integer(i64::from(limit) + 1));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items: Vec<(ContentId, i64)> = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get("content_id")?;
            items.push((
                parse_uuid(&value, "content_groups.content_id")?,
                row.get("first_id")?,
            ));
        }

        let has_next_page = items.len() > limit as usize;
        items.truncate(limit as usize);
        let info = PageInfo {
            end_cursor: items.last().map(|(_, cursor)| *cursor),
            has_next_page,
        };
        Ok((items.into_iter().map(|(id, _)| id).collect(), info))
    }

    fn effective_group_ids(&self, content_ids: &[ContentId]) -> RepoResult<Vec<EffectiveContentGroups>> {
        let mut result = Vec::with_capacity(content_ids.len());
        for content_id in content_ids {
            result.push(EffectiveContentGroups {
                content_id: *content_id,
                group_ids: load_group_ids(self.conn, *content_id, true)?,
            });
        }
        Ok(result)
    }

    fn delete_content(&self, content_id: ContentId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM contents WHERE content_id = ?1;",
            [content_id.to_string()],
        )?;
        Ok(changed > 0)
    }
}

fn load_group_ids(
    conn: &Connection,
    content_id: ContentId,
    only_active: bool,
) -> RepoResult<Vec<GroupId>> {
    let mut stmt = conn.prepare(
        "SELECT group_id
         FROM content_groups
         WHERE content_id = ?1
           AND (?2 = 0 OR is_archived = 0)
         ORDER BY group_id ASC;",
    )?;
    let mut rows = stmt.query(params![content_id.to_string(), bool_to_int(only_active)])?;
    let mut group_ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        group_ids.push(parse_uuid(&value, "content_groups.group_id")?);
    }
    Ok(group_ids)
}
