use newsfeed_core::db::open_db_in_memory;
use newsfeed_core::{
    ContentId, ContentRecord, ContentStore, EffectiveContentGroups, EngineConfig, FeedListQuery,
    FeedMembershipChanged, FeedStore, GroupId, GroupMembershipSnapshot, GroupStateBatchProcessor,
    MemoryReadModel, ReadModelProjector, SinkError, SqliteContentStore, SqliteFeedStore,
};
use rusqlite::Connection;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct BatchRecorder {
    batches: Mutex<Vec<Vec<EffectiveContentGroups>>>,
}

impl ReadModelProjector for BatchRecorder {
    fn project_effective_groups(&self, updates: &[EffectiveContentGroups]) -> Result<(), SinkError> {
        self.batches.lock().unwrap().push(updates.to_vec());
        Ok(())
    }
}

fn post(conn: &Connection, groups: &[GroupId], created_at: i64) -> ContentId {
    let store = SqliteContentStore::new(conn);
    let record = ContentRecord {
        content_id: Uuid::new_v4(),
        published_at: Some(created_at),
        is_hidden: false,
        created_at,
    };
    store.upsert_content(&record).unwrap();
    store.replace_content_groups(record.content_id, groups).unwrap();
    record.content_id
}

#[test]
fn archive_recomputes_effective_groups_for_read_models() {
    let conn = open_db_in_memory().unwrap();
    let read_model = MemoryReadModel::new();
    let processor = GroupStateBatchProcessor::new(
        SqliteContentStore::new(&conn),
        &read_model,
        &EngineConfig::default(),
    );
    let archived = Uuid::new_v4();
    let active = Uuid::new_v4();
    let shared = post(&conn, &[archived, active], 1);
    let only_archived = post(&conn, &[archived], 2);
    let untouched = post(&conn, &[active], 3);

    let report = processor
        .on_groups_archived_or_unarchived(&[archived], true)
        .unwrap();

    assert_eq!(report.changed_group_ids, vec![archived]);
    assert_eq!(report.contents_projected, 2);
    assert_eq!(report.batches, 1);
    assert_eq!(read_model.effective_groups(shared), Some(vec![active]));
    assert_eq!(read_model.effective_groups(only_archived), Some(Vec::new()));
    assert_eq!(read_model.effective_groups(untouched), None);
}

#[test]
fn association_is_paged_in_fixed_batches() {
    let conn = open_db_in_memory().unwrap();
    let recorder = BatchRecorder::default();
    let config = EngineConfig {
        page_size: 2,
        ..EngineConfig::default()
    };
    let processor = GroupStateBatchProcessor::new(SqliteContentStore::new(&conn), &recorder, &config);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut expected: Vec<ContentId> = (0..4).map(|ts| post(&conn, &[a], ts)).collect();
    expected.push(post(&conn, &[a, b], 10));

    let report = processor.on_groups_archived_or_unarchived(&[a, b], true).unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.contents_projected, 5);

    let batches = recorder.batches.lock().unwrap();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    let seen: Vec<ContentId> = batches.iter().flatten().map(|update| update.content_id).collect();
    assert_eq!(seen, expected);
    assert!(batches.iter().flatten().all(|update| update.group_ids.is_empty()));
}

#[test]
fn groups_already_in_target_state_are_not_flipped_but_still_projected() {
    let conn = open_db_in_memory().unwrap();
    let read_model = MemoryReadModel::new();
    let processor = GroupStateBatchProcessor::new(
        SqliteContentStore::new(&conn),
        &read_model,
        &EngineConfig::default(),
    );
    let group = Uuid::new_v4();
    post(&conn, &[group], 1);

    let first = processor.on_groups_archived_or_unarchived(&[group], true).unwrap();
    assert_eq!(first.changed_group_ids, vec![group]);

    let replay = processor.on_groups_archived_or_unarchived(&[group], true).unwrap();
    assert!(replay.changed_group_ids.is_empty());
    assert_eq!(replay.contents_projected, 1);
    assert_eq!(read_model.update_calls(), 2);
}

#[test]
fn unarchive_restores_feed_visibility() {
    let conn = open_db_in_memory().unwrap();
    let read_model = MemoryReadModel::new();
    let processor = GroupStateBatchProcessor::new(
        SqliteContentStore::new(&conn),
        &read_model,
        &EngineConfig::default(),
    );
    let feed = SqliteFeedStore::new(&conn);
    let user = Uuid::new_v4();
    let group = Uuid::new_v4();
    let content = post(&conn, &[group], 1);
    feed.apply(&[FeedMembershipChanged::publish(content, user)]).unwrap();
    let query = FeedListQuery {
        user_id: user,
        ..FeedListQuery::default()
    };

    processor.on_groups_archived_or_unarchived(&[group], true).unwrap();
    assert!(feed.list_feed(&query).unwrap().is_empty());
    assert_eq!(feed.count_entries(user).unwrap(), 1);

    processor.on_groups_archived_or_unarchived(&[group], false).unwrap();
    assert_eq!(feed.list_feed(&query).unwrap(), vec![content]);
    assert_eq!(read_model.effective_groups(content), Some(vec![group]));
}

#[test]
fn unknown_groups_are_registered_in_target_state() {
    let conn = open_db_in_memory().unwrap();
    let content = SqliteContentStore::new(&conn);
    let group = Uuid::new_v4();

    assert!(content.group_states(&[group]).unwrap().is_empty());
    content.set_groups_archived(&[group], true).unwrap();
    assert_eq!(
        content.group_states(&[group]).unwrap(),
        vec![GroupMembershipSnapshot {
            group_id: group,
            is_archived: true,
        }]
    );

    // Content attached later inherits the archived flag.
    let later = post(&conn, &[group], 5);
    assert_eq!(content.content_group_ids(later).unwrap(), vec![group]);
    assert!(content.effective_group_ids(&[later]).unwrap()[0].group_ids.is_empty());
}
