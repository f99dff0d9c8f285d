use newsfeed_core::db::open_db_in_memory;
use newsfeed_core::{
    EngineConfig, FeedAction, FeedMembershipChanged, FeedStore, FollowCursor, FollowStore,
    FollowerBatches, MemorySink, MessageSink, NewsfeedDispatcher, NewsfeedMaterializer,
    ServiceError, SinkError, SqliteFeedStore, SqliteFollowStore,
};
use std::collections::HashSet;
use uuid::Uuid;

struct UnavailableSink;

impl MessageSink for UnavailableSink {
    fn publish(&self, _events: &[FeedMembershipChanged]) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("broker down".to_string()))
    }
}

fn small_pages(page_size: u32) -> EngineConfig {
    EngineConfig {
        page_size,
        ..EngineConfig::default()
    }
}

#[test]
fn attach_publishes_to_union_of_attached_group_followers() {
    let conn = open_db_in_memory().unwrap();
    let follows = SqliteFollowStore::new(&conn);
    let g1 = Uuid::new_v4();
    let g2 = Uuid::new_v4();
    let (u1, u2, u12, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    follows.follow(u1, &[g1]).unwrap();
    follows.follow(u2, &[g2]).unwrap();
    follows.follow(u12, &[g1, g2]).unwrap();
    follows.follow(outsider, &[Uuid::new_v4()]).unwrap();

    let sink = MemorySink::new();
    let dispatcher = NewsfeedDispatcher::new(SqliteFollowStore::new(&conn), &sink, &EngineConfig::default());
    let content = Uuid::new_v4();
    let report = dispatcher
        .dispatch_content_id_to_groups(content, &[g1, g2], &[])
        .unwrap();

    assert_eq!(report.published, 3);
    assert_eq!(report.removed, 0);
    let events = sink.snapshot();
    assert!(events
        .iter()
        .all(|event| event.action == FeedAction::Publish && event.content_id == content));
    let users: HashSet<_> = events.iter().map(|event| event.user_id).collect();
    assert_eq!(users, HashSet::from([u1, u2, u12]));
}

#[test]
fn detach_keeps_users_reachable_through_retained_group() {
    let conn = open_db_in_memory().unwrap();
    let follows = SqliteFollowStore::new(&conn);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let only_a = Uuid::new_v4();
    let only_b = Uuid::new_v4();
    let both = Uuid::new_v4();
    follows.follow(only_a, &[a]).unwrap();
    follows.follow(only_b, &[b]).unwrap();
    follows.follow(both, &[a, b]).unwrap();

    let sink = MemorySink::new();
    let dispatcher = NewsfeedDispatcher::new(SqliteFollowStore::new(&conn), &sink, &EngineConfig::default());
    let materializer = NewsfeedMaterializer::new(SqliteFeedStore::new(&conn));
    let feed = SqliteFeedStore::new(&conn);
    let content = Uuid::new_v4();

    dispatcher.dispatch_content_id_to_groups(content, &[a, b], &[]).unwrap();
    materializer.consume(&sink, 100).unwrap();

    let report = dispatcher.dispatch_content_id_to_groups(content, &[a], &[a, b]).unwrap();
    assert_eq!(report.published, 0);
    assert_eq!(report.removed, 1);
    materializer.consume(&sink, 100).unwrap();

    assert!(feed.get_entry(only_a, content).unwrap().is_some());
    assert!(feed.get_entry(both, content).unwrap().is_some());
    assert!(feed.get_entry(only_b, content).unwrap().is_none());
}

#[test]
fn replaying_publish_yields_same_feed() {
    let conn = open_db_in_memory().unwrap();
    let follows = SqliteFollowStore::new(&conn);
    let group = Uuid::new_v4();
    let users: Vec<_> = (0..5).map(|_| Uuid::new_v4()).collect();
    for user in &users {
        follows.follow(*user, &[group]).unwrap();
    }

    let sink = MemorySink::new();
    let dispatcher = NewsfeedDispatcher::new(SqliteFollowStore::new(&conn), &sink, &EngineConfig::default());
    let materializer = NewsfeedMaterializer::new(SqliteFeedStore::new(&conn));
    let feed = SqliteFeedStore::new(&conn);
    let content = Uuid::new_v4();

    dispatcher.dispatch_content_id_to_groups(content, &[group], &[]).unwrap();
    assert_eq!(materializer.consume(&sink, 2).unwrap(), 5);
    dispatcher.dispatch_content_id_to_groups(content, &[group], &[]).unwrap();
    assert_eq!(materializer.consume(&sink, 2).unwrap(), 5);

    for user in &users {
        assert_eq!(feed.count_entries(*user).unwrap(), 1);
    }
}

#[test]
fn unchanged_group_set_dispatches_nothing() {
    let conn = open_db_in_memory().unwrap();
    let group = Uuid::new_v4();
    SqliteFollowStore::new(&conn).follow(Uuid::new_v4(), &[group]).unwrap();

    let sink = MemorySink::new();
    let dispatcher = NewsfeedDispatcher::new(SqliteFollowStore::new(&conn), &sink, &EngineConfig::default());
    let report = dispatcher
        .dispatch_content_id_to_groups(Uuid::new_v4(), &[group], &[group])
        .unwrap();

    assert_eq!(report.pages, 0);
    assert!(sink.is_empty());
}

#[test]
fn fan_out_publishes_one_batch_per_page() {
    let conn = open_db_in_memory().unwrap();
    let follows = SqliteFollowStore::new(&conn);
    let group = Uuid::new_v4();
    for _ in 0..7 {
        follows.follow(Uuid::new_v4(), &[group]).unwrap();
    }

    let sink = MemorySink::new();
    let dispatcher = NewsfeedDispatcher::new(SqliteFollowStore::new(&conn), &sink, &small_pages(3));
    let report = dispatcher
        .dispatch_content_id_to_groups(Uuid::new_v4(), &[group], &[])
        .unwrap();

    assert_eq!(report.pages, 3);
    assert_eq!(report.published, 7);
    assert_eq!(sink.len(), 7);
}

#[test]
fn sink_failure_surfaces_as_transient_error() {
    let conn = open_db_in_memory().unwrap();
    let group = Uuid::new_v4();
    SqliteFollowStore::new(&conn).follow(Uuid::new_v4(), &[group]).unwrap();

    let dispatcher = NewsfeedDispatcher::new(
        SqliteFollowStore::new(&conn),
        UnavailableSink,
        &EngineConfig::default(),
    );
    let err = dispatcher
        .dispatch_content_id_to_groups(Uuid::new_v4(), &[group], &[])
        .unwrap_err();

    assert!(matches!(err, ServiceError::Sink(SinkError::Unavailable(_))));
    assert!(err.is_transient());
}

#[test]
fn follower_batches_stop_on_short_page_and_can_resume() {
    let conn = open_db_in_memory().unwrap();
    let follows = SqliteFollowStore::new(&conn);
    let group = Uuid::new_v4();
    for _ in 0..5 {
        follows.follow(Uuid::new_v4(), &[group]).unwrap();
    }

    let sizes: Vec<usize> = FollowerBatches::new(&follows, vec![group], Vec::new(), 2)
        .map(|batch| batch.unwrap().len())
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);

    let mut batches = FollowerBatches::new(&follows, vec![group], Vec::new(), 2);
    let first = batches.next().unwrap().unwrap();
    let resume_at = batches.cursor();
    assert!(resume_at > FollowCursor::START);

    let rest: Vec<_> = FollowerBatches::new(&follows, vec![group], Vec::new(), 2)
        .resume_from(resume_at)
        .flat_map(|batch| batch.unwrap())
        .collect();
    assert_eq!(rest.len(), 3);
    assert!(rest.iter().all(|user| !first.contains(user)));
}

#[test]
fn follower_batches_over_empty_group_set_yield_nothing() {
    let conn = open_db_in_memory().unwrap();
    let follows = SqliteFollowStore::new(&conn);
    assert_eq!(FollowerBatches::new(&follows, Vec::new(), Vec::new(), 10).count(), 0);
}
