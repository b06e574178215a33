//! Queue lifecycle against an on-disk database
//!
//! Several scheduler instances share one database here, the way several
//! processes would; each has its own station locks, so only the database
//! compare-and-set keeps dispatch exclusive.

use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use onair_common::db::init_database;
use onair_common::events::EventBus;
use onair_common::time;
use onair_qs::db::settings::SchedulerSettings;
use onair_qs::queue::{
    ChannelNotifier, DispatchOutcome, LoggingNotifier, NewQueueEntry, QueueScheduler, QueueStore,
};
use onair_qs::Error;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;

async fn setup() -> (TempDir, Pool<Sqlite>) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("onair.db")).await.unwrap();

    sqlx::query("INSERT INTO stations (id, name, short_name) VALUES (1, 'Test FM', 'test_fm')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO station_media (id, station_id, path, title, artist, length) VALUES \
         (42, 1, 'music/a.mp3', 'Song A', 'Band', 180.5), \
         (43, 1, 'music/b.mp3', 'Song B', 'Band', 201.0)",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO station_playlists (id, station_id, name, is_jingle) VALUES \
         (7, 1, 'Station IDs', 1), (8, 1, 'Daytime', 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    (dir, pool)
}

fn scheduler(pool: &Pool<Sqlite>) -> QueueScheduler {
    QueueScheduler::new(
        QueueStore::with_sqlite_catalog(pool.clone()),
        Arc::new(LoggingNotifier),
        EventBus::new(64),
        &SchedulerSettings::default(),
    )
}

async fn assert_flag_invariants(pool: &Pool<Sqlite>) {
    let rows: Vec<(bool, bool, Option<i64>)> =
        sqlx::query_as("SELECT sent_to_autodj, is_played, timestamp_played FROM station_queue")
            .fetch_all(pool)
            .await
            .unwrap();

    for (sent, played, ts) in rows {
        assert_eq!(played, ts.is_some(), "played iff timestamp_played");
        assert!(!played || sent, "played implies sent");
    }
}

#[tokio::test]
async fn test_cue_copies_media_metadata() {
    let (_dir, pool) = setup().await;
    let sched = scheduler(&pool);

    let entry = sched.cue(NewQueueEntry::from_media(1, 42)).await.unwrap();
    assert_eq!(entry.duration, Some(180.5));
    assert_eq!(entry.title.as_deref(), Some("Song A"));
    assert!(!entry.is_played);
    assert!(!entry.sent_to_autodj);
    assert!(entry.is_visible);

    let jingle = sched
        .cue(NewQueueEntry::from_playlist(1, 7, Some(43)))
        .await
        .unwrap();
    assert!(!jingle.is_visible);
}

#[tokio::test]
async fn test_full_lifecycle_keeps_invariants() {
    let (_dir, pool) = setup().await;
    let sched = scheduler(&pool);

    let a = sched.cue(NewQueueEntry::from_media(1, 42)).await.unwrap();
    let b = sched
        .cue(NewQueueEntry::from_playlist(1, 8, Some(43)))
        .await
        .unwrap();
    let c = sched
        .cue(NewQueueEntry::custom_uri(1, "http://relay/live"))
        .await
        .unwrap();
    assert_flag_invariants(&pool).await;

    for id in [a.id, b.id, c.id] {
        match sched.dispatch_next(1).await.unwrap() {
            DispatchOutcome::Dispatched(entry) => assert_eq!(entry.id, id),
            other => panic!("expected dispatch of {}, got {:?}", id, other),
        }
        assert_flag_invariants(&pool).await;
        sched.on_playback_confirmed(id, time::now()).await.unwrap();
        assert_flag_invariants(&pool).await;
    }

    let store = sched.store();
    assert!(store.list_upcoming(1, 10).await.unwrap().is_empty());
    let history = store.list_history(1, 10).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|e| e.is_played));
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let (_dir, pool) = setup().await;
    let store = QueueStore::with_sqlite_catalog(pool.clone());
    let id = store.insert(NewQueueEntry::from_media(1, 42)).await.unwrap();

    let claims = join_all((0..8).map(|_| {
        let store = store.clone();
        async move { store.claim_for_dispatch(1, id).await }
    }))
    .await;

    let winners = claims.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(claims
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(Error::Contention { .. }))));
}

#[tokio::test]
async fn test_independent_schedulers_dispatch_once() {
    let (_dir, pool) = setup().await;
    let (notifier, mut rx) = ChannelNotifier::new();
    let notifier = Arc::new(notifier);

    let schedulers: Vec<Arc<QueueScheduler>> = (0..4)
        .map(|_| {
            Arc::new(QueueScheduler::new(
                QueueStore::with_sqlite_catalog(pool.clone()),
                notifier.clone(),
                EventBus::new(16),
                &SchedulerSettings::default(),
            ))
        })
        .collect();

    schedulers[0]
        .cue(NewQueueEntry::from_media(1, 42))
        .await
        .unwrap();
    schedulers[0]
        .cue(NewQueueEntry::from_media(1, 43))
        .await
        .unwrap();

    let outcomes = join_all(schedulers.iter().map(|s| {
        let s = s.clone();
        async move { s.dispatch_next(1).await }
    }))
    .await;

    let dispatched = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(DispatchOutcome::Dispatched(_))))
        .count();
    assert_eq!(dispatched, 1);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, Ok(DispatchOutcome::Dispatched(_)) | Ok(DispatchOutcome::InFlight(_)))));

    let in_flight: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM station_queue WHERE station_id = 1 AND sent_to_autodj = 1 AND is_played = 0",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(in_flight, 1);

    assert!(rx.recv().await.is_some());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_purge_boundary() {
    let (_dir, pool) = setup().await;
    let sched = scheduler(&pool);
    let store = sched.store();
    let cutoff = time::now() - ChronoDuration::days(7);

    let older = store.insert(NewQueueEntry::from_media(1, 42)).await.unwrap();
    let at_cutoff = store.insert(NewQueueEntry::from_media(1, 43)).await.unwrap();
    let unplayed = store.insert(NewQueueEntry::from_media(1, 42)).await.unwrap();

    store
        .mark_played(older, cutoff - ChronoDuration::microseconds(1))
        .await
        .unwrap();
    store.mark_played(at_cutoff, cutoff).await.unwrap();

    assert_eq!(store.purge_older_than(1, cutoff).await.unwrap(), 1);
    assert!(store.get(older).await.unwrap().is_none());
    assert!(store.get(at_cutoff).await.unwrap().is_some());
    assert!(store.get(unplayed).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reassignment_updates_visibility() {
    let (_dir, pool) = setup().await;
    let sched = scheduler(&pool);

    let entry = sched
        .cue(NewQueueEntry::from_playlist(1, 8, Some(42)))
        .await
        .unwrap();
    assert!(entry.is_visible);

    let moved = sched.on_playlist_reassigned(entry.id, 7).await.unwrap();
    assert_eq!(moved.source.playlist_id(), Some(7));
    assert!(!moved.is_visible);

    let back = sched.on_playlist_reassigned(entry.id, 8).await.unwrap();
    assert!(back.is_visible);

    let uri = sched
        .cue(NewQueueEntry::custom_uri(1, "http://relay/live"))
        .await
        .unwrap();
    assert!(matches!(
        sched.on_playlist_reassigned(uri.id, 7).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_removed_entry_is_skipped() {
    let (_dir, pool) = setup().await;
    let sched = scheduler(&pool);

    let skipped = sched.cue(NewQueueEntry::from_media(1, 42)).await.unwrap();
    let next = sched.cue(NewQueueEntry::from_media(1, 43)).await.unwrap();
    sched.remove(skipped.id).await.unwrap();

    match sched.dispatch_next(1).await.unwrap() {
        DispatchOutcome::Dispatched(entry) => assert_eq!(entry.id, next.id),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        sched.remove(next.id).await,
        Err(Error::InvalidTransition { .. })
    ));
}
