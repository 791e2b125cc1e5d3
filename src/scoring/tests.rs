use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use uuid::Uuid;

use super::*;
use crate::db::models::connection::{
    ConnectionEvent, ConnectionFilter, ConnectionKey, NewConnectionEvent, UserId, UserType,
};
use crate::db::models::profile::Profile;
use crate::db::models::score::MonthlyScore;
use crate::db::repositories::ConnectionGateway;
use crate::db::repositories::memory::MemoryGateway;
use crate::db::{StoreError, StoreResult};
use crate::identity::Identity;
use crate::util::photo::PhotoStorage;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn connected(id: &str, name: &str) -> Identity {
    Identity {
        user_id: id.into(),
        user_type: UserType::Connected,
        name: name.to_owned(),
        photo: None,
    }
}

fn local(id: &str) -> Identity {
    Identity {
        user_id: id.into(),
        user_type: UserType::Local,
        name: String::from("Local User"),
        photo: None,
    }
}

fn event(identity: &Identity, on: NaiveDate, points: i32) -> ConnectionEvent {
    NewConnectionEvent {
        id: Uuid::new_v4(),
        user_id: identity.user_id.clone(),
        user_type: identity.user_type,
        user_name: identity.name.clone(),
        user_photo: identity.photo.clone(),
        connection_date: on,
        points_earned: points,
        created_at: Utc::now(),
    }
    .into_event()
}

fn service_on(gateway: MemoryGateway, today: NaiveDate) -> ScoringService<MemoryGateway> {
    ScoringService::new(gateway, PhotoStorage::new("https://store.example.com", "user-photos"))
        .with_clock(FixedClock::on(today))
}

fn window(year: i32, month: u32) -> Option<MonthWindow> {
    Some(MonthWindow::new(year, month).unwrap())
}

/// Wraps the memory gateway and fails selected operations on demand.
#[derive(Default)]
struct FlakyGateway {
    inner: MemoryGateway,
    fail_reads: AtomicBool,
    fail_inserts: AtomicBool,
    fail_profiles: AtomicBool,
}

impl FlakyGateway {
    fn broken() -> StoreError {
        StoreError::SqlxError(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl ConnectionGateway for FlakyGateway {
    async fn find_one(&self, key: &ConnectionKey) -> StoreResult<Option<ConnectionEvent>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.find_one(key).await
    }

    async fn insert(&self, event: &NewConnectionEvent) -> StoreResult<Option<ConnectionEvent>> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.insert(event).await
    }

    async fn find_many(&self, filter: &ConnectionFilter) -> StoreResult<Vec<ConnectionEvent>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.find_many(filter).await
    }

    async fn find_profiles(&self, ids: &[UserId]) -> StoreResult<Vec<Profile>> {
        if self.fail_profiles.load(Ordering::SeqCst) {
            return Err(Self::broken());
        }
        self.inner.find_profiles(ids).await
    }
}

#[tokio::test]
async fn test_record_once_per_day() {
    let service = service_on(MemoryGateway::new(), date(2025, 3, 10));
    let ada = connected("a", "Ada");

    let first = service.record_connection(&ada).await;
    assert!(first.success);
    assert_eq!(first.outcome, ConnectionOutcome::Recorded);
    assert_eq!(first.points_today, 1);
    assert_eq!(first.total_points_month, 1);
    assert_eq!(first.connection_days, 1);

    let second = service.record_connection(&ada).await;
    assert!(!second.success);
    assert_eq!(second.outcome, ConnectionOutcome::AlreadyConnected);
    assert_eq!(second.message, MSG_ALREADY_CONNECTED);
    assert_eq!(second.points_today, 0);

    assert_eq!(service.gateway().event_count(), 1);
    assert!(service.has_connected_today(&ada).await);
}

#[tokio::test]
async fn test_record_next_day_counts_again() {
    let gateway = Arc::new(MemoryGateway::new());
    let ada = connected("a", "Ada");

    let monday = ScoringService::new(gateway.clone(), PhotoStorage::default())
        .with_clock(FixedClock::on(date(2025, 3, 10)));
    let tuesday = ScoringService::new(gateway.clone(), PhotoStorage::default())
        .with_clock(FixedClock::on(date(2025, 3, 11)));

    assert!(monday.record_connection(&ada).await.success);
    assert!(!tuesday.has_connected_today(&ada).await);

    let result = tuesday.record_connection(&ada).await;
    assert!(result.success);
    assert_eq!(result.total_points_month, 2);
    assert_eq!(result.connection_days, 2);
}

#[tokio::test]
async fn test_user_types_do_not_collide() {
    let service = service_on(MemoryGateway::new(), date(2025, 3, 10));

    assert!(service.record_connection(&connected("same", "A")).await.success);
    assert!(service.record_connection(&local("same")).await.success);
    assert_eq!(service.gateway().event_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_persist_one_row() {
    let service = Arc::new(service_on(MemoryGateway::new(), date(2025, 3, 10)));
    let ada = connected("a", "Ada");

    let results = join_all((0..16).map(|_| {
        let service = service.clone();
        let ada = ada.clone();
        tokio::spawn(async move { service.record_connection(&ada).await })
    }))
    .await;

    let successes = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.success)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(service.gateway().event_count(), 1);
}

#[tokio::test]
async fn test_monthly_score_sums_window() {
    let gateway = MemoryGateway::new();
    let ada = connected("a", "Ada");
    for day in [1, 4, 9, 17, 28] {
        gateway.seed(event(&ada, date(2025, 3, day), 1));
    }
    gateway.seed(event(&ada, date(2025, 3, 30), 3));

    let service = service_on(gateway, date(2025, 3, 30));
    let score = service.user_score(Some(&ada), window(2025, 3)).await;

    assert_eq!(score.total_points, 8);
    assert_eq!(score.connection_days, 6);
    assert_eq!(score.current_streak, 6);

    // defaults to the clock's month
    assert_eq!(service.user_score(Some(&ada), None).await, score);
}

#[tokio::test]
async fn test_score_without_identity_is_zero() {
    let service = service_on(MemoryGateway::new(), date(2025, 3, 10));
    assert_eq!(
        service.user_score(None, window(2025, 3)).await,
        MonthlyScore::default()
    );
}

#[tokio::test]
async fn test_windows_are_isolated() {
    let gateway = MemoryGateway::new();
    let ada = connected("a", "Ada");
    gateway.seed(event(&ada, date(2025, 3, 31), 1));
    gateway.seed(event(&ada, date(2025, 4, 1), 1));
    gateway.seed(event(&ada, date(2025, 4, 2), 1));

    let service = service_on(gateway, date(2025, 4, 2));
    let april = MonthWindow::new(2025, 4).unwrap();

    assert_eq!(
        service
            .user_score(Some(&ada), Some(april.previous()))
            .await
            .total_points,
        1
    );
    assert_eq!(
        service.user_score(Some(&ada), Some(april)).await.total_points,
        2
    );
    assert!(service.monthly_ranking(Some(april.next())).await.is_empty());
    assert_eq!(
        service.monthly_ranking(Some(april.previous())).await[0].total_points,
        1
    );
}

#[tokio::test]
async fn test_user_connections_most_recent_first() {
    let gateway = MemoryGateway::new();
    let ada = connected("a", "Ada");
    for day in [2, 12, 7] {
        gateway.seed(event(&ada, date(2025, 5, day), 1));
    }
    gateway.seed(event(&local("l"), date(2025, 5, 3), 1));

    let service = service_on(gateway, date(2025, 5, 20));
    let days: Vec<u32> = service
        .user_connections(&ada, None)
        .await
        .iter()
        .map(|e| e.day)
        .collect();

    assert_eq!(days, vec![12, 7, 2]);
}

#[tokio::test]
async fn test_ranking_orders_and_ranks() {
    let gateway = MemoryGateway::new();
    let (a, b, c) = (connected("a", "A"), local("local-b"), local("local-c"));

    for day in 1..=8 {
        gateway.seed(event(&a, date(2025, 4, day + 2), 1));
        gateway.seed(event(&b, date(2025, 4, day), 1));
    }
    for day in 1..=3 {
        gateway.seed(event(&c, date(2025, 4, day), 1));
    }

    let service = service_on(gateway, date(2025, 4, 30));
    let ranking = service.monthly_ranking(window(2025, 4)).await;

    assert_eq!(ranking.len(), 3);
    assert_eq!(
        ranking.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(ranking.windows(2).all(|w| w[0].total_points >= w[1].total_points));

    // equal points: earlier first connection ranks higher
    assert_eq!(ranking[0].user_id.as_str(), "local-b");
    assert_eq!(ranking[1].user_id.as_str(), "a");
    assert_eq!(ranking[2].user_id.as_str(), "local-c");
    assert_eq!(ranking[2].total_points, 3);
    assert_eq!(ranking[2].current_streak, 3);
}

#[tokio::test]
async fn test_empty_month_ranking() {
    let service = service_on(MemoryGateway::new(), date(2025, 6, 15));
    assert!(service.monthly_ranking(window(2025, 6)).await.is_empty());
}

#[tokio::test]
async fn test_ranking_fills_missing_profiles() {
    let gateway = MemoryGateway::with_profiles([
        Profile {
            id: "a".into(),
            first_name: Some(String::from("Ada")),
            last_name: Some(String::from("Lovelace")),
            photo_url: Some(String::from("ada.png")),
        },
        Profile {
            id: "g".into(),
            first_name: None,
            last_name: None,
            photo_url: None,
        },
    ]);

    let mut with_photo = connected("p", "Photo Kept");
    with_photo.photo = Some(String::from("https://cdn.example.com/p.png"));

    gateway.seed(event(&connected("a", "a@example.com"), date(2025, 4, 1), 1));
    gateway.seed(event(&connected("g", "Grace"), date(2025, 4, 2), 1));
    gateway.seed(event(&with_photo, date(2025, 4, 3), 1));

    let service = service_on(gateway, date(2025, 4, 30));
    let ranking = service.monthly_ranking(window(2025, 4)).await;
    let by_id = |id: &str| ranking.iter().find(|r| r.user_id.as_str() == id).unwrap();

    assert_eq!(by_id("a").user_name, "Ada Lovelace");
    assert_eq!(
        by_id("a").user_photo.as_deref(),
        Some("https://store.example.com/storage/v1/object/public/user-photos/ada.png")
    );
    // empty canonical name keeps the snapshot
    assert_eq!(by_id("g").user_name, "Grace");
    assert_eq!(by_id("g").user_photo, None);
    assert_eq!(
        by_id("p").user_photo.as_deref(),
        Some("https://cdn.example.com/p.png")
    );
}

#[tokio::test]
async fn test_recorded_photo_prefers_profile() {
    let gateway = MemoryGateway::with_profiles([Profile {
        id: "a".into(),
        first_name: None,
        last_name: None,
        photo_url: Some(String::from("avatars/a.png")),
    }]);
    let mut ada = connected("a", "Ada");
    ada.photo = Some(String::from("https://session.example.com/a.png"));

    let service = service_on(gateway, date(2025, 3, 10));
    assert!(service.record_connection(&ada).await.success);

    let stored = service.user_connections(&ada, None).await;
    assert_eq!(
        stored[0].user_photo.as_deref(),
        Some("https://store.example.com/storage/v1/object/public/user-photos/avatars/a.png")
    );
    assert_eq!(stored[0].user_name, "Ada");
    assert_eq!((stored[0].year, stored[0].month, stored[0].day), (2025, 3, 10));
}

#[tokio::test]
async fn test_storage_failures_are_absorbed() {
    let flaky = FlakyGateway::default();
    let ada = connected("a", "Ada");
    flaky.inner.seed(event(&ada, date(2025, 3, 1), 1));

    let service = ScoringService::new(flaky, PhotoStorage::default())
        .with_clock(FixedClock::on(date(2025, 3, 10)));

    service.gateway().fail_inserts.store(true, Ordering::SeqCst);
    let result = service.record_connection(&ada).await;
    assert_eq!(result, ConnectionResult::failed());
    assert_eq!(result.message, MSG_FAILED);

    service.gateway().fail_reads.store(true, Ordering::SeqCst);
    assert_eq!(
        service.record_connection(&ada).await.outcome,
        ConnectionOutcome::Failed
    );
    assert!(!service.has_connected_today(&ada).await);
    assert_eq!(
        service.user_score(Some(&ada), None).await,
        MonthlyScore::default()
    );
    assert!(service.user_connections(&ada, None).await.is_empty());
    assert!(service.monthly_ranking(None).await.is_empty());
}

#[tokio::test]
async fn test_profile_failure_keeps_snapshots() {
    let flaky = FlakyGateway::default();
    flaky.inner.seed(event(&connected("a", "Ada"), date(2025, 3, 1), 1));
    flaky.fail_profiles.store(true, Ordering::SeqCst);

    let service = ScoringService::new(flaky, PhotoStorage::default())
        .with_clock(FixedClock::on(date(2025, 3, 10)));

    let ranking = service.monthly_ranking(None).await;
    assert_eq!(ranking.len(), 1);
    assert_eq!(ranking[0].user_name, "Ada");
    assert_eq!(ranking[0].user_photo, None);

    // recording still works, falling back to the session photo
    assert!(service.record_connection(&connected("a", "Ada")).await.success);
}
