//! Shared fixtures for the integration tests.
#![allow(dead_code)]

pub mod recording_mailer;

use chrono::{TimeZone, Utc};
use publication_service::clock::{Clock, ManualClock};
use publication_service::config::{AppConfig, DatabaseConfig, FeedConfig, NotificationConfig};
use publication_service::db;
use publication_service::models::{Authority, NewUser, Post, PostRow};
use publication_service::services::Services;
use publication_service::Config;
use recording_mailer::RecordingMailer;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct TestApp {
    pub services: Services,
    pub pool: SqlitePool,
    pub mailer: RecordingMailer,
    pub clock: ManualClock,
    pub worker: JoinHandle<()>,
}

impl TestApp {
    /// Drop every service handle and wait for the notification worker to
    /// drain its queue.
    pub async fn finish(self) -> (SqlitePool, RecordingMailer) {
        let TestApp {
            services,
            pool,
            mailer,
            worker,
            ..
        } = self;
        drop(services);
        worker.await.unwrap();
        (pool, mailer)
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.pool).await.unwrap()
    }

    pub async fn all_posts(&self) -> Vec<Post> {
        let rows = sqlx::query_as::<_, PostRow>(
            "SELECT id, owner_type, owner_id, title, author, published, created_at, updated_at FROM posts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .unwrap();
        rows.into_iter().map(|r| Post::try_from(r).unwrap()).collect()
    }
}

pub fn test_config() -> Config {
    Config {
        app: AppConfig {
            env: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            acquire_timeout_secs: 5,
            busy_timeout_secs: 5,
        },
        notifications: NotificationConfig::default(),
        feed: FeedConfig::default(),
    }
}

/// In-memory app with users `alice`, `bob`, `carol`, `dave` and the
/// moderator `mod`.
pub async fn setup() -> TestApp {
    let pool = db::connect_in_memory().await.unwrap();
    let mailer = RecordingMailer::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

    let (services, worker) = Services::build(
        pool.clone(),
        &test_config(),
        shared_clock,
        Arc::new(mailer.clone()),
    )
    .unwrap();

    for name in ["alice", "bob", "carol", "dave"] {
        services
            .users
            .create_user(NewUser::new(name, format!("{}@example.com", name)))
            .await
            .unwrap();
    }
    services
        .users
        .create_user(NewUser::new("mod", "mod@example.com").with_authority(Authority::Moderator))
        .await
        .unwrap();

    TestApp {
        services,
        pool,
        mailer,
        clock,
        worker,
    }
}
