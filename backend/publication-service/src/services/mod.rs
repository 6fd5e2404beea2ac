/// Business logic layer for publication-service
pub mod engagement;
pub mod feed;
pub mod follow;
pub mod identity;
pub mod index_sync;
pub mod moderation;
pub mod notifications;
pub mod publications;
pub mod sections;

pub use engagement::EngagementService;
pub use feed::FeedService;
pub use follow::FollowService;
pub use identity::{UserDirectory, UserRepository};
pub use moderation::{ModerationService, Summary};
pub use notifications::{Mailer, NotificationDispatcher, NotificationPayload, SmtpMailer};
pub use publications::PublicationService;
pub use sections::SectionService;

use crate::clock::Clock;
use crate::config::{Config, NotificationConfig};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Every service wired against one pool, clock and mailer.
#[derive(Clone)]
pub struct Services {
    pub users: UserRepository,
    pub publications: PublicationService,
    pub engagement: EngagementService,
    pub follows: FollowService,
    pub feed: FeedService,
    pub sections: SectionService,
    pub moderation: ModerationService,
    mailer: Arc<dyn Mailer>,
}

impl Services {
    /// Build the services and start the notification worker. The worker
    /// stops once every `Services` clone has been dropped.
    pub fn build(
        pool: SqlitePool,
        config: &Config,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> crate::Result<(Self, JoinHandle<()>)> {
        let (dispatcher, worker) = NotificationDispatcher::spawn(
            pool.clone(),
            mailer.clone(),
            config.notifications.queue_capacity,
        );

        let limits = config.feed.clone();
        let users = UserRepository::new(pool.clone(), clock.clone());
        let directory: Arc<dyn UserDirectory> = Arc::new(users.clone());

        let publications = PublicationService::new(
            pool.clone(),
            clock.clone(),
            directory.clone(),
            dispatcher,
            limits.clone(),
        );

        let services = Self {
            engagement: EngagementService::new(
                pool.clone(),
                clock.clone(),
                directory.clone(),
                limits.clone(),
            ),
            follows: FollowService::new(pool.clone(), clock, directory.clone(), limits.clone()),
            feed: FeedService::new(pool.clone(), limits.clone()),
            sections: SectionService::new(pool.clone(), directory.clone(), limits.clone()),
            moderation: ModerationService::new(pool, directory, publications.clone(), limits),
            publications,
            users,
            mailer,
        };

        Ok((services, worker))
    }

    /// Apply new SMTP settings. Notifications still queued go out with the
    /// new sender; an invalid config leaves the current one in place.
    pub fn reload_mail(&self, config: &NotificationConfig) -> crate::Result<()> {
        self.mailer.reload(config)
    }
}
