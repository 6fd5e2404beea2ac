/// Configuration management for Publication Service
///
/// All settings are read from environment variables with development
/// defaults; production refuses a few unsafe combinations.
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Notification (SMTP) configuration
    pub notifications: NotificationConfig,
    /// Feed and listing limits
    pub feed: FeedConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database URL
    pub url: String,
    /// Max connections in pool
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// How long a writer waits on SQLite's write lock before failing
    pub busy_timeout_secs: u64,
}

/// Outbound mail settings for new-post notifications.
///
/// An empty `smtp_host` disables delivery; notifications are then logged and
/// dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    #[serde(skip_serializing)]
    pub smtp_password: String,
    pub from_address: String,
    pub use_starttls: bool,
    /// Capacity of the in-process dispatch queue
    pub queue_capacity: usize,
}

/// Feed and listing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub top_tags_limit: u32,
    pub tag_search_limit: u32,
    pub gallery_max_images: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let is_production = app_env.eq_ignore_ascii_case("production");

        Ok(Config {
            app: AppConfig {
                env: app_env.clone(),
                host: std::env::var("PUBLICATION_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("PUBLICATION_SERVICE_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8090),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://portfolio.db".to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(10),
                acquire_timeout_secs: std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(10),
                busy_timeout_secs: std::env::var("DATABASE_BUSY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(5),
            },
            notifications: {
                let smtp_host = std::env::var("SMTP_HOST").unwrap_or_default();
                let smtp_password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
                if is_production && !smtp_host.trim().is_empty() && smtp_password.is_empty() {
                    return Err("SMTP_PASSWORD must be set when SMTP_HOST is set in production"
                        .to_string());
                }

                NotificationConfig {
                    smtp_host,
                    smtp_port: std::env::var("SMTP_PORT")
                        .ok()
                        .and_then(|p| p.parse().ok())
                        .unwrap_or(587),
                    smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                    smtp_password,
                    from_address: std::env::var("SMTP_FROM")
                        .unwrap_or_else(|_| "Portfolio <no-reply@localhost>".to_string()),
                    use_starttls: std::env::var("SMTP_STARTTLS")
                        .ok()
                        .and_then(|v| parse_bool(&v))
                        .unwrap_or(true),
                    queue_capacity: std::env::var("NOTIFICATION_QUEUE_CAPACITY")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .filter(|v: &usize| *v > 0)
                        .unwrap_or(256),
                }
            },
            feed: {
                let default_page_size = parse_env_or_default("FEED_PAGE_SIZE", 12)?;
                let max_page_size = parse_env_or_default("FEED_MAX_PAGE_SIZE", 100)?;
                if default_page_size == 0 || default_page_size > max_page_size {
                    return Err(format!(
                        "FEED_PAGE_SIZE must be between 1 and FEED_MAX_PAGE_SIZE ({})",
                        max_page_size
                    ));
                }

                FeedConfig {
                    default_page_size,
                    max_page_size,
                    top_tags_limit: parse_env_or_default("TOP_TAGS_LIMIT", 50)?,
                    tag_search_limit: parse_env_or_default("TAG_SEARCH_LIMIT", 25)?,
                    gallery_max_images: parse_env_or_default("GALLERY_MAX_IMAGES", 10)?,
                }
            },
        })
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_page_size: 12,
            max_page_size: 100,
            top_tags_limit: 50,
            tag_search_limit: 25,
            gallery_max_images: 10,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: "Portfolio <no-reply@localhost>".to_string(),
            use_starttls: true,
            queue_capacity: 256,
        }
    }
}

impl NotificationConfig {
    pub fn is_enabled(&self) -> bool {
        !self.smtp_host.trim().is_empty()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_env_or_default(key: &str, default: u32) -> Result<u32, String> {
    match std::env::var(key) {
        Ok(val) => val
            .parse()
            .map_err(|e| format!("Failed to parse {}='{}': {}", key, val, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: &[&str] = &[
        "APP_ENV",
        "PUBLICATION_SERVICE_PORT",
        "DATABASE_URL",
        "DATABASE_BUSY_TIMEOUT_SECS",
        "SMTP_HOST",
        "SMTP_PASSWORD",
        "SMTP_STARTTLS",
        "FEED_PAGE_SIZE",
        "FEED_MAX_PAGE_SIZE",
        "NOTIFICATION_QUEUE_CAPACITY",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_defaults() {
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.port, 8090);
        assert_eq!(config.database.url, "sqlite://portfolio.db");
        assert_eq!(config.database.busy_timeout_secs, 5);
        assert_eq!(config.feed.default_page_size, 12);
        assert_eq!(config.feed.tag_search_limit, 25);
        assert_eq!(config.feed.gallery_max_images, 10);
        assert!(!config.notifications.is_enabled());
        assert!(config.notifications.use_starttls);
        assert_eq!(config.notifications.queue_capacity, 256);
    }

    #[test]
    #[serial_test::serial]
    fn test_production_requires_smtp_password() {
        clear_env();
        std::env::set_var("APP_ENV", "production");
        std::env::set_var("SMTP_HOST", "smtp.example.com");

        let err = Config::from_env().unwrap_err();
        assert!(err.contains("SMTP_PASSWORD"));

        std::env::set_var("SMTP_PASSWORD", "hunter2");
        let config = Config::from_env().unwrap();
        assert!(config.notifications.is_enabled());

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_invalid_page_size_is_rejected() {
        clear_env();
        std::env::set_var("FEED_PAGE_SIZE", "0");
        assert!(Config::from_env().is_err());

        std::env::set_var("FEED_PAGE_SIZE", "twelve");
        let err = Config::from_env().unwrap_err();
        assert!(err.contains("FEED_PAGE_SIZE"));

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_starttls_toggle() {
        clear_env();
        std::env::set_var("SMTP_STARTTLS", "off");
        let config = Config::from_env().unwrap();
        assert!(!config.notifications.use_starttls);
        clear_env();
    }
}
