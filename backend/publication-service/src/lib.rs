/// Publication Service Library
///
/// Keeps a unified post index in sync with the three publishable content
/// kinds (articles, projects, galleries), aggregates tag votes, maintains the
/// follow graph and mails followers when something new is published.
///
/// # Modules
///
/// - `models`: Domain types (owner union, post index record, tags, votes)
/// - `db`: SQLite pool, migrations and repositories
/// - `services`: Index synchronizer, write paths, engagement, follows, feeds
/// - `metrics`: Prometheus collectors and the `/metrics` handler
/// - `error`: Error types and handling
/// - `config`: Configuration management
/// - `clock`: Injected time source
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
