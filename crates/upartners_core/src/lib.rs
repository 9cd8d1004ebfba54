//! Core domain logic for U-Partners case management.
//! This crate is the single source of truth for case, label and partner
//! invariants; the platform, mail and file storage sit behind traits.

pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod mail;
pub mod model;
pub mod remote;
pub mod repo;
pub mod service;
pub mod storage;
pub mod tasks;

pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use repo::{RepoError, RepoResult};
pub use service::{ServiceError, ServiceResult};
pub use tasks::{SqliteTaskQueue, Task, TaskQueue, TaskRunReport, TaskRunner};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
