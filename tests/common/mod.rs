//! Common test utilities for chat-forwarder integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod world;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use world::*;

use chat_forwarder::Config;
use chat_forwarder::config::PacingConfig;
use std::time::Duration;
use tempfile::TempDir;

/// Config with its database in `dir`, no pacing and fast status reports
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.path().join("forwarder.db");
    config.pacing = PacingConfig::none();
    config.engine.progress_interval = Duration::from_millis(50);
    config.engine.shutdown_timeout = Duration::from_secs(5);
    config
}
