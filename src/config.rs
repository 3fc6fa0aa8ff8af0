//! Configuration types for chat-forwarder

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Main configuration for [`ChatForwarder`](crate::ChatForwarder)
///
/// Fields are organized into sub-configs:
/// - [`engine`](EngineConfig) - batch sizes and status cadence
/// - [`pacing`](PacingConfig) - randomized delays between platform calls
/// - [`recovery`](RecoveryConfig) - resuming tasks after a restart
/// - [`notifications`](NotificationConfig) - webhooks
/// - [`persistence`](PersistenceConfig) - SQLite location
/// - [`api`](ApiConfig) - REST API server
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Task loop behavior
    #[serde(default)]
    pub engine: EngineConfig,

    /// Delays applied around platform calls
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Crash recovery behavior
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Notification settings (webhooks)
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Task loop behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Indices requested per fetch call (default: 100, capped at 100)
    #[serde(default = "default_batch_size")]
    pub fetch_batch_size: usize,

    /// Messages per batch-forward call (default: 100, capped at 100)
    #[serde(default = "default_batch_size")]
    pub forward_batch_size: usize,

    /// How often the status reporter projects progress and writes a snapshot (default: 5 seconds)
    #[serde(default = "default_progress_interval", with = "duration_serde")]
    pub progress_interval: Duration,

    /// Time to wait for running tasks to wind down on shutdown (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Fetch batch size clamped to the platform maximum
    pub fn fetch_batch(&self) -> usize {
        self.fetch_batch_size.clamp(1, MAX_PLATFORM_BATCH)
    }

    /// Forward batch size clamped to the platform maximum
    pub fn forward_batch(&self) -> usize {
        self.forward_batch_size.clamp(1, MAX_PLATFORM_BATCH)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_batch_size: default_batch_size(),
            forward_batch_size: default_batch_size(),
            progress_interval: default_progress_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Largest id set the platform accepts in one fetch or forward call
pub const MAX_PLATFORM_BATCH: usize = 100;

/// Inclusive range of seconds a randomized delay is drawn from
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    /// Lower bound
    #[serde(with = "duration_serde")]
    pub min: Duration,
    /// Upper bound
    #[serde(with = "duration_serde")]
    pub max: Duration,
}

impl DelayRange {
    /// Range between two whole-second bounds
    pub const fn secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    /// A range that never sleeps
    pub const fn zero() -> Self {
        Self::secs(0, 0)
    }

    /// Draw a delay uniformly from the range, at millisecond resolution
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        if lo == hi {
            return lo;
        }
        let millis = rand::thread_rng().gen_range(lo.as_millis() as u64..=hi.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Randomized delays applied around platform calls
///
/// Every value is a range and a fresh delay is drawn for each use.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Pause between successful fetch batches (default: 3-5 seconds)
    #[serde(default = "default_fetch_pause")]
    pub fetch_pause: DelayRange,

    /// Jitter added to a rate-limit wait while enumerating (default: 5-20 seconds)
    #[serde(default = "default_fetch_throttle_jitter")]
    pub fetch_throttle_jitter: DelayRange,

    /// Margin added to a rate-limit wait while dispatching (default: 5-10 seconds)
    #[serde(default = "default_dispatch_throttle_margin")]
    pub dispatch_throttle_margin: DelayRange,

    /// Pause after each full batch forward (default: 10-15 seconds)
    #[serde(default = "default_forward_batch_pause")]
    pub forward_batch_pause: DelayRange,

    /// Pause after each copied message on a bot account (default: 2-5 seconds)
    #[serde(default = "default_copy_pause_bot")]
    pub copy_pause_bot: DelayRange,

    /// Pause after each copied message on a user account (default: 4-10 seconds)
    #[serde(default = "default_copy_pause_user")]
    pub copy_pause_user: DelayRange,
}

impl PacingConfig {
    /// Pacing with every delay set to zero, for tests and local platforms
    pub fn none() -> Self {
        Self {
            fetch_pause: DelayRange::zero(),
            fetch_throttle_jitter: DelayRange::zero(),
            dispatch_throttle_margin: DelayRange::zero(),
            forward_batch_pause: DelayRange::zero(),
            copy_pause_bot: DelayRange::zero(),
            copy_pause_user: DelayRange::zero(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            fetch_pause: default_fetch_pause(),
            fetch_throttle_jitter: default_fetch_throttle_jitter(),
            dispatch_throttle_margin: default_dispatch_throttle_margin(),
            forward_batch_pause: default_forward_batch_pause(),
            copy_pause_bot: default_copy_pause_bot(),
            copy_pause_user: default_copy_pause_user(),
        }
    }
}

/// Crash recovery behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Resume tasks that were active at the last shutdown (default: true)
    #[serde(default = "default_true")]
    pub resume_on_startup: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            resume_on_startup: true,
        }
    }
}

/// Notification settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Webhook configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Events that trigger this webhook
    pub events: Vec<WebhookEvent>,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Webhook trigger event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    /// Triggered when a task enters Running (including recovered tasks)
    OnStarted,
    /// Triggered when a task scanned its whole range
    OnCompleted,
    /// Triggered when a user cancels a task
    OnCancelled,
    /// Triggered when a task fails during setup or while running
    OnFailed,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./chat-forwarder.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_batch_size() -> usize {
    MAX_PLATFORM_BATCH
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_event_capacity() -> usize {
    1000
}

fn default_fetch_pause() -> DelayRange {
    DelayRange::secs(3, 5)
}

fn default_fetch_throttle_jitter() -> DelayRange {
    DelayRange::secs(5, 20)
}

fn default_dispatch_throttle_margin() -> DelayRange {
    DelayRange::secs(5, 10)
}

fn default_forward_batch_pause() -> DelayRange {
    DelayRange::secs(10, 15)
}

fn default_copy_pause_bot() -> DelayRange {
    DelayRange::secs(2, 5)
}

fn default_copy_pause_user() -> DelayRange {
    DelayRange::secs(4, 10)
}

fn default_true() -> bool {
    true
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./chat-forwarder.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
