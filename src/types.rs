//! Core types for chat-forwarder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::{format_duration, progress_bar};

/// Platform identifier of the user who owns a task
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for UserId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for UserId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for UserId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Identifier of a forwarding task, `"{user_id}-{nonce}"`
///
/// The nonce disambiguates successive tasks of the same user. The id stays the
/// same when a task is resumed after a restart.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Build the id for a user and nonce
    pub fn new(user_id: UserId, nonce: i64) -> Self {
        Self(format!("{user_id}-{nonce}"))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Reference to a chat: a numeric id or a public username
///
/// Serialized as a string: numeric ids as digits (with sign), usernames with a
/// leading `@`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChatRef {
    /// Numeric chat id (channels are negative)
    Id(i64),
    /// Public username without the `@`
    Username(String),
}

impl std::fmt::Display for ChatRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{id}"),
            ChatRef::Username(name) => write!(f, "@{name}"),
        }
    }
}

impl std::str::FromStr for ChatRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(ChatRef::Id(id));
        }
        let name = trimmed.trim_start_matches('@');
        if name.is_empty() {
            return Err(format!("invalid chat reference: {s:?}"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid chat username: {s:?}"));
        }
        Ok(ChatRef::Username(name.to_string()))
    }
}

impl TryFrom<String> for ChatRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChatRef> for String {
    fn from(chat: ChatRef) -> Self {
        chat.to_string()
    }
}

/// Opaque content identifier of a file, stable across re-fetches
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ContentSignature(pub String);

impl ContentSignature {
    /// Borrow the signature as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentSignature {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Locks reserved, client being prepared
    Starting,
    /// Enumerating and dispatching
    Running,
    /// Scanned the whole range
    Completed,
    /// Stopped by the user
    Cancelled,
    /// Stopped by an error
    Failed,
    /// Stopped by process shutdown, will resume on next start
    Interrupted,
}

impl TaskStatus {
    /// Convert integer status code to TaskStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TaskStatus::Starting,
            1 => TaskStatus::Running,
            2 => TaskStatus::Completed,
            3 => TaskStatus::Cancelled,
            4 => TaskStatus::Failed,
            5 => TaskStatus::Interrupted,
            _ => TaskStatus::Failed,
        }
    }

    /// Convert TaskStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            TaskStatus::Starting => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed => 2,
            TaskStatus::Cancelled => 3,
            TaskStatus::Failed => 4,
            TaskStatus::Interrupted => 5,
        }
    }

    /// Whether the task has left the active set for good
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }
}

/// Progress counters a task maintains
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Source indices scanned (starts at `skip`)
    Fetched,
    /// Messages delivered to the destination
    Dispatched,
    /// Messages skipped because their content was already forwarded
    Duplicate,
    /// Messages rejected by content-type, link, extension, keyword or size rules
    Filtered,
    /// Empty or service messages, plus messages whose dispatch failed
    Deleted,
}

/// How accepted messages reach the destination
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    /// Forward in batches, keeping the "forwarded from" tag
    TagPreserving,
    /// Copy one by one with a rebuilt caption and optional buttons
    #[default]
    Transform,
}

/// Coarse content kinds that can be switched off per task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Plain text messages
    Text,
    /// Photos
    Photo,
    /// Videos
    Video,
    /// Documents (generic files)
    Document,
    /// Audio tracks
    Audio,
    /// Voice notes
    Voice,
    /// GIF animations
    Animation,
    /// Stickers
    Sticker,
    /// Polls
    Poll,
    /// Messages containing URLs or text links
    Link,
}

/// Per-task configuration, captured when the task starts
///
/// Persisted next to the task snapshot so a recovered task behaves exactly as
/// it did before the restart.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskConfig {
    /// Content kinds that are not forwarded
    #[serde(default)]
    pub disabled_content: Vec<ContentKind>,

    /// Keyword patterns rejected when found in a file name
    #[serde(default)]
    pub keywords: Vec<String>,

    /// File extensions that are not forwarded
    ///
    /// Each entry is a case-insensitive regular expression matched against the
    /// end of the file name after a dot, so `mp[34]` drops `.mp3` and `.mp4`.
    /// A leading dot is ignored.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Minimum file size in MB (0 = no lower bound)
    #[serde(default)]
    pub min_size_mb: f64,

    /// Maximum file size in MB (0 = no upper bound)
    #[serde(default)]
    pub max_size_mb: f64,

    /// Caption template with `{filename}`, `{size}` and `{caption}` placeholders
    #[serde(default)]
    pub caption_template: Option<String>,

    /// Inline button markup, `[text][buttonurl:url]`, one button per group
    #[serde(default)]
    pub button: Option<String>,

    /// Mark dispatched messages as protected from saving and forwarding
    #[serde(default)]
    pub protect_content: bool,

    /// Dispatch strategy
    #[serde(default)]
    pub forward_mode: ForwardMode,

    /// Skip files whose content was already forwarded to this destination
    #[serde(default)]
    pub skip_duplicates: bool,

    /// SQLite URL of a durable per-destination dedup store
    #[serde(default)]
    pub dedup_store_url: Option<String>,
}

/// Request to start a forwarding task
#[derive(Clone, Debug)]
pub struct StartTaskRequest {
    /// Owning user
    pub user_id: UserId,
    /// Chat to read from
    pub source: ChatRef,
    /// Chat to write into
    pub destination: ChatRef,
    /// First index to scan
    pub skip: u64,
    /// Exclusive upper bound of indices to scan
    pub limit: u64,
    /// Disambiguating nonce for the task id (defaults to the current time in ms)
    pub nonce: Option<i64>,
    /// Filter, caption and dispatch settings
    pub config: TaskConfig,
}

/// Point-in-time copy of a task's progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressSnapshot {
    /// Task identifier
    pub task_id: TaskId,
    /// Owning user
    pub user_id: UserId,
    /// Chat being read
    #[schema(value_type = String)]
    pub source: ChatRef,
    /// Chat being written
    #[schema(value_type = String)]
    pub destination: ChatRef,
    /// First index of the range
    pub skip: u64,
    /// Exclusive upper bound of the range
    pub limit: u64,
    /// Indices scanned so far, including `skip`
    pub fetched: u64,
    /// Denominator for progress, equal to `limit`
    pub total: u64,
    /// Messages delivered
    pub dispatched: u64,
    /// Duplicates skipped
    pub duplicate: u64,
    /// Messages rejected by filters
    pub filtered: u64,
    /// Unusable messages and failed dispatches
    pub deleted: u64,
    /// When the task entered Running
    pub started_at: Option<DateTime<Utc>>,
    /// Current status
    pub status: TaskStatus,
}

/// Progress snapshot with derived throughput and ETA
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressReport {
    /// Underlying counters
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
    /// Progress percentage (0.0 to 100.0)
    pub percent: f32,
    /// Indices scanned per second since start
    pub speed_per_sec: f64,
    /// Seconds until the range is exhausted at the current speed
    pub eta_secs: Option<u64>,
}

impl ProgressReport {
    /// Project a snapshot at the given instant
    pub fn from_snapshot(snapshot: ProgressSnapshot, now: DateTime<Utc>) -> Self {
        let percent = if snapshot.total == 0 {
            100.0
        } else {
            ((snapshot.fetched as f64 * 100.0) / snapshot.total as f64).min(100.0) as f32
        };

        let processed = snapshot.fetched.saturating_sub(snapshot.skip);
        let elapsed = snapshot
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);
        let speed_per_sec = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };

        let remaining = snapshot.total.saturating_sub(snapshot.fetched);
        let eta_secs = if remaining == 0 {
            Some(0)
        } else if speed_per_sec > 0.0 {
            Some((remaining as f64 / speed_per_sec).round() as u64)
        } else {
            None
        };

        Self {
            snapshot,
            percent,
            speed_per_sec,
            eta_secs,
        }
    }

    /// Render a human-readable status card
    pub fn render(&self) -> String {
        let s = &self.snapshot;
        let eta = match self.eta_secs {
            Some(secs) => format_duration(secs),
            None => "unknown".to_string(),
        };
        format!(
            "Forward status: {status:?}\n\
             Fetched: {fetched}/{total}\n\
             Forwarded: {dispatched}\n\
             Duplicates skipped: {duplicate}\n\
             Filtered: {filtered}\n\
             Skipped/failed: {deleted}\n\
             {bar} {percent:.1}%\n\
             ETA: {eta}",
            status = s.status,
            fetched = s.fetched,
            total = s.total,
            dispatched = s.dispatched,
            duplicate = s.duplicate,
            filtered = s.filtered,
            deleted = s.deleted,
            bar = progress_bar(self.percent),
            percent = self.percent,
        )
    }
}

/// Record of a task that reached a terminal state
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    /// Row id
    pub id: i64,
    /// Task identifier
    pub task_id: TaskId,
    /// Owning user
    pub user_id: UserId,
    /// Source chat, as displayed
    pub source: String,
    /// Destination chat, as displayed
    pub destination: String,
    /// Final status (Completed, Cancelled or Failed)
    pub status: TaskStatus,
    /// Final scanned count
    pub fetched: u64,
    /// Range upper bound
    pub total: u64,
    /// Messages delivered
    pub dispatched: u64,
    /// Duplicates skipped
    pub duplicate: u64,
    /// Messages rejected by filters
    pub filtered: u64,
    /// Unusable messages and failed dispatches
    pub deleted: u64,
    /// Error text for failed tasks
    pub error: Option<String>,
    /// When the task entered Running
    pub started_at: Option<DateTime<Utc>>,
    /// When the task finished
    pub finished_at: DateTime<Utc>,
}

/// Body POSTed to webhook URLs
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookPayload {
    /// Event name (`started`, `completed`, `cancelled` or `failed`)
    pub event: String,
    /// Task identifier
    pub task_id: TaskId,
    /// Owning user
    pub user_id: UserId,
    /// Source chat, as displayed
    pub source: String,
    /// Destination chat, as displayed
    pub destination: String,
    /// Task status at the time of the event
    pub status: TaskStatus,
    /// Messages delivered
    pub dispatched: u64,
    /// Indices scanned
    pub fetched: u64,
    /// Error message, for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix timestamp of the event
    pub timestamp: i64,
}

/// Event emitted during a task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task entered Running
    TaskStarted {
        /// Task identifier
        task_id: TaskId,
        /// Owning user
        user_id: UserId,
        /// Source chat, as displayed
        source: String,
        /// Destination chat, as displayed
        destination: String,
        /// Whether the task was resumed after a restart
        recovered: bool,
    },

    /// Periodic progress projection
    Progress {
        /// Task identifier
        task_id: TaskId,
        /// Owning user
        user_id: UserId,
        /// Indices scanned
        fetched: u64,
        /// Range upper bound
        total: u64,
        /// Messages delivered
        dispatched: u64,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Indices scanned per second
        speed_per_sec: f64,
        /// Estimated seconds remaining
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_secs: Option<u64>,
    },

    /// Task scanned its whole range
    TaskCompleted {
        /// Task identifier
        task_id: TaskId,
        /// Owning user
        user_id: UserId,
        /// Final counters
        snapshot: Box<ProgressSnapshot>,
    },

    /// Task stopped at the user's request
    TaskCancelled {
        /// Task identifier
        task_id: TaskId,
        /// Owning user
        user_id: UserId,
    },

    /// Task could not be set up or stopped on an error
    TaskFailed {
        /// Task identifier
        task_id: TaskId,
        /// Owning user
        user_id: UserId,
        /// Error message
        error: String,
    },

    /// Task stopped by shutdown; it resumes on the next start
    TaskInterrupted {
        /// Task identifier
        task_id: TaskId,
        /// Owning user
        user_id: UserId,
        /// Indices scanned when interrupted
        fetched: u64,
    },

    /// A persisted task could not be resumed and was discarded
    TaskDropped {
        /// Task identifier
        task_id: TaskId,
        /// Owning user
        user_id: UserId,
        /// Why the record was discarded
        reason: String,
    },

    /// Webhook delivery failed
    WebhookFailed {
        /// Webhook URL
        url: String,
        /// Error message
        error: String,
    },

    /// Engine is shutting down
    Shutdown,
}
