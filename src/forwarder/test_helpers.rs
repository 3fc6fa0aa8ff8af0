//! Shared test helpers: a scriptable platform client and ChatForwarder factories.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{TempDir, tempdir};

use crate::config::{Config, PacingConfig};
use crate::error::PlatformError;
use crate::forwarder::ChatForwarder;
use crate::platform::{
    AccessMode, AccountKind, ClientProvider, InlineKeyboard, Media, MediaKind, Message,
    PlatformClient,
};
use crate::types::{ChatRef, ContentSignature, Event, TaskId, TaskStatus, UserId};

/// A successful `copy_message` call
#[derive(Clone, Debug)]
pub(crate) struct RecordedCopy {
    pub message_id: i64,
    pub caption: Option<String>,
    pub keyboard: Option<InlineKeyboard>,
    pub protect: bool,
}

/// In-memory platform client with scripted failures and a call log.
///
/// Every fetched id that was registered comes back as its message; any other id
/// is a missing slot. Errors pushed with `push_fetch_error` and
/// `push_dispatch_error` are returned once each, in order, by the next call.
pub(crate) struct MockPlatformClient {
    account: AccountKind,
    messages: Mutex<HashMap<i64, Message>>,
    fetch_errors: Mutex<VecDeque<PlatformError>>,
    dispatch_errors: Mutex<VecDeque<PlatformError>>,
    failing_copies: Mutex<HashSet<i64>>,
    denied: Mutex<Option<AccessMode>>,
    panic_at: Mutex<Option<i64>>,
    fetch_delay: Mutex<Duration>,
    fetch_calls: Mutex<Vec<Vec<i64>>>,
    forward_attempts: Mutex<Vec<Vec<i64>>>,
    forwarded: Mutex<Vec<Vec<i64>>>,
    copies: Mutex<Vec<RecordedCopy>>,
    next_sent_id: AtomicI64,
    stopped: AtomicBool,
}

impl MockPlatformClient {
    /// A bot-account client with no messages
    pub(crate) fn new() -> Self {
        Self {
            account: AccountKind::Bot,
            messages: Mutex::new(HashMap::new()),
            fetch_errors: Mutex::new(VecDeque::new()),
            dispatch_errors: Mutex::new(VecDeque::new()),
            failing_copies: Mutex::new(HashSet::new()),
            denied: Mutex::new(None),
            panic_at: Mutex::new(None),
            fetch_delay: Mutex::new(Duration::ZERO),
            fetch_calls: Mutex::new(Vec::new()),
            forward_attempts: Mutex::new(Vec::new()),
            forwarded: Mutex::new(Vec::new()),
            copies: Mutex::new(Vec::new()),
            next_sent_id: AtomicI64::new(1_000_000),
            stopped: AtomicBool::new(false),
        }
    }

    /// A client whose chat holds a plain text message at each given id
    pub(crate) fn with_text_messages(ids: impl IntoIterator<Item = i64>) -> Self {
        let client = Self::new();
        for id in ids {
            client.set_message(text_message(id));
        }
        client
    }

    /// Switch to a user-account session
    pub(crate) fn as_user_account(mut self) -> Self {
        self.account = AccountKind::User;
        self
    }

    /// Register or replace the message at `message.id`
    pub(crate) fn set_message(&self, message: Message) {
        self.messages.lock().unwrap().insert(message.id, message);
    }

    pub(crate) fn push_fetch_error(&self, error: PlatformError) {
        self.fetch_errors.lock().unwrap().push_back(error);
    }

    /// Fail the next forward or copy call with `error`
    pub(crate) fn push_dispatch_error(&self, error: PlatformError) {
        self.dispatch_errors.lock().unwrap().push_back(error);
    }

    /// Reject every copy of this message id
    pub(crate) fn fail_copy_of(&self, message_id: i64) {
        self.failing_copies.lock().unwrap().insert(message_id);
    }

    /// Make `verify_access` fail for this mode
    pub(crate) fn deny_access(&self, mode: AccessMode) {
        *self.denied.lock().unwrap() = Some(mode);
    }

    /// Panic when a fetch includes this id
    pub(crate) fn panic_when_fetching(&self, message_id: i64) {
        *self.panic_at.lock().unwrap() = Some(message_id);
    }

    /// Slow down every fetch call
    pub(crate) fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub(crate) fn fetch_calls(&self) -> Vec<Vec<i64>> {
        self.fetch_calls.lock().unwrap().clone()
    }

    /// Every forward call, including throttled and failed ones
    pub(crate) fn forward_attempts(&self) -> Vec<Vec<i64>> {
        self.forward_attempts.lock().unwrap().clone()
    }

    /// Forward calls that succeeded
    pub(crate) fn forwarded_batches(&self) -> Vec<Vec<i64>> {
        self.forwarded.lock().unwrap().clone()
    }

    /// Ids delivered by successful forwards and copies, in delivery order
    pub(crate) fn delivered_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.forwarded.lock().unwrap().concat();
        ids.extend(self.copies.lock().unwrap().iter().map(|c| c.message_id));
        ids
    }

    /// Copy calls that succeeded
    pub(crate) fn copies(&self) -> Vec<RecordedCopy> {
        self.copies.lock().unwrap().clone()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn take_dispatch_error(&self) -> Option<PlatformError> {
        self.dispatch_errors.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    fn account_kind(&self) -> AccountKind {
        self.account
    }

    async fn fetch_messages(
        &self,
        _chat: &ChatRef,
        ids: &[i64],
    ) -> Result<Vec<Option<Message>>, PlatformError> {
        self.fetch_calls.lock().unwrap().push(ids.to_vec());

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.fetch_errors.lock().unwrap().pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        let panic_at = *self.panic_at.lock().unwrap();
        if let Some(id) = panic_at
            && ids.contains(&id)
        {
            panic!("platform client crashed fetching message {id}");
        }

        let messages = self.messages.lock().unwrap();
        Ok(ids.iter().map(|id| messages.get(id).cloned()).collect())
    }

    async fn copy_message(
        &self,
        _destination: &ChatRef,
        _source: &ChatRef,
        message_id: i64,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboard>,
        protect: bool,
    ) -> Result<(), PlatformError> {
        if let Some(error) = self.take_dispatch_error() {
            return Err(error);
        }
        if self.failing_copies.lock().unwrap().contains(&message_id) {
            return Err(PlatformError::Other(format!(
                "message {message_id} can't be copied"
            )));
        }
        self.copies.lock().unwrap().push(RecordedCopy {
            message_id,
            caption: caption.map(str::to_string),
            keyboard: keyboard.cloned(),
            protect,
        });
        Ok(())
    }

    async fn forward_messages(
        &self,
        _destination: &ChatRef,
        _source: &ChatRef,
        message_ids: &[i64],
        _protect: bool,
    ) -> Result<(), PlatformError> {
        self.forward_attempts
            .lock()
            .unwrap()
            .push(message_ids.to_vec());
        if let Some(error) = self.take_dispatch_error() {
            return Err(error);
        }
        self.forwarded.lock().unwrap().push(message_ids.to_vec());
        Ok(())
    }

    async fn send_message(&self, _chat: &ChatRef, text: &str) -> Result<Message, PlatformError> {
        Ok(Message {
            id: self.next_sent_id.fetch_add(1, Ordering::SeqCst),
            text: Some(text.to_string()),
            ..Default::default()
        })
    }

    async fn verify_access(&self, chat: &ChatRef, mode: AccessMode) -> Result<(), PlatformError> {
        if *self.denied.lock().unwrap() == Some(mode) {
            return Err(PlatformError::Forbidden(format!("no access to {chat}")));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), PlatformError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out mock clients, one per user when registered, otherwise a shared default
pub(crate) struct MockClientProvider {
    default: Arc<MockPlatformClient>,
    per_user: Mutex<HashMap<UserId, Arc<MockPlatformClient>>>,
    unavailable: AtomicBool,
    requests: AtomicUsize,
}

impl MockClientProvider {
    pub(crate) fn new(default: Arc<MockPlatformClient>) -> Self {
        Self {
            default,
            per_user: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    pub(crate) fn insert(&self, user_id: UserId, client: Arc<MockPlatformClient>) {
        self.per_user.lock().unwrap().insert(user_id, client);
    }

    /// Make every `client_for` call fail
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientProvider for MockClientProvider {
    async fn client_for(&self, user_id: UserId) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PlatformError::Other(format!(
                "no forwarding account configured for user {user_id}"
            )));
        }
        let client = self
            .per_user
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default));
        Ok(client)
    }
}

/// Plain text message at `id`
pub(crate) fn text_message(id: i64) -> Message {
    Message {
        id,
        text: Some(format!("message {id}")),
        ..Default::default()
    }
}

/// Document message with a file name, content signature and size
pub(crate) fn document_message(id: i64, file_name: &str, signature: &str, size: u64) -> Message {
    Message {
        id,
        caption: Some(format!("file {id}")),
        media: Some(Media {
            kind: MediaKind::Document,
            signature: ContentSignature::from(signature),
            file_name: Some(file_name.to_string()),
            file_size: size,
        }),
        ..Default::default()
    }
}

/// Config tuned for tests: database in `dir`, no pacing, fast reporting
pub(crate) fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.path().join("test.db");
    config.pacing = PacingConfig::none();
    config.engine.progress_interval = Duration::from_millis(50);
    config.engine.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Helper to create a test ChatForwarder with a persistent database.
/// Returns the forwarder and the tempdir (which must be kept alive).
pub(crate) async fn create_test_forwarder(
    provider: Arc<MockClientProvider>,
) -> (ChatForwarder, TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(&temp_dir);
    let forwarder = ChatForwarder::new(config, provider).await.unwrap();
    (forwarder, temp_dir)
}

/// Receive events until one matches, failing the test after `timeout`
pub(crate) async fn wait_for_event<F>(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait for the terminal event of a task and return it
pub(crate) async fn wait_for_finish(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    task_id: &TaskId,
) -> Event {
    wait_for_event(rx, Duration::from_secs(10), |event| match event {
        Event::TaskCompleted { task_id: id, .. }
        | Event::TaskCancelled { task_id: id, .. }
        | Event::TaskFailed { task_id: id, .. }
        | Event::TaskInterrupted { task_id: id, .. } => id == task_id,
        _ => false,
    })
    .await
}

/// Poll until a history row with the given status exists for `task_id`
pub(crate) async fn wait_for_history(
    forwarder: &ChatForwarder,
    task_id: &TaskId,
    status: TaskStatus,
) -> crate::types::HistoryEntry {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let entries = forwarder.history(100, 0).await.unwrap();
            if let Some(entry) = entries
                .into_iter()
                .find(|e| &e.task_id == task_id && e.status == status)
            {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for history entry")
}
