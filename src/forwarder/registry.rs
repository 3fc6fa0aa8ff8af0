//! Per-user locks and per-destination claims.
//!
//! Both maps live behind one mutex so a start request checks and reserves the
//! user and the destination in a single step. The mutex is never held across
//! an await. A successful claim returns a [`TaskClaim`] guard; dropping the
//! guard releases both entries, whichever way the task ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::types::{ChatRef, TaskId, UserId};

struct ActiveEntry {
    task_id: TaskId,
    cancel_token: CancellationToken,
    user_cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct RegistryInner {
    users: HashMap<UserId, ActiveEntry>,
    destinations: HashMap<ChatRef, TaskId>,
}

/// Registry of running tasks
#[derive(Default)]
pub(crate) struct TaskRegistry {
    inner: Mutex<RegistryInner>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the user and the destination for a task
    ///
    /// Used for new and resumed tasks alike; a held reservation is never
    /// replaced.
    pub(crate) fn try_claim(
        self: &Arc<Self>,
        user_id: UserId,
        task_id: TaskId,
        destination: ChatRef,
        cancel_token: CancellationToken,
    ) -> std::result::Result<TaskClaim, TaskError> {
        let mut inner = self.lock();
        if inner.users.contains_key(&user_id) {
            return Err(TaskError::UserBusy {
                user_id: user_id.get(),
            });
        }
        if inner.destinations.contains_key(&destination) {
            return Err(TaskError::DestinationBusy {
                destination: destination.to_string(),
            });
        }
        Ok(self.insert(&mut inner, user_id, task_id, destination, cancel_token))
    }

    fn insert(
        self: &Arc<Self>,
        inner: &mut RegistryInner,
        user_id: UserId,
        task_id: TaskId,
        destination: ChatRef,
        cancel_token: CancellationToken,
    ) -> TaskClaim {
        let user_cancelled = Arc::new(AtomicBool::new(false));
        inner.users.insert(
            user_id,
            ActiveEntry {
                task_id: task_id.clone(),
                cancel_token: cancel_token.clone(),
                user_cancelled: Arc::clone(&user_cancelled),
            },
        );
        inner
            .destinations
            .insert(destination.clone(), task_id.clone());

        TaskClaim {
            registry: Arc::clone(self),
            user_id,
            task_id,
            destination,
            cancel_token,
            user_cancelled,
        }
    }

    /// Request cooperative cancellation of the user's task
    pub(crate) fn cancel(&self, user_id: UserId) -> Option<TaskId> {
        let inner = self.lock();
        let entry = inner.users.get(&user_id)?;
        entry.user_cancelled.store(true, Ordering::SeqCst);
        entry.cancel_token.cancel();
        Some(entry.task_id.clone())
    }

    /// Task currently holding the user's lock
    pub(crate) fn task_of(&self, user_id: UserId) -> Option<TaskId> {
        self.lock().users.get(&user_id).map(|e| e.task_id.clone())
    }

    /// Whether any destination claim is held for `destination`
    pub(crate) fn is_claimed(&self, destination: &ChatRef) -> bool {
        self.lock().destinations.contains_key(destination)
    }

    /// Number of held user locks
    pub(crate) fn len(&self) -> usize {
        self.lock().users.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().users.is_empty()
    }

    fn release(&self, user_id: UserId, task_id: &TaskId, destination: &ChatRef) {
        let mut inner = self.lock();
        if inner
            .users
            .get(&user_id)
            .is_some_and(|e| &e.task_id == task_id)
        {
            inner.users.remove(&user_id);
        }
        if inner.destinations.get(destination) == Some(task_id) {
            inner.destinations.remove(destination);
        }
    }
}

/// Held user lock and destination claim of one task
pub(crate) struct TaskClaim {
    registry: Arc<TaskRegistry>,
    user_id: UserId,
    task_id: TaskId,
    destination: ChatRef,
    cancel_token: CancellationToken,
    user_cancelled: Arc<AtomicBool>,
}

impl TaskClaim {
    /// Token that stops this task
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Whether the stop came from the user rather than shutdown
    pub(crate) fn user_cancelled(&self) -> bool {
        self.user_cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl Drop for TaskClaim {
    fn drop(&mut self) {
        self.registry
            .release(self.user_id, &self.task_id, &self.destination);
        tracing::debug!(
            user_id = self.user_id.get(),
            task_id = %self.task_id,
            destination = %self.destination,
            "Released task claim"
        );
    }
}
