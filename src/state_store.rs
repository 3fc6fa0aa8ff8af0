//! In-memory progress records of running tasks.
//!
//! [`TaskStateStore`] is the authoritative source of counters while a task
//! runs; the database only holds a periodic mirror. Counters are atomics, so
//! the task loop, the status reporter and status queries never block each
//! other beyond a short map lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::types::{ChatRef, Counter, ProgressSnapshot, TaskId, TaskStatus, UserId};

/// Live progress record of one task
#[derive(Debug)]
pub struct TaskState {
    /// Task identifier
    pub task_id: TaskId,
    /// Owning user
    pub user_id: UserId,
    /// Chat being read
    pub source: ChatRef,
    /// Chat being written
    pub destination: ChatRef,
    /// First index of the range
    pub skip: u64,
    /// Exclusive upper bound of the range
    pub limit: u64,
    fetched: AtomicU64,
    dispatched: AtomicU64,
    duplicate: AtomicU64,
    filtered: AtomicU64,
    deleted: AtomicU64,
    status: AtomicI32,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl TaskState {
    /// Fresh state; `fetched` starts at `skip`
    pub fn new(
        task_id: TaskId,
        user_id: UserId,
        source: ChatRef,
        destination: ChatRef,
        skip: u64,
        limit: u64,
    ) -> Self {
        Self {
            task_id,
            user_id,
            source,
            destination,
            skip,
            limit,
            fetched: AtomicU64::new(skip.min(limit)),
            dispatched: AtomicU64::new(0),
            duplicate: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            status: AtomicI32::new(TaskStatus::Starting.to_i32()),
            started_at: Mutex::new(None),
        }
    }

    /// State restored exactly from a persisted snapshot
    pub fn from_snapshot(snapshot: &ProgressSnapshot) -> Self {
        Self {
            task_id: snapshot.task_id.clone(),
            user_id: snapshot.user_id,
            source: snapshot.source.clone(),
            destination: snapshot.destination.clone(),
            skip: snapshot.skip,
            limit: snapshot.limit,
            fetched: AtomicU64::new(snapshot.fetched.min(snapshot.limit)),
            dispatched: AtomicU64::new(snapshot.dispatched),
            duplicate: AtomicU64::new(snapshot.duplicate),
            filtered: AtomicU64::new(snapshot.filtered),
            deleted: AtomicU64::new(snapshot.deleted),
            status: AtomicI32::new(snapshot.status.to_i32()),
            started_at: Mutex::new(snapshot.started_at),
        }
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Fetched => &self.fetched,
            Counter::Dispatched => &self.dispatched,
            Counter::Duplicate => &self.duplicate,
            Counter::Filtered => &self.filtered,
            Counter::Deleted => &self.deleted,
        }
    }

    /// Add to a counter; `fetched` saturates at `limit`
    pub fn increment(&self, counter: Counter, delta: u64) {
        if counter == Counter::Fetched {
            let limit = self.limit;
            let _ = self
                .fetched
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                    Some(v.saturating_add(delta).min(limit))
                });
        } else {
            self.counter(counter).fetch_add(delta, Ordering::AcqRel);
        }
    }

    /// Current value of a counter
    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Acquire)
    }

    /// Current status
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_i32(self.status.load(Ordering::Acquire))
    }

    /// Move to a new status
    pub fn set_status(&self, status: TaskStatus) {
        self.status.store(status.to_i32(), Ordering::Release);
    }

    /// Record the start time unless one is already set
    pub fn set_start(&self, at: DateTime<Utc>) {
        let mut started = self.started_at.lock().unwrap_or_else(PoisonError::into_inner);
        if started.is_none() {
            *started = Some(at);
        }
    }

    /// When the task entered Running
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point-in-time copy of every field
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            task_id: self.task_id.clone(),
            user_id: self.user_id,
            source: self.source.clone(),
            destination: self.destination.clone(),
            skip: self.skip,
            limit: self.limit,
            fetched: self.get(Counter::Fetched),
            total: self.limit,
            dispatched: self.get(Counter::Dispatched),
            duplicate: self.get(Counter::Duplicate),
            filtered: self.get(Counter::Filtered),
            deleted: self.get(Counter::Deleted),
            started_at: self.started_at(),
            status: self.status(),
        }
    }
}

/// Registry of live task states, keyed by task id
#[derive(Debug, Default)]
pub struct TaskStateStore {
    tasks: RwLock<HashMap<TaskId, Arc<TaskState>>>,
}

impl TaskStateStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state, replacing any previous entry with the same id
    pub fn create(&self, state: TaskState) -> Arc<TaskState> {
        let state = Arc::new(state);
        self.write()
            .insert(state.task_id.clone(), Arc::clone(&state));
        state
    }

    /// Register a state rebuilt from a persisted snapshot
    pub fn restore(&self, snapshot: &ProgressSnapshot) -> Arc<TaskState> {
        self.create(TaskState::from_snapshot(snapshot))
    }

    /// Look up a task
    pub fn get(&self, task_id: &TaskId) -> Option<Arc<TaskState>> {
        self.read().get(task_id).cloned()
    }

    /// Add to a counter; unknown ids are ignored
    pub fn increment(&self, task_id: &TaskId, counter: Counter, delta: u64) {
        if let Some(state) = self.get(task_id) {
            state.increment(counter, delta);
        }
    }

    /// Record the start time; unknown ids are ignored
    pub fn set_start(&self, task_id: &TaskId, at: DateTime<Utc>) {
        if let Some(state) = self.get(task_id) {
            state.set_start(at);
        }
    }

    /// Change status; unknown ids are ignored
    pub fn set_status(&self, task_id: &TaskId, status: TaskStatus) {
        if let Some(state) = self.get(task_id) {
            state.set_status(status);
        }
    }

    /// Snapshot of a task, if it is still registered
    pub fn snapshot(&self, task_id: &TaskId) -> Option<ProgressSnapshot> {
        self.get(task_id).map(|state| state.snapshot())
    }

    /// Snapshots of every registered task
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.read().values().map(|state| state.snapshot()).collect()
    }

    /// Drop a task, returning its final state
    pub fn remove(&self, task_id: &TaskId) -> Option<Arc<TaskState>> {
        self.write().remove(task_id)
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no task is registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TaskId, Arc<TaskState>>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, Arc<TaskState>>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }
}
