
use crate::types::{ChatRef, ProgressSnapshot, TaskId, TaskStatus, UserId};

/// Snapshot of a running task over `skip..limit` with `fetched` scanned
pub(super) fn sample_snapshot(user: i64, skip: u64, fetched: u64, limit: u64) -> ProgressSnapshot {
    ProgressSnapshot {
        task_id: TaskId::new(UserId(user), 77),
        user_id: UserId(user),
        source: ChatRef::Id(-1001),
        destination: ChatRef::Username("mirror".into()),
        skip,
        limit,
        fetched,
        total: limit,
        dispatched: 0,
        duplicate: 0,
        filtered: 0,
        deleted: 0,
        started_at: Some(chrono::Utc::now()),
        status: TaskStatus::Running,
    }
}
