//! Forward task context -- the resources a running task owns.

use std::sync::Arc;

use crate::dedup::{DedupCache, DedupStore, dedup_scope};
use crate::db::SqliteDedupStore;
use crate::filter::FilterPipeline;
use crate::platform::PlatformClient;
use crate::state_store::TaskState;
use crate::types::{ChatRef, TaskConfig, UserId};

use super::super::ChatForwarder;
use super::super::registry::TaskClaim;

/// Shared context for a single forward task, reducing parameter passing between phases.
pub(crate) struct ForwardTaskContext {
    pub(crate) forwarder: ChatForwarder,
    pub(crate) state: Arc<TaskState>,
    pub(crate) config: TaskConfig,
    pub(crate) filters: FilterPipeline,
    pub(crate) client: Arc<dyn PlatformClient>,
    pub(crate) dedup: DedupCache,
    /// Released when the context is consumed by finalization
    pub(crate) claim: TaskClaim,
}

/// Build the dedup cache for a task
///
/// With duplicate skipping on and a store URL configured, the cache is seeded
/// from the durable store scoped to the user and destination. A store that
/// cannot be opened degrades to a task-local cache.
pub(crate) async fn open_dedup_cache(
    user_id: UserId,
    destination: &ChatRef,
    config: &TaskConfig,
) -> DedupCache {
    if !config.skip_duplicates {
        return DedupCache::in_memory();
    }
    let Some(url) = config.dedup_store_url.as_deref() else {
        return DedupCache::in_memory();
    };

    let scope = dedup_scope(user_id, destination);
    match SqliteDedupStore::connect(url, scope.clone()).await {
        Ok(store) => {
            let cache = DedupCache::load(Arc::new(store) as Arc<dyn DedupStore>).await;
            tracing::info!(
                user_id = user_id.get(),
                scope = %scope,
                known = cache.len(),
                "Loaded durable dedup signatures"
            );
            cache
        }
        Err(e) => {
            tracing::warn!(
                user_id = user_id.get(),
                scope = %scope,
                error = %e,
                "Dedup store unavailable, using task-local cache"
            );
            DedupCache::in_memory()
        }
    }
}
