//! Deduplication of forwarded file content.
//!
//! Each task owns a [`DedupCache`]: an in-memory set of content signatures,
//! optionally seeded from and mirrored to a durable [`DedupStore`] scoped to
//! the user and destination, so later tasks into the same chat also skip
//! files that were already delivered.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::types::{ChatRef, ContentSignature, UserId};

/// Durable signature store, scoped to one user and destination.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Record a signature
    async fn add(&self, signature: &ContentSignature) -> Result<()>;

    /// Whether a signature is recorded
    async fn contains(&self, signature: &ContentSignature) -> Result<bool>;

    /// Every recorded signature
    async fn list_all(&self) -> Result<Vec<ContentSignature>>;

    /// Forget every signature in this scope
    async fn drop_all(&self) -> Result<()>;

    /// Release the connection
    async fn close(&self);
}

/// Scope name for a user's dedup records in one destination
pub fn dedup_scope(user_id: UserId, destination: &ChatRef) -> String {
    format!("user_{user_id}:dest_{destination}")
}

/// Task-local set of seen signatures
pub struct DedupCache {
    seen: HashSet<ContentSignature>,
    store: Option<Arc<dyn DedupStore>>,
}

impl DedupCache {
    /// Empty cache with no durable backing
    pub fn in_memory() -> Self {
        Self {
            seen: HashSet::new(),
            store: None,
        }
    }

    /// Cache seeded from a durable store
    ///
    /// A store that cannot be read leaves the cache empty but still attached,
    /// so new signatures keep being written.
    pub async fn load(store: Arc<dyn DedupStore>) -> Self {
        let seen = match store.list_all().await {
            Ok(signatures) => signatures.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load dedup signatures, starting empty");
                HashSet::new()
            }
        };
        Self {
            seen,
            store: Some(store),
        }
    }

    /// Whether the signature was seen before
    pub fn contains(&self, signature: &ContentSignature) -> bool {
        self.seen.contains(signature)
    }

    /// Add a signature; returns false if it was already present
    pub fn insert(&mut self, signature: ContentSignature) -> bool {
        self.seen.insert(signature)
    }

    /// Number of known signatures
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no signatures are known
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Mirror a newly accepted signature to the durable store, if any
    ///
    /// Write failures are logged and otherwise ignored: the in-memory cache
    /// already protects the current task.
    pub async fn persist(&self, signature: &ContentSignature) {
        if let Some(store) = &self.store
            && let Err(e) = store.add(signature).await
        {
            tracing::warn!(signature = %signature.as_str(), error = %e, "Failed to persist dedup signature");
        }
    }

    /// Close the durable store, if any
    pub async fn close(&self) {
        if let Some(store) = &self.store {
            store.close().await;
        }
    }
}
