//! Application state for the API server

use crate::{ChatForwarder, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The forwarding engine
    pub forwarder: Arc<ChatForwarder>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(forwarder: Arc<ChatForwarder>, config: Arc<Config>) -> Self {
        Self { forwarder, config }
    }
}
