use super::test_helpers::*;
use super::*;
use crate::error::{Error, TaskError};
use crate::platform::{AccessMode, Message};
use crate::types::{
    ChatRef, ContentKind, ForwardMode, StartTaskRequest, TaskConfig, TaskId, TaskStatus, UserId,
};
use std::time::Duration;
use tempfile::tempdir;

mod recovery;

/// Request covering `skip..limit` of chat -100 into chat -200
fn request(user: i64, skip: u64, limit: u64, config: TaskConfig) -> StartTaskRequest {
    StartTaskRequest {
        user_id: UserId(user),
        source: ChatRef::Id(-100),
        destination: ChatRef::Id(-200),
        skip,
        limit,
        nonce: Some(1),
        config,
    }
}

fn batch_mode() -> TaskConfig {
    TaskConfig {
        forward_mode: ForwardMode::TagPreserving,
        ..Default::default()
    }
}

/// Forwarder over a single shared mock client
async fn forwarder_with(
    client: Arc<MockPlatformClient>,
) -> (ChatForwarder, Arc<MockClientProvider>, tempfile::TempDir) {
    let provider = Arc::new(MockClientProvider::new(client));
    let (forwarder, dir) = create_test_forwarder(Arc::clone(&provider)).await;
    (forwarder, provider, dir)
}
