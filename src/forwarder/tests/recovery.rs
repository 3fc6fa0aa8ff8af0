use super::*;
use crate::db::Database;
use crate::types::ProgressSnapshot;

fn persisted_snapshot(user: i64, skip: u64, fetched: u64, limit: u64) -> ProgressSnapshot {
    ProgressSnapshot {
        task_id: TaskId::new(UserId(user), 5),
        user_id: UserId(user),
        source: ChatRef::Id(-100),
        destination: ChatRef::Id(-200),
        skip,
        limit,
        fetched,
        total: limit,
        dispatched: fetched - skip,
        duplicate: 0,
        filtered: 0,
        deleted: 0,
        started_at: Some(chrono::Utc::now()),
        status: TaskStatus::Running,
    }
}

/// Write an active record into the database a forwarder will open next
async fn seed_active_task(config: &Config, snapshot: &ProgressSnapshot, task_config: &TaskConfig) {
    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();
    db.insert_active_task(snapshot, task_config).await.unwrap();
    db.close().await;
}

async fn wait_until_record_gone(forwarder: &ChatForwarder, task_id: &TaskId) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while forwarder.db.get_active_task(task_id).await.unwrap().is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("active record was not removed");
}

#[tokio::test]
async fn test_resumes_from_last_snapshot() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let snapshot = persisted_snapshot(21, 500, 520, 1000);
    seed_active_task(&config, &snapshot, &batch_mode()).await;

    let client = Arc::new(MockPlatformClient::with_text_messages(0..1000));
    let provider = Arc::new(MockClientProvider::new(Arc::clone(&client)));
    let forwarder = ChatForwarder::new(config, provider).await.unwrap();

    let entry = wait_for_history(&forwarder, &snapshot.task_id, TaskStatus::Completed).await;
    assert_eq!(entry.fetched, 1000);
    assert_eq!(entry.dispatched, 500);

    let calls = client.fetch_calls();
    assert_eq!(calls[0].first(), Some(&520));
    assert!(calls.iter().flatten().all(|id| *id >= 520));
    assert_eq!(client.delivered_ids(), (520..1000).collect::<Vec<_>>());
    assert!(forwarder.db.get_active_task(&snapshot.task_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resumed_task_holds_user_lock() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let snapshot = persisted_snapshot(22, 0, 100, 1000);
    seed_active_task(&config, &snapshot, &batch_mode()).await;

    let client = Arc::new(MockPlatformClient::with_text_messages(0..1000));
    client.set_fetch_delay(Duration::from_millis(100));
    let provider = Arc::new(MockClientProvider::new(client));
    let forwarder = ChatForwarder::new(config, provider).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while forwarder.get_status(UserId(22)).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let mut fresh = request(22, 0, 10, batch_mode());
    fresh.destination = ChatRef::Id(-999);
    let err = forwarder.start_task(fresh).await.unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::UserBusy { .. })));

    forwarder.cancel_task(UserId(22));
    wait_for_history(&forwarder, &snapshot.task_id, TaskStatus::Cancelled).await;
}

#[tokio::test]
async fn test_unreadable_record_is_dropped() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let snapshot = persisted_snapshot(23, 0, 10, 100);
    seed_active_task(&config, &snapshot, &TaskConfig::default()).await;

    let db = Database::new(&config.persistence.database_path)
        .await
        .unwrap();
    sqlx::query("UPDATE active_tasks SET config_json = 'not json' WHERE task_id = ?")
        .bind(&snapshot.task_id)
        .execute(db.pool())
        .await
        .unwrap();
    db.close().await;

    let provider = Arc::new(MockClientProvider::new(Arc::new(MockPlatformClient::new())));
    let forwarder = ChatForwarder::new(config, Arc::clone(&provider) as Arc<dyn ClientProvider>)
        .await
        .unwrap();

    wait_until_record_gone(&forwarder, &snapshot.task_id).await;
    assert_eq!(provider.requests(), 0);
    assert_eq!(forwarder.history_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_record_with_invalid_filters_is_dropped() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let snapshot = persisted_snapshot(24, 0, 10, 100);
    let broken = TaskConfig {
        extensions: vec!["mp4".into()],
        min_size_mb: -1.0,
        ..Default::default()
    };
    seed_active_task(&config, &snapshot, &broken).await;

    let provider = Arc::new(MockClientProvider::new(Arc::new(MockPlatformClient::new())));
    let forwarder = ChatForwarder::new(config, Arc::clone(&provider) as Arc<dyn ClientProvider>)
        .await
        .unwrap();

    wait_until_record_gone(&forwarder, &snapshot.task_id).await;
    assert_eq!(provider.requests(), 0);
    assert!(forwarder.get_status(UserId(24)).is_none());
}

#[tokio::test]
async fn test_record_is_kept_when_client_unavailable() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let snapshot = persisted_snapshot(25, 0, 40, 100);
    seed_active_task(&config, &snapshot, &batch_mode()).await;

    let provider = Arc::new(MockClientProvider::new(Arc::new(MockPlatformClient::new())));
    provider.set_unavailable(true);
    let forwarder = ChatForwarder::new(config, Arc::clone(&provider) as Arc<dyn ClientProvider>)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.requests() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let row = forwarder.db.get_active_task(&snapshot.task_id).await.unwrap();
    assert_eq!(row.unwrap().fetched, 40);
    assert!(forwarder.get_status(UserId(25)).is_none());
    assert_eq!(forwarder.history_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_recovery_disabled_leaves_records_alone() {
    let dir = tempdir().unwrap();
    let mut config = test_config(&dir);
    config.recovery.resume_on_startup = false;
    let snapshot = persisted_snapshot(26, 0, 10, 100);
    seed_active_task(&config, &snapshot, &batch_mode()).await;

    let provider = Arc::new(MockClientProvider::new(Arc::new(MockPlatformClient::new())));
    let forwarder = ChatForwarder::new(config, Arc::clone(&provider) as Arc<dyn ClientProvider>)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.requests(), 0);
    assert!(forwarder.db.get_active_task(&snapshot.task_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_interrupted_task_resumes_after_restart() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);

    let first_client = Arc::new(MockPlatformClient::with_text_messages(0..600));
    first_client.set_fetch_delay(Duration::from_millis(30));
    let provider = Arc::new(MockClientProvider::new(Arc::clone(&first_client)));
    let forwarder = ChatForwarder::new(config.clone(), provider).await.unwrap();
    let mut events = forwarder.subscribe();

    let task_id = forwarder
        .start_task(request(27, 0, 600, TaskConfig::default()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    forwarder.shutdown().await.unwrap();
    assert!(matches!(
        wait_for_finish(&mut events, &task_id).await,
        Event::TaskInterrupted { .. }
    ));

    let saved = forwarder
        .db
        .get_active_task(&task_id)
        .await
        .unwrap()
        .expect("interrupted task keeps its record");
    let resume_at = saved.fetched;
    assert!(resume_at > 0 && resume_at < 600);
    drop(forwarder);

    let second_client = Arc::new(MockPlatformClient::with_text_messages(0..600));
    let provider = Arc::new(MockClientProvider::new(Arc::clone(&second_client)));
    let restarted = ChatForwarder::new(config, provider).await.unwrap();

    let entry = wait_for_history(&restarted, &task_id, TaskStatus::Completed).await;
    assert_eq!(entry.fetched, 600);
    assert_eq!(second_client.fetch_calls()[0].first(), Some(&resume_at));

    let mut delivered = first_client.delivered_ids();
    delivered.extend(second_client.delivered_ids());
    assert_eq!(delivered, (0..600).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_start_is_rejected_while_recovered_task_spins_up() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let snapshot = persisted_snapshot(41, 0, 100, 1000);
    seed_active_task(&config, &snapshot, &batch_mode()).await;

    let client = Arc::new(MockPlatformClient::with_text_messages(0..1000));
    client.set_fetch_delay(Duration::from_millis(100));
    let provider = Arc::new(MockClientProvider::new(client));
    let forwarder = ChatForwarder::new(config, provider).await.unwrap();

    // recovered claims are in place as soon as construction returns
    let mut same_user = request(41, 0, 10, batch_mode());
    same_user.destination = ChatRef::Id(-999);
    let err = forwarder.start_task(same_user).await.unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::UserBusy { user_id: 41 })));

    let err = forwarder
        .start_task(request(77, 0, 10, batch_mode()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::DestinationBusy { .. })));

    assert_eq!(forwarder.registry.task_of(UserId(41)), Some(snapshot.task_id.clone()));
    assert!(forwarder.registry.task_of(UserId(77)).is_none());

    forwarder.cancel_task(UserId(41));
    wait_for_history(&forwarder, &snapshot.task_id, TaskStatus::Cancelled).await;
    assert_eq!(forwarder.history_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_kept_record_blocks_new_tasks_until_resumed() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);
    let snapshot = persisted_snapshot(40, 0, 40, 100);
    seed_active_task(&config, &snapshot, &batch_mode()).await;

    let provider = Arc::new(MockClientProvider::new(Arc::new(MockPlatformClient::new())));
    provider.set_unavailable(true);
    let forwarder =
        ChatForwarder::new(config.clone(), Arc::clone(&provider) as Arc<dyn ClientProvider>)
            .await
            .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.requests() == 0 || !forwarder.registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    provider.set_unavailable(false);
    let mut same_user = request(40, 0, 10, batch_mode());
    same_user.destination = ChatRef::Id(-999);
    let err = forwarder.start_task(same_user).await.unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::UserBusy { user_id: 40 })));

    let err = forwarder
        .start_task(request(50, 0, 10, batch_mode()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Task(TaskError::DestinationBusy { .. })));
    forwarder.shutdown().await.unwrap();
    drop(forwarder);

    let client = Arc::new(MockPlatformClient::with_text_messages(0..100));
    let provider = Arc::new(MockClientProvider::new(Arc::clone(&client)));
    let restarted = ChatForwarder::new(config, provider).await.unwrap();

    let entry = wait_for_history(&restarted, &snapshot.task_id, TaskStatus::Completed).await;
    assert_eq!(entry.fetched, 100);
    assert_eq!(restarted.history_count().await.unwrap(), 1);
    assert!(restarted.db.load_active_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_conflicting_records_resume_only_the_oldest() {
    let dir = tempdir().unwrap();
    let config = test_config(&dir);

    let first = persisted_snapshot(42, 0, 10, 100);
    let mut same_user = persisted_snapshot(42, 0, 10, 100);
    same_user.task_id = TaskId::new(UserId(42), 6);
    same_user.destination = ChatRef::Id(-300);
    let mut same_destination = persisted_snapshot(43, 0, 10, 100);
    same_destination.task_id = TaskId::new(UserId(43), 6);
    for snapshot in [&first, &same_user, &same_destination] {
        seed_active_task(&config, snapshot, &batch_mode()).await;
    }

    let client = Arc::new(MockPlatformClient::with_text_messages(0..100));
    let provider = Arc::new(MockClientProvider::new(Arc::clone(&client)));
    let forwarder = ChatForwarder::new(config, provider).await.unwrap();

    // losers are discarded before construction returns
    for dropped in [&same_user.task_id, &same_destination.task_id] {
        assert!(forwarder.db.get_active_task(dropped).await.unwrap().is_none());
    }
    assert!(forwarder.registry.task_of(UserId(43)).is_none());

    let entry = wait_for_history(&forwarder, &first.task_id, TaskStatus::Completed).await;
    assert_eq!(entry.fetched, 100);
    assert_eq!(forwarder.history_count().await.unwrap(), 1);
    assert_eq!(client.delivered_ids(), (10..100).collect::<Vec<_>>());
}
