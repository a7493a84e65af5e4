use std::sync::Arc;

use native_db::Builder;
use serde::{Deserialize, Serialize};

use crate::modules::scheduler::{
    model::TaskStatus,
    nativedb::{meta::NativeDbTaskStore, TASK_MODELS},
    store::TaskStore,
};

use super::task::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoopTask;

impl Task for NoopTask {
    const TASK_KEY: &'static str = "noop_task_key";
    const TASK_QUEUE: &'static str = "noop_queue";

    fn delay_seconds(&self) -> u32 {
        0
    }

    fn run(self, _task_id: u64) -> super::task::TaskFuture {
        Box::pin(async move { Ok(()) })
    }
}

fn memory_store() -> NativeDbTaskStore {
    let db = Builder::new().create_in_memory(&TASK_MODELS).unwrap();
    NativeDbTaskStore::init(Arc::new(db))
}

#[tokio::test]
async fn test_fetch_pending_marks_running() {
    let store = Arc::new(memory_store());
    let mut meta = NoopTask.new_meta();
    meta.next_run = 0;
    store.store_task(meta.clone()).await.unwrap();

    let fetched = store.fetch_pending_tasks().await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, meta.id);

    // A second fetch must not hand the same task out again.
    let fetched = store.fetch_pending_tasks().await.unwrap();
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn test_failed_task_is_rescheduled_until_max_retries() {
    let store = Arc::new(memory_store());
    let mut meta = NoopTask.new_meta();
    meta.next_run = 0;
    store.store_task(meta.clone()).await.unwrap();
    let fetched = store.fetch_pending_tasks().await.unwrap();
    assert_eq!(fetched.len(), 1);

    store
        .update_task_execution_status(
            meta.id,
            false,
            Some("boom".into()),
            Some(12),
            Some(1),
            Some(0),
        )
        .await
        .unwrap();
    let restored = NativeDbTaskStore::get(&store.store, meta.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.status, TaskStatus::Scheduled);
    assert_eq!(restored.last_error.as_deref(), Some("boom"));

    // No next_run means retries are exhausted and the task stays failed.
    store
        .update_task_execution_status(meta.id, false, Some("boom".into()), Some(12), Some(3), None)
        .await
        .unwrap();
    let restored = NativeDbTaskStore::get(&store.store, meta.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_restore_reschedules_running_tasks() {
    let store = memory_store();
    let mut meta = NoopTask.new_meta();
    meta.next_run = 0;
    NativeDbTaskStore::store_one(&store.store, meta.clone())
        .await
        .unwrap();
    let _ = NativeDbTaskStore::fetch_pending_tasks(&store.store)
        .await
        .unwrap();

    NativeDbTaskStore::restore(&store.store).await.unwrap();
    let restored = NativeDbTaskStore::get(&store.store, meta.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.status, TaskStatus::Scheduled);
}
