use crate::modules::scheduler::cleaner::TaskCleaner;
use crate::modules::scheduler::flow::TaskFlow;
use crate::modules::scheduler::handlers::TaskHandlers;
use crate::modules::scheduler::store::TaskStore;
use crate::modules::scheduler::task::Task;
use crate::modules::scheduler::updater::TaskStatusUpdater;
use crate::utc_now;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct TaskContext<S>
where
    S: TaskStore + Send + Sync + Clone + 'static,
{
    queue_concurrency: DashMap<String, usize>,
    handlers: TaskHandlers,
    store: Arc<S>,
}

impl<S> TaskContext<S>
where
    S: TaskStore + Send + Sync + Clone + 'static,
{
    pub fn with_arc_store(store: Arc<S>) -> Self {
        Self {
            queue_concurrency: DashMap::new(),
            handlers: TaskHandlers::new(),
            store,
        }
    }

    /// Registers a new task type in the context.
    pub fn register<T>(mut self) -> Self
    where
        T: Task,
    {
        self.handlers.register::<T>();
        self.queue_concurrency.insert(T::TASK_QUEUE.to_owned(), 4);
        self
    }

    /// Sets the concurrency level for a specified queue.
    pub fn set_concurrency(self, queue: &str, count: usize) -> Self {
        self.queue_concurrency.insert(queue.to_owned(), count);
        self
    }

    fn start_task_cleaner(&self) {
        let cleaner = TaskCleaner::new(self.store.clone());
        cleaner.start(Duration::from_secs(60 * 10));
    }

    async fn start_flow(&self) {
        let status_updater = Arc::new(TaskStatusUpdater::new(
            self.store.clone(),
            self.queue_concurrency.len(),
        ));

        let flow = Arc::new(TaskFlow::new(
            self.store.clone(),
            &self.queue_concurrency,
            Arc::new(self.handlers.clone()),
            status_updater,
        ));

        flow.start().await;
    }

    /// Runs the task context, enabling workers and the task cleaner.
    pub async fn start_with_cleaner(self) -> Self {
        self.start_flow().await;
        self.start_task_cleaner();
        self
    }

    /// Adds a new task to the context for execution.
    pub async fn add_task<T>(&self, task: T, delay_seconds: Option<u32>) -> Result<(), String>
    where
        T: Task + Send + Sync + 'static,
    {
        let mut task_meta = task.new_meta();
        let delay_seconds = delay_seconds.unwrap_or(task_meta.delay_seconds) * 1000;
        let next_run = utc_now!() + delay_seconds as i64;
        task_meta.next_run = next_run;
        self.store
            .store_task(task_meta)
            .await
            .map_err(|e| format!("{:#?}", e))
    }

    /// Stops a scheduled or running task.
    pub async fn stop_task(&self, task_id: u64, stop_reason: Option<String>) -> Result<(), String> {
        self.store
            .set_task_stopped(task_id, stop_reason)
            .await
            .map_err(|e| format!("{:#?}", e))
    }
}
