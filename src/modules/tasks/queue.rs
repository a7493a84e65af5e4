use crate::modules::error::code::ErrorCode;
use crate::modules::inbound::task::{ProcessInboundTask, INBOUND_QUEUE};
use crate::modules::outbound::task::{SendMessageTask, OUTBOX_QUEUE};
use crate::modules::scheduler::context::TaskContext;
use crate::modules::scheduler::model::TaskStatus;
use crate::modules::scheduler::nativedb::meta::NativeDbTaskStore;
use crate::modules::scheduler::task::Task;
use crate::modules::settings::cli::SETTINGS;
use crate::{
    modules::{context::Initialize, database::manager::DB_MANAGER, error::MailroomResult},
    raise_error,
};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

static TASK_QUEUE: OnceLock<MailroomTaskQueue> = OnceLock::new();

impl Initialize for MailroomTaskQueue {
    async fn initialize() -> MailroomResult<()> {
        let scheduler = MailroomTaskQueue::new().await;
        let _ = TASK_QUEUE.set(scheduler);
        Ok(())
    }
}

pub struct MailroomTaskQueue {
    pub task_context: Arc<RwLock<TaskContext<NativeDbTaskStore>>>,
}

impl MailroomTaskQueue {
    pub fn get() -> MailroomResult<&'static MailroomTaskQueue> {
        TASK_QUEUE.get().ok_or_else(|| {
            raise_error!("TaskQueue not initialized".into(), ErrorCode::InternalError)
        })
    }

    pub async fn new() -> Self {
        let task_store = Arc::new(NativeDbTaskStore::init(DB_MANAGER.tasks_db().clone()));
        NativeDbTaskStore::restore(DB_MANAGER.tasks_db())
            .await
            .expect("Failed to restore tasks from the scheduler metadata database");
        let task_context = TaskContext::with_arc_store(task_store.clone())
            .register::<ProcessInboundTask>()
            .register::<SendMessageTask>()
            .set_concurrency(INBOUND_QUEUE, SETTINGS.mailroom_inbound_workers)
            .set_concurrency(OUTBOX_QUEUE, SETTINGS.mailroom_send_mail_workers)
            .start_with_cleaner()
            .await;
        MailroomTaskQueue {
            task_context: Arc::new(RwLock::new(task_context)),
        }
    }

    pub async fn submit_task<T>(&self, task: T, delay_seconds: Option<u32>) -> MailroomResult<()>
    where
        T: Task + Send + Sync + 'static,
    {
        let context = self.task_context.write().await;
        context
            .add_task(task, delay_seconds)
            .await
            .map_err(|message| raise_error!(message, ErrorCode::InternalError))
    }

    pub async fn stop_task(
        &self,
        task_id: u64,
        stop_reason: Option<String>,
    ) -> MailroomResult<()> {
        let context = self.task_context.write().await;
        context
            .stop_task(task_id, stop_reason)
            .await
            .map_err(|message| raise_error!(message, ErrorCode::InternalError))
    }

    pub async fn remove_task(&self, id: u64) -> MailroomResult<()> {
        NativeDbTaskStore::set_status(DB_MANAGER.tasks_db(), id, TaskStatus::Removed, None).await
    }
}
