// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use itertools::Itertools;
use native_db::Database;

use crate::{
    modules::{
        database::{
            batch_delete_impl, batch_insert_impl, batch_update_impl, filter_by_secondary_key_impl,
            insert_impl, secondary_find_impl, update_impl,
        },
        error::{code::ErrorCode, MailroomResult},
        scheduler::{
            model::{TaskMeta, TaskStatus},
            nativedb::{TaskMetaEntity, TaskMetaEntityKey},
            store::TaskStore,
        },
        settings::cli::SETTINGS,
    },
    raise_error, utc_now,
};

const HOUR_TO_MS: i64 = 60 * 60 * 1000;

#[derive(Clone)]
pub struct NativeDbTaskStore {
    pub store: Arc<Database<'static>>,
}

impl NativeDbTaskStore {
    pub fn init(database: Arc<Database<'static>>) -> Self {
        Self {
            store: database.clone(),
        }
    }

    pub async fn fetch_pending_tasks(
        database: &Arc<Database<'static>>,
    ) -> MailroomResult<Vec<TaskMeta>> {
        let result: Vec<TaskMetaEntity> = batch_update_impl(
            database,
            |rw| {
                let candidates: Vec<TaskMetaEntity> = rw
                    .scan()
                    .secondary(TaskMetaEntityKey::status)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .start_with(TaskStatus::Scheduled.code())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .try_collect()
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

                Ok(candidates
                    .into_iter()
                    .filter(|c| c.next_run <= utc_now!())
                    .take(500)
                    .collect())
            },
            move |data| {
                let mut result = Vec::new();
                for entity in data.iter() {
                    let mut updated = entity.clone();
                    updated.status = TaskStatus::Running;
                    updated.updated_at = utc_now!();
                    result.push((entity.clone(), updated));
                }
                Ok(result)
            },
        )
        .await?;

        Ok(result.into_iter().map(Into::into).collect())
    }

    async fn update_status(
        database: &Arc<Database<'static>>,
        task_id: u64,
        is_success: bool,
        last_error: Option<String>,
        last_duration_ms: Option<usize>,
        retry_count: Option<usize>,
        next_run: Option<i64>,
    ) -> MailroomResult<()> {
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .secondary::<TaskMetaEntity>(TaskMetaEntityKey::id, task_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!(
                                "The task with id={} that you want to modify was not found.",
                                &task_id
                            ),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.last_duration_ms = last_duration_ms;
                updated.retry_count = retry_count;
                updated.updated_at = utc_now!();
                match (updated.status.clone(), is_success) {
                    (TaskStatus::Stopped | TaskStatus::Removed, false) => {
                        updated.last_error = last_error;
                    }
                    (_, true) => {
                        updated.status = TaskStatus::Success;
                    }
                    (_, false) => {
                        updated.status = TaskStatus::Failed;
                        updated.last_error = last_error;
                        if let Some(next_run) = next_run {
                            updated.next_run = next_run;
                            updated.status = TaskStatus::Scheduled;
                        }
                    }
                }
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn clean_up(database: &Arc<Database<'static>>) -> MailroomResult<()> {
        let statuses_to_clean = [
            TaskStatus::Removed,
            TaskStatus::Success,
            TaskStatus::Failed,
            TaskStatus::Stopped,
        ];

        let cleanup_interval_ms = SETTINGS.mailroom_cleanup_interval_hours as i64 * HOUR_TO_MS;
        let now = utc_now!();

        for status in statuses_to_clean {
            let task_ids: Vec<u64> = {
                let r = database
                    .r_transaction()
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
                r.scan()
                    .secondary::<TaskMetaEntity>(TaskMetaEntityKey::status)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .start_with(status.code())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .filter_map(|result| match result {
                        Ok(t) if now - t.created_at > cleanup_interval_ms => Some(Ok(t.id)),
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    })
                    .try_collect()
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
            };

            let chunks: Vec<Vec<u64>> = task_ids.chunks(100).map(|chunk| chunk.to_vec()).collect();

            for chunk in chunks {
                batch_delete_impl(database, move |rw| {
                    let to_delete: Vec<TaskMetaEntity> = chunk
                        .iter()
                        .filter_map(|task_id| {
                            rw.get()
                                .secondary(TaskMetaEntityKey::id, *task_id)
                                .map_err(|e| {
                                    raise_error!(format!("{:#?}", e), ErrorCode::InternalError)
                                })
                                .ok()
                                .flatten()
                        })
                        .collect();
                    Ok(to_delete)
                })
                .await?;
            }
        }

        Ok(())
    }

    pub async fn set_status(
        database: &Arc<Database<'static>>,
        task_id: u64,
        status: TaskStatus,
        reason: Option<String>,
    ) -> MailroomResult<()> {
        assert!(matches!(status, TaskStatus::Removed | TaskStatus::Stopped));
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .secondary::<TaskMetaEntity>(TaskMetaEntityKey::id, task_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!(
                                "The task with id={} that you want to modify was not found.",
                                &task_id
                            ),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            |current| {
                let mut updated = current.clone();
                updated.status = status;
                updated.stopped_reason = reason;
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn heartbeat(
        database: &Arc<Database<'static>>,
        task_id: u64,
    ) -> MailroomResult<()> {
        update_impl(
            database,
            move |rw| {
                rw.get()
                    .secondary::<TaskMetaEntity>(TaskMetaEntityKey::id, task_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!(
                                "The task with id={} that you want to modify was not found.",
                                task_id
                            ),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.heartbeat_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    /// Reschedules tasks left in Running state by a previous process.
    pub async fn restore(database: &Arc<Database<'static>>) -> MailroomResult<()> {
        tracing::info!("starting task restore...");
        let running_tasks = filter_by_secondary_key_impl::<TaskMetaEntity>(
            database,
            TaskMetaEntityKey::status,
            TaskStatus::Running.code(),
        )
        .await?;
        let rw = database
            .rw_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        for task in running_tasks {
            let mut updated = task.clone();
            if let Some(retry_count) = task.retry_count {
                if retry_count >= task.max_retries.unwrap_or(0) as usize {
                    updated.status = TaskStatus::Removed;
                    updated.stopped_reason = Some(
                        "Max retries exceeded, Automatically stopped during task restoration"
                            .into(),
                    );
                } else {
                    updated.status = TaskStatus::Scheduled;
                }
            } else {
                updated.status = TaskStatus::Scheduled;
            }
            updated.updated_at = utc_now!();
            rw.update(task.clone(), updated)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        rw.commit()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        tracing::info!("finished task restore.");
        Ok(())
    }

    pub async fn get(
        database: &Arc<Database<'static>>,
        task_id: u64,
    ) -> MailroomResult<Option<TaskMeta>> {
        secondary_find_impl::<TaskMetaEntity>(database, TaskMetaEntityKey::id, task_id)
            .await
            .map(|opt| opt.map(Into::into))
    }

    pub async fn list_all(
        database: &Arc<Database<'static>>,
        task_key: &str,
    ) -> MailroomResult<Vec<TaskMetaEntity>> {
        filter_by_secondary_key_impl(database, TaskMetaEntityKey::task_key, task_key.to_string())
            .await
    }

    pub async fn store_one(
        database: &Arc<Database<'static>>,
        task: TaskMeta,
    ) -> MailroomResult<()> {
        let entity: TaskMetaEntity = task.into();
        insert_impl(database, entity).await
    }

    pub async fn store_many(
        database: &Arc<Database<'static>>,
        tasks: Vec<TaskMeta>,
    ) -> MailroomResult<()> {
        let batch: Vec<TaskMetaEntity> = tasks.into_iter().map(Into::into).collect();
        batch_insert_impl(database, batch).await
    }
}

impl TaskStore for NativeDbTaskStore {
    async fn store_task(&self, task: TaskMeta) -> MailroomResult<()> {
        let db = self.store.clone();
        Self::store_one(&db, task).await
    }

    async fn store_tasks(&self, tasks: Vec<TaskMeta>) -> MailroomResult<()> {
        let db = self.store.clone();
        Self::store_many(&db, tasks).await
    }

    async fn fetch_pending_tasks(&self) -> MailroomResult<Vec<TaskMeta>> {
        let db = self.store.clone();
        Self::fetch_pending_tasks(&db).await
    }

    async fn update_task_execution_status(
        &self,
        task_id: u64,
        is_success: bool,
        last_error: Option<String>,
        last_duration_ms: Option<usize>,
        retry_count: Option<usize>,
        next_run: Option<i64>,
    ) -> MailroomResult<()> {
        let db = self.store.clone();
        Self::update_status(
            &db,
            task_id,
            is_success,
            last_error,
            last_duration_ms,
            retry_count,
            next_run,
        )
        .await
    }

    async fn heartbeat(&self, task_id: u64) -> MailroomResult<()> {
        let db = self.store.clone();
        Self::heartbeat(&db, task_id).await
    }

    async fn set_task_stopped(&self, task_id: u64, reason: Option<String>) -> MailroomResult<()> {
        let db = self.store.clone();
        Self::set_status(&db, task_id, TaskStatus::Stopped, reason).await
    }

    async fn cleanup(&self) -> MailroomResult<()> {
        let db = self.store.clone();
        Self::clean_up(&db).await
    }
}
