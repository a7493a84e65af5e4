use crate::modules::context::Initialize;
use crate::modules::database::META_MODELS;
use crate::modules::error::{code::ErrorCode, MailroomError, MailroomResult};
use crate::modules::scheduler::nativedb::TASK_MODELS;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use crate::raise_error;
use native_db::{Builder, Database};
use std::sync::{Arc, LazyLock};
use tracing::info;

pub static DB_MANAGER: LazyLock<DatabaseManager> = LazyLock::new(DatabaseManager::new);

pub struct DatabaseManager {
    /// Metadata database instance
    meta_db: Arc<Database<'static>>,
    /// Task scheduling database instance
    tasks_db: Arc<Database<'static>>,
}

impl DatabaseManager {
    fn new() -> Self {
        let meta_db = Self::init_meta_database().expect("Failed to initialize metadata database");
        let tasks_db =
            Self::init_task_queue_database().expect("Failed to initialize tasks database");
        DatabaseManager { meta_db, tasks_db }
    }

    /// Get a reference to the metadata database
    pub fn meta_db(&self) -> &Arc<Database<'static>> {
        &self.meta_db
    }

    /// Get a reference to the task scheduler database
    pub fn tasks_db(&self) -> &Arc<Database<'static>> {
        &self.tasks_db
    }

    #[cfg(not(test))]
    fn init_meta_database() -> MailroomResult<Arc<Database<'static>>> {
        let mut database = Builder::new()
            .set_cache_size(
                SETTINGS
                    .mailroom_metadata_cache_size
                    .unwrap_or(134217728)
                    .max(67108864) as usize,
            ) //default 128MB
            .create(&META_MODELS, DATA_DIR_MANAGER.meta_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    #[cfg(not(test))]
    fn init_task_queue_database() -> MailroomResult<Arc<Database<'static>>> {
        let mut database = Builder::new()
            .create(&TASK_MODELS, DATA_DIR_MANAGER.task_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    #[cfg(test)]
    fn init_meta_database() -> MailroomResult<Arc<Database<'static>>> {
        Ok(Arc::new(
            Builder::new().create_in_memory(&META_MODELS).unwrap(),
        ))
    }

    #[cfg(test)]
    fn init_task_queue_database() -> MailroomResult<Arc<Database<'static>>> {
        Ok(Arc::new(
            Builder::new().create_in_memory(&TASK_MODELS).unwrap(),
        ))
    }

    #[allow(dead_code)]
    fn handle_database_error(error: native_db::db_type::Error) -> MailroomError {
        raise_error!(
            format!("failed to open database: {:#?}", error),
            ErrorCode::InternalError
        )
    }
}

impl Initialize for DatabaseManager {
    async fn initialize() -> MailroomResult<()> {
        let manager = &*DB_MANAGER;
        info!(
            "metadata and task databases ready under {:?}",
            DATA_DIR_MANAGER.root_dir
        );
        let _ = manager.meta_db();
        let _ = manager.tasks_db();
        Ok(())
    }
}
