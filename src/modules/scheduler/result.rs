use crate::modules::error::{MailroomError, MailroomResult};

#[derive(Debug)]
pub struct TaskResult {
    pub task_id: u64,
    pub last_duration_ms: usize,
    pub retry_count: usize,
    pub next_run: Option<i64>,
    pub result: MailroomResult<()>,
}

impl TaskResult {
    pub fn success(task_id: u64, last_duration_ms: usize) -> Self {
        Self {
            task_id,
            result: Ok(()),
            last_duration_ms,
            retry_count: Default::default(),
            next_run: None,
        }
    }

    pub fn failure(task_id: u64, error: MailroomError, last_duration_ms: usize) -> Self {
        Self {
            task_id,
            result: Err(error),
            last_duration_ms,
            retry_count: Default::default(),
            next_run: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
