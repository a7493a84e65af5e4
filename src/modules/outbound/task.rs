// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::message::recipient::MessageRecipient;
use crate::modules::outbound::{send_message, SendOptions};
use crate::modules::scheduler::task::{Task, TaskFuture};
use crate::modules::tasks::queue::MailroomTaskQueue;
use crate::utc_now;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const OUTBOX_QUEUE: &str = "outbox_queue";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendMessageTask {
    pub message_id: u64,
    #[serde(default)]
    pub options: SendOptions,
}

impl Task for SendMessageTask {
    const TASK_KEY: &'static str = "send_message";
    const TASK_QUEUE: &'static str = OUTBOX_QUEUE;

    fn delay_seconds(&self) -> u32 {
        0
    }

    fn run(self, _task_id: u64) -> TaskFuture {
        Box::pin(async move { send_message(self.message_id, self.options).await })
    }
}

/// Periodic scan over recipients parked in Retry whose backoff elapsed;
/// each affected message gets one fresh send task.
pub async fn rescan_retry_recipients() -> crate::modules::error::MailroomResult<()> {
    let now = utc_now!();
    let mut due_messages = HashSet::new();
    for recipient in MessageRecipient::list_in_retry().await? {
        if recipient.retry_at.map(|at| at <= now).unwrap_or(true) {
            due_messages.insert(recipient.message_id);
        }
    }
    for message_id in due_messages {
        debug!("requeueing delivery retries for message {}", message_id);
        MailroomTaskQueue::get()?
            .submit_task(
                SendMessageTask {
                    message_id,
                    options: SendOptions::default(),
                },
                Some(0),
            )
            .await?;
    }
    Ok(())
}
