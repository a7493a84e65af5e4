// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::inbound::entity::InboundMessage;
use crate::modules::inbound::process_inbound;
use crate::modules::scheduler::task::{Task, TaskFuture};
use crate::modules::tasks::queue::MailroomTaskQueue;
use crate::{raise_error, utc_now};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const INBOUND_QUEUE: &str = "inbound_queue";

/// Rows older than this are assumed stranded and rescanned.
const RETRY_AGE_MS: i64 = 5 * 60 * 1000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessInboundTask {
    pub inbound_id: u64,
    pub mailbox_id: u64,
}

impl Task for ProcessInboundTask {
    const TASK_KEY: &'static str = "process_inbound_message";
    const TASK_QUEUE: &'static str = INBOUND_QUEUE;

    fn delay_seconds(&self) -> u32 {
        0
    }

    fn run(self, _task_id: u64) -> TaskFuture {
        Box::pin(async move {
            let Some(row) = InboundMessage::get(self.inbound_id).await? else {
                // Already ingested by an earlier attempt.
                return Ok(());
            };
            match process_inbound(&row).await {
                Ok(()) => {
                    InboundMessage::delete(self.inbound_id).await?;
                    Ok(())
                }
                Err(e) => {
                    // The row stays behind with the error; the queue scan
                    // picks it up again.
                    InboundMessage::set_error(self.inbound_id, e.to_string()).await?;
                    Err(raise_error!(
                        format!("inbound processing failed: {}", e),
                        ErrorCode::InternalError
                    ))
                }
            }
        })
    }
}

/// Periodic rescue: requeue stranded spam-queue rows older than 5 minutes.
pub async fn rescan_inbound_queue() -> crate::modules::error::MailroomResult<()> {
    let cutoff = utc_now!() - RETRY_AGE_MS;
    let rows = InboundMessage::list_all().await?;
    for row in rows {
        if row.created_at > cutoff {
            continue;
        }
        warn!(
            "requeueing stranded inbound message {} (error: {:?})",
            row.id, row.error_message
        );
        MailroomTaskQueue::get()?
            .submit_task(
                ProcessInboundTask {
                    inbound_id: row.id,
                    mailbox_id: row.mailbox_id,
                },
                Some(0),
            )
            .await?;
    }
    Ok(())
}
