// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::context::MailroomTask;
use crate::modules::inbound::task::rescan_inbound_queue;
use crate::modules::outbound::task::rescan_retry_recipients;
use crate::modules::scheduler::periodic::PeriodicTask;
use std::time::Duration;

pub mod queue;

pub struct PeriodicTasks;

impl PeriodicTasks {
    pub fn start_background_tasks() {
        InboundQueueScanTask::start();
        DeliveryRetryScanTask::start();
    }
}

/// Rescues inbound rows stranded by crashed or failed workers.
pub struct InboundQueueScanTask;

impl MailroomTask for InboundQueueScanTask {
    fn start() {
        let periodic_task = PeriodicTask::new("inbound-queue-scan");
        let task = move |_: Option<u64>| Box::pin(rescan_inbound_queue());
        periodic_task.start(task, None, Duration::from_secs(60), false, false);
    }
}

/// Re-dispatches messages whose recipients are due another delivery attempt.
pub struct DeliveryRetryScanTask;

impl MailroomTask for DeliveryRetryScanTask {
    fn start() {
        let periodic_task = PeriodicTask::new("delivery-retry-scan");
        let task = move |_: Option<u64>| Box::pin(rescan_retry_recipients());
        periodic_task.start(task, None, Duration::from_secs(60), false, false);
    }
}
