// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::settings::cli::SETTINGS;
use crate::{mailroom_version, raise_error};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Event shipped to the external search indexer when a message is created
/// or its flags change.
#[derive(Clone, Debug, Serialize)]
pub struct MessageUpserted {
    pub message_id: u64,
    pub thread_id: u64,
    pub mailbox_id: u64,
    pub subject: String,
    pub snippet: String,
    pub is_spam: bool,
    pub sent_at: Option<i64>,
}

/// Emits a "message upserted" event. Indexing is an external collaborator:
/// failures are logged, never propagated into the mail path.
pub async fn emit_message_upserted(event: MessageUpserted) {
    let Some(url) = SETTINGS.mailroom_search_index_url.as_deref() else {
        return;
    };
    if let Err(e) = post_event(url, &event).await {
        warn!(
            "failed to emit index event for message {}: {:?}",
            event.message_id, e
        );
    }
}

async fn post_event(url: &str, event: &MessageUpserted) -> MailroomResult<()> {
    let client = reqwest::ClientBuilder::new()
        .user_agent(format!("mailroom/{}", mailroom_version!()))
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

    let endpoint = format!("{}/messages/upserted", url.trim_end_matches('/'));
    let mut request = client.post(&endpoint).json(event);
    if let Some(api_key) = &SETTINGS.mailroom_search_index_api_key {
        request = request.header("Authorization", format!("Bearer {}", api_key));
    }

    let response = request
        .send()
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransportFailed))?;
    if !response.status().is_success() {
        return Err(raise_error!(
            format!("indexer returned HTTP {}", response.status()),
            ErrorCode::HttpResponseError
        ));
    }
    Ok(())
}
