// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::blob::entity::Blob;
use crate::modules::cache::lock::LOCK_MANAGER;
use crate::modules::dkim::verify;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::inbound::{deliver_inbound, InboundOptions};
use crate::modules::index;
use crate::modules::mailbox::entity::Mailbox;
use crate::modules::message::entity::Message;
use crate::modules::message::recipient::{DeliveryStatus, MessageRecipient};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::thread::stats;
use crate::modules::transport;
use crate::modules::utils::split_address;
use crate::{raise_error, utc_now};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod prepare;
pub mod task;

/// Base delay before the first delivery retry; doubles per attempt.
const RETRY_BASE_MS: i64 = 5 * 60 * 1000;
const RETRY_MAX_MS: i64 = 6 * 60 * 60 * 1000;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SenderUser {
    pub name: String,
    pub custom_attributes: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SendOptions {
    pub force_mta_out: bool,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub include_quote: bool,
    pub sender_user: Option<SenderUser>,
}

fn retry_backoff_ms(retry_count: u32) -> i64 {
    (RETRY_BASE_MS.saturating_mul(1i64 << retry_count.min(16))).min(RETRY_MAX_MS)
}

/// Sends one message: compose, sign, verify, deliver, book-keep.
///
/// The advisory `send_message_lock:<id>` keeps concurrent workers off the
/// same message; losing the race is not an error. The database
/// `is_draft -> sent_at` transition is the authoritative at-most-once guard
/// and is re-checked under the lock.
pub async fn send_message(message_id: u64, options: SendOptions) -> MailroomResult<()> {
    let Some(_lock) = LOCK_MANAGER.try_send_message_lock(message_id) else {
        info!(
            "message {} is already being sent by another worker",
            message_id
        );
        return Ok(());
    };

    let message = Message::require(message_id).await?;
    let mailbox = Mailbox::get(message.mailbox_id).await?.ok_or_else(|| {
        raise_error!(
            format!("mailbox {} disappeared", message.mailbox_id),
            ErrorCode::ResourceNotFound
        )
    })?;

    // Prepare once; subsequent calls only move RETRY recipients forward.
    let signed = if message.is_draft {
        prepare::prepare_outbound_message(
            &mailbox,
            &message,
            options.text_body.clone(),
            options.html_body.clone(),
            options.sender_user.as_ref(),
            options.include_quote,
        )
        .await?
    } else {
        let blob_id = message.blob_id.ok_or_else(|| {
            raise_error!(
                "sent message has no finalized blob".into(),
                ErrorCode::InternalError
            )
        })?;
        Blob::require(blob_id).await?.raw_content
    };

    deliver(&mailbox, &message, &signed, &options).await?;

    stats::update_stats(message.thread_id).await?;

    let refreshed = Message::require(message_id).await?;
    index::emit_message_upserted(index::MessageUpserted {
        message_id,
        thread_id: refreshed.thread_id,
        mailbox_id: refreshed.mailbox_id,
        subject: refreshed.subject.clone(),
        snippet: String::new(),
        is_spam: refreshed.is_spam,
        sent_at: refreshed.sent_at,
    })
    .await;

    Ok(())
}

/// Recipients still owed a delivery attempt: never attempted, or parked in
/// Retry with an elapsed backoff.
fn needs_attempt(recipient: &MessageRecipient) -> bool {
    match recipient.delivery_status {
        None => true,
        Some(DeliveryStatus::Retry) => {
            recipient.retry_at.map(|at| at <= utc_now!()).unwrap_or(true)
        }
        Some(_) => false,
    }
}

async fn deliver(
    mailbox: &Mailbox,
    message: &Message,
    signed: &[u8],
    options: &SendOptions,
) -> MailroomResult<()> {
    let recipients = MessageRecipient::list_for_message(message.id).await?;
    let pending: Vec<MessageRecipient> =
        recipients.into_iter().filter(needs_attempt).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let mut internal = Vec::new();
    let mut external = Vec::new();
    for recipient in pending {
        let is_internal = match split_address(&recipient.contact_email) {
            Some((_, domain)) => {
                crate::modules::domain::entity::MailDomain::is_local(domain).await?
            }
            None => false,
        };
        if is_internal {
            internal.push(recipient);
        } else {
            external.push(recipient);
        }
    }

    // Internal short-circuit: the signed bytes land directly in the
    // recipient's mailbox, original DKIM signature retained, no SMTP hop.
    for recipient in &internal {
        match deliver_inbound(
            &recipient.contact_email,
            signed,
            InboundOptions::default(),
        )
        .await
        {
            Ok(_) => {
                MessageRecipient::set_delivery_state(
                    recipient.id,
                    DeliveryStatus::Internal,
                    None,
                    None,
                )
                .await?;
            }
            Err(e) => {
                warn!(
                    "internal delivery to {} failed: {}",
                    recipient.contact_email, e
                );
                MessageRecipient::set_delivery_state(
                    recipient.id,
                    DeliveryStatus::Failed,
                    Some(e.to_string()),
                    None,
                )
                .await?;
            }
        }
    }

    if external.is_empty() {
        return Ok(());
    }

    // Our own signature must verify before bytes leave the instance.
    if SETTINGS.mailroom_dkim_verify_outgoing {
        if let Err(e) = verify::verify_message(signed).await {
            let reason = format!("DKIM verification failed: {}", e.message());
            warn!("{}; parking {} external recipients", reason, external.len());
            for recipient in &external {
                let retry_at = utc_now!() + retry_backoff_ms(recipient.retry_count);
                MessageRecipient::set_delivery_state(
                    recipient.id,
                    DeliveryStatus::Retry,
                    Some(reason.clone()),
                    Some(retry_at),
                )
                .await?;
            }
            return Ok(());
        }
    }

    let envelope_from = mailbox.address();
    let emails: Vec<String> = external
        .iter()
        .map(|recipient| recipient.contact_email.clone())
        .collect();
    let outcomes =
        transport::deliver_external(&envelope_from, &emails, signed, options.force_mta_out)
            .await?;

    for recipient in &external {
        let Some(outcome) = outcomes.get(&recipient.contact_email) else {
            continue;
        };
        if outcome.delivered {
            MessageRecipient::set_delivery_state(recipient.id, DeliveryStatus::Sent, None, None)
                .await?;
        } else if outcome.retry {
            let retry_at = utc_now!() + retry_backoff_ms(recipient.retry_count);
            MessageRecipient::set_delivery_state(
                recipient.id,
                DeliveryStatus::Retry,
                outcome.error.clone(),
                Some(retry_at),
            )
            .await?;
        } else {
            MessageRecipient::set_delivery_state(
                recipient.id,
                DeliveryStatus::Failed,
                outcome.error.clone(),
                None,
            )
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        assert_eq!(retry_backoff_ms(0), 5 * 60 * 1000);
        assert_eq!(retry_backoff_ms(1), 10 * 60 * 1000);
        assert_eq!(retry_backoff_ms(2), 20 * 60 * 1000);
        assert_eq!(retry_backoff_ms(30), RETRY_MAX_MS);
    }
}
