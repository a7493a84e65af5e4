// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::blob::entity::Blob;
use crate::modules::domain::entity::MailDomain;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::inbound::entity::InboundMessage;
use crate::modules::inbound::task::ProcessInboundTask;
use crate::modules::index;
use crate::modules::label;
use crate::modules::label::entity::{slugify, Label};
use crate::modules::mailbox::contact::Contact;
use crate::modules::mailbox::entity::Mailbox;
use crate::modules::message::entity::Message;
use crate::modules::message::recipient::{DeliveryStatus, MessageRecipient, RecipientType};
use crate::modules::mime::parser;
use crate::modules::mime::ParsedEmail;
use crate::modules::spam;
use crate::modules::tasks::queue::MailroomTaskQueue;
use crate::modules::thread::assembler;
use crate::modules::thread::entity::ThreadRole;
use crate::modules::thread::stats;
use crate::{id, raise_error, sha256_hex, utc_now};
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod entity;
pub mod task;

const SNIPPET_MAX_CHARS: usize = 140;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InboundOptions {
    pub is_import: bool,
    pub is_import_sender: bool,
    pub imap_labels: Vec<String>,
    pub imap_flags: Vec<String>,
}

/// Phase 1 of the inbound pipeline: resolve the recipient, drop duplicates,
/// queue the raw bytes, and schedule the async worker. Returns true when the
/// message was accepted (including the duplicate no-op case).
pub async fn deliver_inbound(
    recipient_email: &str,
    raw: &[u8],
    options: InboundOptions,
) -> MailroomResult<bool> {
    let mailbox = Mailbox::require_by_address(recipient_email).await?;
    let parsed = parser::parse(raw)?;
    let mime_id = effective_mime_id(&parsed, raw, &mailbox.domain_name);

    if Message::find_by_mime_id(mailbox.id, &mime_id).await?.is_some() {
        info!(
            "duplicate message {} for mailbox {}, skipping",
            mime_id,
            mailbox.address()
        );
        return Ok(true);
    }

    let mut row = InboundMessage::new(mailbox.id, raw.to_vec());
    row.is_import = options.is_import;
    row.is_import_sender = options.is_import_sender;
    row.imap_labels = options.imap_labels;
    row.imap_flags = options.imap_flags;
    let inbound_id = row.id;
    let mailbox_id = row.mailbox_id;
    row.save().await?;

    MailroomTaskQueue::get()?
        .submit_task(
            ProcessInboundTask {
                inbound_id,
                mailbox_id,
            },
            Some(0),
        )
        .await?;

    Ok(true)
}

/// Messages without a Message-ID get a deterministic one from the content
/// hash so re-imports stay idempotent.
pub fn effective_mime_id(parsed: &ParsedEmail, raw: &[u8], domain: &str) -> String {
    if parsed.message_id.is_empty() {
        format!("{}@{}", sha256_hex!(raw), domain)
    } else {
        parsed.message_id.clone()
    }
}

fn make_snippet(parsed: &ParsedEmail) -> String {
    let text = parsed.primary_text().unwrap_or_default();
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_MAX_CHARS).collect()
}

/// Phase 2: the asynchronous ingestion worker. Re-parses the queued bytes,
/// classifies, persists the canonical entities, and emits the index event.
pub async fn process_inbound(row: &InboundMessage) -> MailroomResult<()> {
    let mailbox = Mailbox::get(row.mailbox_id).await?.ok_or_else(|| {
        raise_error!(
            format!("mailbox {} disappeared", row.mailbox_id),
            ErrorCode::ResourceNotFound
        )
    })?;
    let domain = MailDomain::get(mailbox.domain_id).await?.ok_or_else(|| {
        raise_error!(
            format!("mail domain {} disappeared", mailbox.domain_id),
            ErrorCode::ResourceNotFound
        )
    })?;

    // The enqueuer's parse is not trusted to have persisted anything.
    let parsed = parser::parse(&row.raw_data)?;
    let mime_id = effective_mime_id(&parsed, &row.raw_data, &mailbox.domain_name);

    // Idempotence: a concurrent or earlier worker may have won the race.
    if Message::find_by_mime_id(mailbox.id, &mime_id).await?.is_some() {
        return Ok(());
    }

    let classification = spam::classify(&domain, &parsed, &row.raw_data).await?;

    let blob = Blob::get_or_create(mailbox.id, row.raw_data.clone(), "message/rfc822").await?;

    let sender_contact =
        Contact::get_or_create(mailbox.id, &parsed.from.email, &parsed.from.name).await?;

    let mailbox_address = mailbox.address();
    let is_draft = row.imap_flags.iter().any(|flag| flag == "Draft");
    let is_sender = (row.is_import
        && parsed.from.email.eq_ignore_ascii_case(&mailbox_address))
        || row.is_import_sender
        || Mailbox::get_by_address(&parsed.from.email)
            .await?
            .map(|sender_mailbox| sender_mailbox.id == mailbox.id)
            .unwrap_or(false);
    let is_unread = !is_sender && !is_draft;

    let placement = assembler::place_message(
        mailbox.id,
        &parsed.subject,
        &parsed.in_reply_to,
        &parsed.references,
    )
    .await?;

    let now = utc_now!();
    let message = Message {
        id: id!(64),
        mailbox_id: mailbox.id,
        thread_id: placement.thread_id,
        subject: parsed.subject.clone(),
        sender_contact_id: sender_contact.id,
        parent_id: placement.parent_id,
        is_draft,
        is_sender,
        is_starred: row.imap_flags.iter().any(|flag| flag == "Flagged"),
        is_trashed: false,
        is_unread,
        is_spam: classification.is_spam(),
        is_archived: false,
        has_attachments: !parsed.attachments.is_empty(),
        sent_at: (!is_draft).then_some(parsed.date),
        read_at: None,
        archived_at: None,
        trashed_at: None,
        mime_id,
        blob_id: Some(blob.id),
        draft_blob_id: None,
        signature_template_id: None,
        created_at: now,
        updated_at: now,
    };
    let message_id = message.id;
    let message_subject = message.subject.clone();
    let message_is_spam = message.is_spam;
    let message_sent_at = message.sent_at;
    message.save().await?;

    // Recipient bookkeeping: real inbound mail is already delivered.
    let delivery_status = (!is_draft).then_some(DeliveryStatus::Sent);
    for (addrs, kind) in [
        (&parsed.to, RecipientType::To),
        (&parsed.cc, RecipientType::Cc),
        (&parsed.bcc, RecipientType::Bcc),
    ] {
        for addr in addrs {
            if addr.email.is_empty() {
                continue;
            }
            let contact = Contact::get_or_create(mailbox.id, &addr.email, &addr.name).await?;
            if MessageRecipient::find(message_id, contact.id, kind)
                .await?
                .is_none()
            {
                MessageRecipient::new(message_id, contact.id, &addr.email, kind, delivery_status)
                    .save()
                    .await?;
            }
        }
    }

    // Access propagation: a mailbox that is only CC'd watches the thread, a
    // direct participant edits it.
    let only_ccd = !is_sender
        && !parsed
            .to
            .iter()
            .any(|addr| addr.email.eq_ignore_ascii_case(&mailbox_address))
        && parsed
            .cc
            .iter()
            .any(|addr| addr.email.eq_ignore_ascii_case(&mailbox_address));
    let role = if only_ccd {
        ThreadRole::Viewer
    } else {
        ThreadRole::Editor
    };
    let origin = if row.is_import { "import" } else { "inbound" };
    assembler::grant_participant_access(placement.thread_id, mailbox.id, role, origin).await?;

    let snippet = (!is_draft).then(|| make_snippet(&parsed));
    stats::update_stats_with_snippet(placement.thread_id, snippet.clone()).await?;

    if row.is_import {
        attach_import_labels(
            &row.imap_labels,
            &parsed.gmail_labels,
            &mailbox,
            placement.thread_id,
        )
        .await?;
    }

    index::emit_message_upserted(index::MessageUpserted {
        message_id,
        thread_id: placement.thread_id,
        mailbox_id: mailbox.id,
        subject: message_subject,
        snippet: snippet.unwrap_or_default(),
        is_spam: message_is_spam,
        sent_at: message_sent_at,
    })
    .await;

    Ok(())
}

/// Import labels (IMAP folders, X-Gmail-Labels) materialize as auto-created
/// labels on the destination thread.
async fn attach_import_labels(
    imap_labels: &[String],
    gmail_labels: &[String],
    mailbox: &Mailbox,
    thread_id: u64,
) -> MailroomResult<()> {
    for name in imap_labels.iter().chain(gmail_labels.iter()) {
        let name = name.trim().trim_matches('/');
        if name.is_empty() {
            continue;
        }
        let label = match Label::find_by_slug(mailbox.id, &slugify(name)).await? {
            Some(label) => label,
            None => label::create_label(mailbox.id, name, "#9e9e9e", "", true).await?,
        };
        Label::update_with(label.id, move |label| {
            if !label.thread_ids.contains(&thread_id) {
                label.thread_ids.push(thread_id);
            }
        })
        .await?;
    }
    Ok(())
}
