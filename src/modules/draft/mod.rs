// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::blob::attachment::Attachment;
use crate::modules::blob::entity::Blob;
use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::transaction_impl;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::mailbox::contact::Contact;
use crate::modules::mailbox::entity::{Mailbox, MailboxAccess};
use crate::modules::message::entity::{Message, MessageKey};
use crate::modules::message::recipient::{MessageRecipient, RecipientType};
use crate::modules::mime::parser;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::thread::entity::{Thread, ThreadAccess, ThreadRole};
use crate::modules::thread::stats;
use crate::{id, raise_error, utc_now};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One attachment reference on a draft: either a blob owned by the mailbox
/// (numeric id) or `msg_<messageId>_<index>`, a parsed attachment of an
/// accessible past message being forwarded.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DraftAttachment {
    pub blob_ref: String,
    pub name: Option<String>,
    pub cid: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct CreateDraftRequest {
    pub mailbox_id: u64,
    pub user_id: u64,
    pub subject: String,
    /// Arbitrary editor-state bytes, stored as the draft blob.
    pub draft_body: Vec<u8>,
    pub parent_id: Option<u64>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attachments: Vec<DraftAttachment>,
    pub signature_id: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateDraftRequest {
    pub mailbox_id: u64,
    pub user_id: u64,
    pub subject: Option<String>,
    pub draft_body: Option<Vec<u8>>,
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    /// Full replacement set when present.
    pub attachments: Option<Vec<DraftAttachment>>,
    pub signature_id: Option<Option<u64>>,
}

/// A bare Message-ID with the sender's domain suffix.
pub fn generate_mime_id(domain: &str) -> String {
    let random_bytes: [u8; 16] = rand::random();
    format!("{}.{}@{}", utc_now!(), hex::encode(random_bytes), domain)
}

struct ResolvedAttachment {
    blob: Blob,
    blob_is_new: bool,
    name: String,
    cid: Option<String>,
}

async fn require_sender_access(mailbox_id: u64, user_id: u64) -> MailroomResult<()> {
    let access = MailboxAccess::get(mailbox_id, user_id).await?.ok_or_else(|| {
        raise_error!(
            "No access to this mailbox".into(),
            ErrorCode::PermissionDenied
        )
    })?;
    if !access.role.can_send() {
        return Err(raise_error!(
            "Drafting requires an editor, sender or admin role".into(),
            ErrorCode::PermissionDenied
        ));
    }
    Ok(())
}

/// Resolves attachment references. Foreign blob ids are a validation error;
/// forwarded references to inaccessible messages are silently skipped.
async fn resolve_attachments(
    mailbox: &Mailbox,
    attachments: &[DraftAttachment],
) -> MailroomResult<Vec<ResolvedAttachment>> {
    let mut resolved = Vec::new();

    for descriptor in attachments {
        if let Some(rest) = descriptor.blob_ref.strip_prefix("msg_") {
            let Some((message_id, index)) = rest.rsplit_once('_') else {
                debug!("skipping malformed forward reference {}", descriptor.blob_ref);
                continue;
            };
            let (Ok(message_id), Ok(index)) = (message_id.parse::<u64>(), index.parse::<usize>())
            else {
                debug!("skipping malformed forward reference {}", descriptor.blob_ref);
                continue;
            };
            let Some(original) = Message::get(message_id).await? else {
                continue;
            };
            // Forwarding needs visibility of the original's thread.
            if ThreadAccess::get(original.thread_id, mailbox.id).await?.is_none()
                && original.mailbox_id != mailbox.id
            {
                continue;
            }
            let Some(blob_id) = original.blob_id else {
                continue;
            };
            let raw = Blob::require(blob_id).await?.raw_content;
            let parsed = parser::parse(&raw)?;
            let Some(part) = parsed.attachments.get(index) else {
                continue;
            };
            // Content-address into this mailbox, deferring the insert until
            // the size policy has passed.
            let (blob, blob_is_new) =
                match Blob::find_by_content(mailbox.id, &part.sha256).await? {
                    Some(existing) => (existing, false),
                    None => (
                        Blob::new(mailbox.id, part.content.clone(), &part.content_type),
                        true,
                    ),
                };
            resolved.push(ResolvedAttachment {
                blob,
                blob_is_new,
                name: descriptor.name.clone().unwrap_or_else(|| part.name.clone()),
                cid: descriptor.cid.clone().or_else(|| part.cid.clone()),
            });
        } else {
            let blob_id: u64 = descriptor.blob_ref.parse().map_err(|_| {
                raise_error!(
                    format!("'{}' is not a valid blob reference", descriptor.blob_ref),
                    ErrorCode::ValidationFailed
                )
            })?;
            let blob = Blob::get(blob_id).await?.ok_or_else(|| {
                raise_error!(
                    format!("Blob {} not found", blob_id),
                    ErrorCode::ValidationFailed
                )
            })?;
            if blob.mailbox_id != mailbox.id {
                return Err(raise_error!(
                    "attachments: blob does not belong to this mailbox".into(),
                    ErrorCode::ValidationFailed
                ));
            }
            resolved.push(ResolvedAttachment {
                blob_is_new: false,
                name: descriptor
                    .name
                    .clone()
                    .unwrap_or_else(|| "unnamed".to_string()),
                cid: descriptor.cid.clone(),
                blob,
            });
        }
    }

    Ok(resolved)
}

fn enforce_attachment_size(resolved: &[ResolvedAttachment]) -> MailroomResult<()> {
    let total: u64 = resolved.iter().map(|a| a.blob.size).sum();
    if total > SETTINGS.mailroom_max_outgoing_attachment_size {
        return Err(raise_error!(
            format!(
                "attachments: total attachment size {} exceeds the {} byte limit",
                total, SETTINGS.mailroom_max_outgoing_attachment_size
            ),
            ErrorCode::ExceedsLimitation
        ));
    }
    Ok(())
}

async fn recipient_rows(
    mailbox_id: u64,
    message_id: u64,
    emails: &[String],
    kind: RecipientType,
) -> MailroomResult<Vec<MessageRecipient>> {
    let mut rows = Vec::new();
    for email in emails {
        crate::validate_email!(email)?;
        let contact = Contact::get_or_create(mailbox_id, email, "").await?;
        rows.push(MessageRecipient::new(
            message_id, contact.id, email, kind, None,
        ));
    }
    Ok(rows)
}

/// Creates a draft. Everything is validated up front; the entity writes land
/// in one transaction so a failed size check leaves no partial state behind.
pub async fn create_draft(request: CreateDraftRequest) -> MailroomResult<Message> {
    let mailbox = Mailbox::get(request.mailbox_id).await?.ok_or_else(|| {
        raise_error!(
            format!("Mailbox {} not found", request.mailbox_id),
            ErrorCode::ResourceNotFound
        )
    })?;
    require_sender_access(mailbox.id, request.user_id).await?;

    // Parent placement before any write.
    let (thread_id, parent_id, new_thread) = match request.parent_id {
        Some(parent_id) => {
            let parent = Message::get(parent_id).await?.ok_or_else(|| {
                raise_error!(
                    format!("Parent message {} not found", parent_id),
                    ErrorCode::ResourceNotFound
                )
            })?;
            if parent.mailbox_id != mailbox.id
                && ThreadAccess::get(parent.thread_id, mailbox.id).await?.is_none()
            {
                return Err(raise_error!(
                    "Parent message is not accessible to this mailbox".into(),
                    ErrorCode::ResourceNotFound
                ));
            }
            (parent.thread_id, Some(parent.id), None)
        }
        None => {
            let thread = Thread::new(&request.subject);
            (thread.id, None, Some(thread))
        }
    };

    let sender_contact = match mailbox.contact_id {
        Some(contact_id) => Contact::get(contact_id).await?.ok_or_else(|| {
            raise_error!(
                "mailbox self contact disappeared".into(),
                ErrorCode::InternalError
            )
        })?,
        None => {
            let contact = Contact::get_or_create(mailbox.id, &mailbox.address(), "").await?;
            Mailbox::set_self_contact(mailbox.id, contact.id).await?;
            contact
        }
    };

    let resolved = resolve_attachments(&mailbox, &request.attachments).await?;
    enforce_attachment_size(&resolved)?;

    let draft_blob = Blob::new(mailbox.id, request.draft_body.clone(), "application/json");

    let now = utc_now!();
    let message = Message {
        id: id!(64),
        mailbox_id: mailbox.id,
        thread_id,
        subject: request.subject.clone(),
        sender_contact_id: sender_contact.id,
        parent_id,
        is_draft: true,
        is_sender: true,
        is_starred: false,
        is_trashed: false,
        is_unread: false,
        is_spam: false,
        is_archived: false,
        has_attachments: !resolved.is_empty(),
        sent_at: None,
        read_at: None,
        archived_at: None,
        trashed_at: None,
        mime_id: generate_mime_id(&mailbox.domain_name),
        blob_id: None,
        draft_blob_id: Some(draft_blob.id),
        signature_template_id: request.signature_id,
        created_at: now,
        updated_at: now,
    };

    let mut recipients = Vec::new();
    recipients.extend(recipient_rows(mailbox.id, message.id, &request.to, RecipientType::To).await?);
    recipients.extend(recipient_rows(mailbox.id, message.id, &request.cc, RecipientType::Cc).await?);
    recipients
        .extend(recipient_rows(mailbox.id, message.id, &request.bcc, RecipientType::Bcc).await?);

    let attachment_rows: Vec<Attachment> = resolved
        .iter()
        .map(|a| {
            let mut attachment = Attachment::new(mailbox.id, &a.name, a.blob.id, a.cid.clone());
            attachment.message_ids.push(message.id);
            attachment
        })
        .collect();

    let created = message.clone();
    let new_blobs: Vec<Blob> = resolved
        .into_iter()
        .filter(|a| a.blob_is_new)
        .map(|a| a.blob)
        .collect();

    transaction_impl(DB_MANAGER.meta_db(), move |rw| {
        if let Some(thread) = new_thread {
            rw.insert(thread)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        for blob in new_blobs {
            rw.insert(blob)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        rw.insert(draft_blob)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        rw.insert(message)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        for recipient in recipients {
            rw.insert(recipient)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        for attachment in attachment_rows {
            rw.insert(attachment)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        Ok(())
    })
    .await?;

    ThreadAccess::ensure(thread_id, mailbox.id, ThreadRole::Editor, "draft").await?;
    stats::update_stats(thread_id).await?;

    Ok(created)
}

/// Updates a draft in place. The sender and thread are fixed; replacing
/// attachments re-applies the size policy over the full new set.
/// Updates a draft in place. The sender and thread are fixed. Everything is
/// resolved and validated first; the whole write set (attachment swap,
/// recipient replacement, draft blob, message fields) commits in one
/// transaction so a mid-sequence failure leaves the draft untouched.
pub async fn update_draft(message_id: u64, request: UpdateDraftRequest) -> MailroomResult<Message> {
    let message = Message::require(message_id).await?;
    if !message.is_draft {
        return Err(raise_error!(
            "Only drafts can be updated".into(),
            ErrorCode::ValidationFailed
        ));
    }
    if message.mailbox_id != request.mailbox_id {
        return Err(raise_error!(
            "Draft does not belong to this mailbox".into(),
            ErrorCode::PermissionDenied
        ));
    }
    let mailbox = Mailbox::get(request.mailbox_id).await?.ok_or_else(|| {
        raise_error!(
            format!("Mailbox {} not found", request.mailbox_id),
            ErrorCode::ResourceNotFound
        )
    })?;
    require_sender_access(mailbox.id, request.user_id).await?;

    // Resolve and validate the replacement attachment set first.
    let resolved = match &request.attachments {
        Some(attachments) => {
            let resolved = resolve_attachments(&mailbox, attachments).await?;
            enforce_attachment_size(&resolved)?;
            Some(resolved)
        }
        None => None,
    };

    // Replacing attachments removes the old links and applies the new set.
    let old_attachments = if resolved.is_some() {
        Attachment::list_for_message(mailbox.id, message.id).await?
    } else {
        Vec::new()
    };
    let has_attachments = resolved.as_ref().map(|set| !set.is_empty());
    let mut new_blobs = Vec::new();
    let mut new_attachment_rows = Vec::new();
    if let Some(resolved) = resolved {
        for a in resolved {
            if a.blob_is_new {
                new_blobs.push(a.blob.clone());
            }
            let mut attachment = Attachment::new(mailbox.id, &a.name, a.blob.id, a.cid);
            attachment.message_ids.push(message.id);
            new_attachment_rows.push(attachment);
        }
    }

    // Recipient replacement per provided kind, resolved before the commit.
    let existing_recipients = MessageRecipient::list_for_message(message.id).await?;
    let mut replaced_kinds = Vec::new();
    for (emails, kind) in [
        (&request.to, RecipientType::To),
        (&request.cc, RecipientType::Cc),
        (&request.bcc, RecipientType::Bcc),
    ] {
        if let Some(emails) = emails {
            let rows = recipient_rows(mailbox.id, message.id, emails, kind).await?;
            replaced_kinds.push((kind, rows));
        }
    }

    let new_draft_blob = request
        .draft_body
        .as_ref()
        .map(|body| Blob::new(mailbox.id, body.clone(), "application/json"));
    let new_draft_blob_id = new_draft_blob.as_ref().map(|blob| blob.id);

    let subject = request.subject.clone();
    let signature_id = request.signature_id;
    transaction_impl(DB_MANAGER.meta_db(), move |rw| {
        for old in old_attachments {
            let mut updated = old.clone();
            updated.message_ids.retain(|m| *m != message_id);
            updated.updated_at = utc_now!();
            rw.update(old, updated)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        for blob in new_blobs {
            rw.insert(blob)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        for attachment in new_attachment_rows {
            rw.insert(attachment)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        for (kind, rows) in replaced_kinds {
            for existing in existing_recipients.iter().filter(|r| r.kind == kind) {
                rw.remove(existing.clone())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            }
            for row in rows {
                rw.insert(row)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            }
        }
        if let Some(blob) = new_draft_blob {
            rw.insert(blob)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }

        let current: Message = rw
            .get()
            .secondary(MessageKey::id, message_id)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
            .ok_or_else(|| {
                raise_error!(
                    format!("Message with id={} not found", message_id),
                    ErrorCode::ResourceNotFound
                )
            })?;
        let mut updated = current.clone();
        if let Some(subject) = subject {
            updated.subject = subject;
        }
        if let Some(signature_id) = signature_id {
            updated.signature_template_id = signature_id;
        }
        if let Some(has_attachments) = has_attachments {
            updated.has_attachments = has_attachments;
        }
        if let Some(blob_id) = new_draft_blob_id {
            updated.draft_blob_id = Some(blob_id);
        }
        updated.updated_at = utc_now!();
        rw.update(current, updated)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    })
    .await?;

    stats::update_stats(message.thread_id).await?;
    Message::require(message_id).await
}
