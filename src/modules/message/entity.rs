// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{
    filter_by_secondary_key_impl, insert_impl, secondary_find_impl, update_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{id, raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// One mail inside a thread. Once sent (`is_draft` flipped to false) the row
/// is immutable except for per-recipient delivery bookkeeping and the user
/// flags below.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 7, version = 1)]
#[native_db(
    primary_key(pk -> String),
    secondary_key(dedup_key -> String, unique),
    secondary_key(thread_key -> String)
)]
pub struct Message {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    #[secondary_key]
    pub thread_id: u64,

    pub subject: String,

    /// The sending correspondent, scoped to this mailbox's address book.
    pub sender_contact_id: u64,

    /// The message this one replies to, when it lives in the same store.
    pub parent_id: Option<u64>,

    pub is_draft: bool,
    pub is_sender: bool,
    pub is_starred: bool,
    pub is_trashed: bool,
    pub is_unread: bool,
    pub is_spam: bool,
    pub is_archived: bool,
    pub has_attachments: bool,

    pub sent_at: Option<i64>,
    pub read_at: Option<i64>,
    pub archived_at: Option<i64>,
    pub trashed_at: Option<i64>,

    /// RFC 5322 Message-ID without angle brackets; the per-mailbox
    /// deduplication key.
    pub mime_id: String,

    /// Raw finalized MIME.
    pub blob_id: Option<u64>,

    /// Arbitrary draft body bytes while still a draft.
    pub draft_blob_id: Option<u64>,

    /// Signature template referenced by the draft, verified again at send.
    pub signature_template_id: Option<u64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Message {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn dedup_key(&self) -> String {
        format!("{}:{}", self.mailbox_id, self.mime_id)
    }

    fn thread_key(&self) -> String {
        format!("{:020}_{:020}_{:020}", self.thread_id, self.created_at, self.id)
    }

    pub async fn get(id: u64) -> MailroomResult<Option<Message>> {
        secondary_find_impl(DB_MANAGER.meta_db(), MessageKey::id, id).await
    }

    pub async fn require(id: u64) -> MailroomResult<Message> {
        Self::get(id).await?.ok_or_else(|| {
            raise_error!(
                format!("Message with id={} not found", id),
                ErrorCode::ResourceNotFound
            )
        })
    }

    /// Per-mailbox dedup lookup (the I2 idempotence key).
    pub async fn find_by_mime_id(
        mailbox_id: u64,
        mime_id: &str,
    ) -> MailroomResult<Option<Message>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            MessageKey::dedup_key,
            format!("{}:{}", mailbox_id, mime_id),
        )
        .await
    }

    /// All messages of a thread ordered by creation time.
    pub async fn list_for_thread(thread_id: u64) -> MailroomResult<Vec<Message>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.meta_db(),
            MessageKey::thread_key,
            format!("{:020}_", thread_id),
        )
        .await
    }

    pub async fn list_for_mailbox(mailbox_id: u64) -> MailroomResult<Vec<Message>> {
        filter_by_secondary_key_impl(DB_MANAGER.meta_db(), MessageKey::mailbox_id, mailbox_id).await
    }

    pub async fn save(self) -> MailroomResult<()> {
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn update_with(
        id: u64,
        apply: impl FnOnce(&mut Message) + Send + 'static,
    ) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<Message>(MessageKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Message with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                apply(&mut updated);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    /// Flag mutations pair the boolean with its timestamp; thread stats must
    /// be recomputed by the caller afterwards.
    pub async fn set_unread(id: u64, is_unread: bool) -> MailroomResult<()> {
        Self::update_with(id, move |message| {
            message.is_unread = is_unread;
            message.read_at = (!is_unread).then(|| utc_now!());
        })
        .await
    }

    pub async fn set_starred(id: u64, is_starred: bool) -> MailroomResult<()> {
        Self::update_with(id, move |message| {
            message.is_starred = is_starred;
        })
        .await
    }

    pub async fn set_trashed(id: u64, is_trashed: bool) -> MailroomResult<()> {
        Self::update_with(id, move |message| {
            message.is_trashed = is_trashed;
            message.trashed_at = is_trashed.then(|| utc_now!());
        })
        .await
    }

    pub async fn set_archived(id: u64, is_archived: bool) -> MailroomResult<()> {
        Self::update_with(id, move |message| {
            message.is_archived = is_archived;
            message.archived_at = is_archived.then(|| utc_now!());
        })
        .await
    }

    pub async fn set_spam(id: u64, is_spam: bool) -> MailroomResult<()> {
        Self::update_with(id, move |message| {
            message.is_spam = is_spam;
        })
        .await
    }
}
