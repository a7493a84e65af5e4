// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{
    delete_impl, filter_by_secondary_key_impl, insert_impl, secondary_find_impl, update_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{id, raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A named handle on a Blob, attachable to any number of messages in the
/// owning mailbox. Inline images carry the `cid` referenced from HTML bodies.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 10, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct Attachment {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    /// Sanitized file name, safe to echo into Content-Disposition.
    pub name: String,

    pub blob_id: u64,

    /// Content-ID for inline images.
    pub cid: Option<String>,

    /// Messages this attachment is attached to.
    pub message_ids: Vec<u64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Attachment {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn new(mailbox_id: u64, name: &str, blob_id: u64, cid: Option<String>) -> Self {
        Self {
            id: id!(64),
            mailbox_id,
            name: name.to_string(),
            blob_id,
            cid,
            message_ids: Vec::new(),
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<Attachment>> {
        secondary_find_impl(DB_MANAGER.meta_db(), AttachmentKey::id, id).await
    }

    pub async fn save(self) -> MailroomResult<()> {
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn list_for_mailbox(mailbox_id: u64) -> MailroomResult<Vec<Attachment>> {
        filter_by_secondary_key_impl(DB_MANAGER.meta_db(), AttachmentKey::mailbox_id, mailbox_id)
            .await
    }

    pub async fn list_for_message(
        mailbox_id: u64,
        message_id: u64,
    ) -> MailroomResult<Vec<Attachment>> {
        let all = Self::list_for_mailbox(mailbox_id).await?;
        Ok(all
            .into_iter()
            .filter(|attachment| attachment.message_ids.contains(&message_id))
            .collect())
    }

    pub async fn attach_to_message(id: u64, message_id: u64) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<Attachment>(AttachmentKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Attachment with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                if !updated.message_ids.contains(&message_id) {
                    updated.message_ids.push(message_id);
                }
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn detach_from_message(id: u64, message_id: u64) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<Attachment>(AttachmentKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Attachment with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.message_ids.retain(|m| *m != message_id);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn delete(id: u64) -> MailroomResult<()> {
        delete_impl(DB_MANAGER.meta_db(), move |rw| {
            rw.get()
                .secondary::<Attachment>(AttachmentKey::id, id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Attachment with id={} not found", id),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }
}
