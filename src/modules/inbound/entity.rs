// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{
    delete_impl, insert_impl, list_all_impl, secondary_find_impl, update_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{id, raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// The spam-processing queue: one row per accepted inbound message, deleted
/// on successful ingestion. Failed rows keep their error and are rescanned.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 14, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct InboundMessage {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    pub raw_data: Vec<u8>,

    pub error_message: Option<String>,

    /// Import context carried through retries.
    pub is_import: bool,
    pub is_import_sender: bool,
    pub imap_labels: Vec<String>,
    pub imap_flags: Vec<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl InboundMessage {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn new(mailbox_id: u64, raw_data: Vec<u8>) -> Self {
        Self {
            id: id!(64),
            mailbox_id,
            raw_data,
            error_message: None,
            is_import: false,
            is_import_sender: false,
            imap_labels: Vec::new(),
            imap_flags: Vec::new(),
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<InboundMessage>> {
        secondary_find_impl(DB_MANAGER.meta_db(), InboundMessageKey::id, id).await
    }

    pub async fn save(self) -> MailroomResult<()> {
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn list_all() -> MailroomResult<Vec<InboundMessage>> {
        list_all_impl(DB_MANAGER.meta_db()).await
    }

    pub async fn set_error(id: u64, error_message: String) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<InboundMessage>(InboundMessageKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Inbound message with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.error_message = Some(error_message);
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
                .secondary::<InboundMessage>(InboundMessageKey::id, id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Inbound message with id={} not found", id),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }
}
