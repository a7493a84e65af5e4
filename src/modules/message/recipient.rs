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
use std::fmt;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum RecipientType {
    #[default]
    To,
    Cc,
    Bcc,
}

impl RecipientType {
    pub fn code(&self) -> u8 {
        match self {
            RecipientType::To => 1,
            RecipientType::Cc => 2,
            RecipientType::Bcc => 3,
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientType::To => write!(f, "to"),
            RecipientType::Cc => write!(f, "cc"),
            RecipientType::Bcc => write!(f, "bcc"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum DeliveryStatus {
    /// Delivered by the internal short-circuit, no SMTP hop.
    Internal,
    Sent,
    Failed,
    Retry,
}

impl DeliveryStatus {
    pub fn code(&self) -> u32 {
        match self {
            DeliveryStatus::Internal => 1,
            DeliveryStatus::Sent => 2,
            DeliveryStatus::Failed => 3,
            DeliveryStatus::Retry => 4,
        }
    }
}

/// Per-recipient delivery bookkeeping for one message;
/// `(message, contact, type)` is unique.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 8, version = 1)]
#[native_db(
    primary_key(pk -> String),
    secondary_key(recipient_key -> String, unique),
    secondary_key(status_code -> u32)
)]
pub struct MessageRecipient {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub message_id: u64,

    pub contact_id: u64,

    /// Denormalized for envelope building without a contact lookup.
    pub contact_email: String,

    pub kind: RecipientType,

    /// None until a delivery attempt concludes; drafts stay None.
    pub delivery_status: Option<DeliveryStatus>,

    pub delivery_message: Option<String>,

    pub delivered_at: Option<i64>,

    pub retry_at: Option<i64>,

    pub retry_count: u32,

    pub created_at: i64,
    pub updated_at: i64,
}

impl MessageRecipient {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn recipient_key(&self) -> String {
        format!("{}:{}:{}", self.message_id, self.contact_id, self.kind.code())
    }

    fn status_code(&self) -> u32 {
        self.delivery_status.map(|s| s.code()).unwrap_or(0)
    }

    pub fn new(
        message_id: u64,
        contact_id: u64,
        contact_email: &str,
        kind: RecipientType,
        delivery_status: Option<DeliveryStatus>,
    ) -> Self {
        Self {
            id: id!(64),
            message_id,
            contact_id,
            contact_email: contact_email.to_ascii_lowercase(),
            kind,
            delivery_status,
            delivery_message: None,
            delivered_at: None,
            retry_at: None,
            retry_count: 0,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<MessageRecipient>> {
        secondary_find_impl(DB_MANAGER.meta_db(), MessageRecipientKey::id, id).await
    }

    pub async fn find(
        message_id: u64,
        contact_id: u64,
        kind: RecipientType,
    ) -> MailroomResult<Option<MessageRecipient>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            MessageRecipientKey::recipient_key,
            format!("{}:{}:{}", message_id, contact_id, kind.code()),
        )
        .await
    }

    pub async fn list_for_message(message_id: u64) -> MailroomResult<Vec<MessageRecipient>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.meta_db(),
            MessageRecipientKey::message_id,
            message_id,
        )
        .await
    }

    /// All recipients parked in Retry, across messages. Scanned by the
    /// periodic retry task.
    pub async fn list_in_retry() -> MailroomResult<Vec<MessageRecipient>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.meta_db(),
            MessageRecipientKey::status_code,
            DeliveryStatus::Retry.code(),
        )
        .await
    }

    pub async fn save(self) -> MailroomResult<()> {
        if Self::find(self.message_id, self.contact_id, self.kind)
            .await?
            .is_some()
        {
            return Err(raise_error!(
                "Recipient already exists for this message".into(),
                ErrorCode::AlreadyExists
            ));
        }
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn set_delivery_state(
        id: u64,
        status: DeliveryStatus,
        delivery_message: Option<String>,
        retry_at: Option<i64>,
    ) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<MessageRecipient>(MessageRecipientKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Message recipient with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.delivery_status = Some(status);
                updated.delivery_message = delivery_message;
                match status {
                    DeliveryStatus::Sent | DeliveryStatus::Internal => {
                        updated.delivered_at = Some(utc_now!());
                        updated.retry_at = None;
                    }
                    DeliveryStatus::Retry => {
                        updated.retry_count += 1;
                        updated.retry_at = retry_at;
                    }
                    DeliveryStatus::Failed => {
                        updated.retry_at = None;
                    }
                }
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }
}
