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

/// One side of a correspondence inside a single mailbox's address book;
/// `(email, mailbox)` is unique.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 4, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(contact_key -> String, unique))]
pub struct Contact {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    pub email: String,

    pub name: String,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Contact {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn contact_key(&self) -> String {
        format!("{}:{}", self.mailbox_id, self.email)
    }

    pub fn new(mailbox_id: u64, email: &str, name: &str) -> Self {
        Self {
            id: id!(64),
            mailbox_id,
            email: email.to_ascii_lowercase(),
            name: name.to_string(),
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<Contact>> {
        secondary_find_impl(DB_MANAGER.meta_db(), ContactKey::id, id).await
    }

    pub async fn find(mailbox_id: u64, email: &str) -> MailroomResult<Option<Contact>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            ContactKey::contact_key,
            format!("{}:{}", mailbox_id, email.to_ascii_lowercase()),
        )
        .await
    }

    pub async fn list_for_mailbox(mailbox_id: u64) -> MailroomResult<Vec<Contact>> {
        filter_by_secondary_key_impl(DB_MANAGER.meta_db(), ContactKey::mailbox_id, mailbox_id).await
    }

    /// Looks the contact up by `(mailbox, email)`; creates it when missing.
    /// A non-empty display name on a later sighting refreshes a blank one.
    pub async fn get_or_create(
        mailbox_id: u64,
        email: &str,
        name: &str,
    ) -> MailroomResult<Contact> {
        if let Some(existing) = Self::find(mailbox_id, email).await? {
            if existing.name.is_empty() && !name.is_empty() {
                let name = name.to_string();
                let key = existing.contact_key();
                let refreshed_name = name.clone();
                update_impl(
                    DB_MANAGER.meta_db(),
                    move |rw| {
                        rw.get()
                            .secondary::<Contact>(ContactKey::contact_key, key)
                            .map_err(|e| {
                                raise_error!(format!("{:#?}", e), ErrorCode::InternalError)
                            })?
                            .ok_or_else(|| {
                                raise_error!(
                                    "Contact disappeared mid-update".into(),
                                    ErrorCode::InternalError
                                )
                            })
                    },
                    move |current| {
                        let mut updated = current.clone();
                        updated.name = name;
                        updated.updated_at = utc_now!();
                        Ok(updated)
                    },
                )
                .await?;
                let mut refreshed = existing;
                refreshed.name = refreshed_name;
                return Ok(refreshed);
            }
            return Ok(existing);
        }
        let contact = Self::new(mailbox_id, email, name);
        insert_impl(DB_MANAGER.meta_db(), contact.clone()).await?;
        Ok(contact)
    }
}
