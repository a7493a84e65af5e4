// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{
    filter_by_secondary_key_impl, insert_impl, secondary_find_impl, update_impl, upsert_impl,
};
use crate::modules::domain::entity::MailDomain;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{id, raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A server-side addressable inbox, `local_part@domain`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 2, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(address -> String, unique))]
pub struct Mailbox {
    #[secondary_key(unique)]
    pub id: u64,

    pub local_part: String,

    #[secondary_key]
    pub domain_id: u64,

    /// Denormalized domain name; `(local_part, domain)` is unique through
    /// the derived `address` key.
    pub domain_name: String,

    /// The mailbox's own Contact, used for display on sent messages.
    pub contact_id: Option<u64>,

    /// When set, this mailbox is an alias of another mailbox.
    pub alias_of: Option<u64>,

    /// Identity mailboxes mirror a user in the identity provider.
    pub is_identity: bool,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum MailboxRole {
    #[default]
    Viewer,
    Editor,
    Sender,
    Admin,
}

impl MailboxRole {
    /// Whether this role may author and send mail from the mailbox.
    pub fn can_send(&self) -> bool {
        matches!(
            self,
            MailboxRole::Editor | MailboxRole::Sender | MailboxRole::Admin
        )
    }
}

/// Grants `user_id` a role on a mailbox; `(mailbox, user)` is unique.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 3, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(access_key -> String, unique))]
pub struct MailboxAccess {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    pub user_id: u64,

    pub role: MailboxRole,

    /// Tracked for usage metrics.
    pub accessed_at: i64,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Mailbox {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain_name)
    }

    pub fn new(local_part: &str, domain: &MailDomain) -> Self {
        Self {
            id: id!(64),
            local_part: local_part.to_ascii_lowercase(),
            domain_id: domain.id,
            domain_name: domain.name.clone(),
            contact_id: None,
            alias_of: None,
            is_identity: false,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<Mailbox>> {
        secondary_find_impl(DB_MANAGER.meta_db(), MailboxKey::id, id).await
    }

    /// Resolves `alice@example.com` to the mailbox serving that address.
    pub async fn get_by_address(email: &str) -> MailroomResult<Option<Mailbox>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            MailboxKey::address,
            email.to_ascii_lowercase(),
        )
        .await
    }

    pub async fn require_by_address(email: &str) -> MailroomResult<Mailbox> {
        Self::get_by_address(email).await?.ok_or_else(|| {
            raise_error!(
                format!("No mailbox serves the address '{}'", email),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn list_for_domain(domain_id: u64) -> MailroomResult<Vec<Mailbox>> {
        filter_by_secondary_key_impl(DB_MANAGER.meta_db(), MailboxKey::domain_id, domain_id).await
    }

    pub async fn save(self) -> MailroomResult<()> {
        if Self::get_by_address(&self.address()).await?.is_some() {
            return Err(raise_error!(
                format!("Mailbox '{}' already exists.", self.address()),
                ErrorCode::AlreadyExists
            ));
        }
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn set_self_contact(id: u64, contact_id: u64) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<Mailbox>(MailboxKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Mailbox with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.contact_id = Some(contact_id);
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

}

impl MailboxAccess {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn access_key(&self) -> String {
        format!("{}:{}", self.mailbox_id, self.user_id)
    }

    pub fn new(mailbox_id: u64, user_id: u64, role: MailboxRole) -> Self {
        Self {
            id: id!(64),
            mailbox_id,
            user_id,
            role,
            accessed_at: Default::default(),
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(mailbox_id: u64, user_id: u64) -> MailroomResult<Option<MailboxAccess>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            MailboxAccessKey::access_key,
            format!("{}:{}", mailbox_id, user_id),
        )
        .await
    }

    pub async fn list_for_mailbox(mailbox_id: u64) -> MailroomResult<Vec<MailboxAccess>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.meta_db(),
            MailboxAccessKey::mailbox_id,
            mailbox_id,
        )
        .await
    }

    pub async fn save(self) -> MailroomResult<()> {
        upsert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn touch(mailbox_id: u64, user_id: u64) -> MailroomResult<()> {
        let key = format!("{}:{}", mailbox_id, user_id);
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<MailboxAccess>(MailboxAccessKey::access_key, key)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!("Mailbox access not found".into(), ErrorCode::ResourceNotFound)
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.accessed_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }
}
