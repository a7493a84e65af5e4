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

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum TemplateKind {
    #[default]
    Message,
    Signature,
}

impl TemplateKind {
    pub fn code(&self) -> u8 {
        match self {
            TemplateKind::Message => 1,
            TemplateKind::Signature => 2,
        }
    }
}

/// A reusable message or signature body, scoped to either one mailbox or a
/// whole mail domain. At most one template per (scope, kind) may be forced.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 12, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(scope_key -> String))]
pub struct MessageTemplate {
    #[secondary_key(unique)]
    pub id: u64,

    /// Exactly one of `mailbox_id` / `maildomain_id` is set.
    pub mailbox_id: Option<u64>,
    pub maildomain_id: Option<u64>,

    pub kind: TemplateKind,

    pub is_active: bool,

    /// A forced template is applied even when the draft names no signature.
    pub is_forced: bool,

    pub html_body: Option<String>,
    pub text_body: Option<String>,

    /// Opaque editor state as JSON.
    pub raw_body: Option<String>,

    /// Canonical storage of the rendered body.
    pub blob_id: Option<u64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl MessageTemplate {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn scope_key(&self) -> String {
        match (self.mailbox_id, self.maildomain_id) {
            (Some(mailbox_id), _) => format!("m{}:{}", mailbox_id, self.kind.code()),
            (None, Some(domain_id)) => format!("d{}:{}", domain_id, self.kind.code()),
            (None, None) => format!("orphan:{}", self.kind.code()),
        }
    }

    pub fn new_signature(
        mailbox_id: Option<u64>,
        maildomain_id: Option<u64>,
        text_body: Option<String>,
        html_body: Option<String>,
    ) -> Self {
        Self {
            id: id!(64),
            mailbox_id,
            maildomain_id,
            kind: TemplateKind::Signature,
            is_active: true,
            is_forced: false,
            html_body,
            text_body,
            raw_body: None,
            blob_id: None,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<MessageTemplate>> {
        secondary_find_impl(DB_MANAGER.meta_db(), MessageTemplateKey::id, id).await
    }

    pub async fn list_for_mailbox_scope(
        mailbox_id: u64,
        kind: TemplateKind,
    ) -> MailroomResult<Vec<MessageTemplate>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.meta_db(),
            MessageTemplateKey::scope_key,
            format!("m{}:{}", mailbox_id, kind.code()),
        )
        .await
    }

    pub async fn list_for_domain_scope(
        maildomain_id: u64,
        kind: TemplateKind,
    ) -> MailroomResult<Vec<MessageTemplate>> {
        filter_by_secondary_key_impl(
            DB_MANAGER.meta_db(),
            MessageTemplateKey::scope_key,
            format!("d{}:{}", maildomain_id, kind.code()),
        )
        .await
    }

    /// The forced active template of the scope, if any.
    pub async fn forced_for_scope(
        mailbox_id: u64,
        maildomain_id: u64,
        kind: TemplateKind,
    ) -> MailroomResult<Option<MessageTemplate>> {
        let mut scoped = Self::list_for_mailbox_scope(mailbox_id, kind).await?;
        scoped.extend(Self::list_for_domain_scope(maildomain_id, kind).await?);
        Ok(scoped
            .into_iter()
            .find(|template| template.is_forced && template.is_active))
    }

    /// Whether this template's scope covers the given mailbox.
    pub fn covers_mailbox(&self, mailbox_id: u64, maildomain_id: u64) -> bool {
        match (self.mailbox_id, self.maildomain_id) {
            (Some(scoped_mailbox), _) => scoped_mailbox == mailbox_id,
            (None, Some(scoped_domain)) => scoped_domain == maildomain_id,
            (None, None) => false,
        }
    }

    pub async fn save(self) -> MailroomResult<()> {
        if self.mailbox_id.is_none() && self.maildomain_id.is_none() {
            return Err(raise_error!(
                "A template must be scoped to a mailbox or a mail domain".into(),
                ErrorCode::ValidationFailed
            ));
        }
        if self.is_forced {
            let scoped = filter_by_secondary_key_impl::<MessageTemplate>(
                DB_MANAGER.meta_db(),
                MessageTemplateKey::scope_key,
                self.scope_key(),
            )
            .await?;
            if scoped.iter().any(|t| t.is_forced && t.id != self.id) {
                return Err(raise_error!(
                    "Another template is already forced for this scope".into(),
                    ErrorCode::AlreadyExists
                ));
            }
        }
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    /// Deactivating a forced template also clears `is_forced`.
    pub async fn set_active(id: u64, is_active: bool) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<MessageTemplate>(MessageTemplateKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Template with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.is_active = is_active;
                if !is_active {
                    updated.is_forced = false;
                }
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
                .secondary::<MessageTemplate>(MessageTemplateKey::id, id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Template with id={} not found", id),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }
}
