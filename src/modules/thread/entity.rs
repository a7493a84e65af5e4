// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{
    filter_by_secondary_key_impl, insert_impl, secondary_find_impl, update_impl, upsert_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{id, raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A user-visible conversation. The denormalized flags are an aggregation
/// over the thread's messages, recomputed by the stats module whenever
/// membership or any message flag changes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 5, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct Thread {
    #[secondary_key(unique)]
    pub id: u64,

    /// Subject of the first message, stored verbatim.
    pub subject: String,

    /// Plain-text preview of the latest message body.
    pub snippet: String,

    /// Creation time of the most recent non-trashed message.
    pub messaged_at: Option<i64>,

    /// First and last distinct active sender names, at most two.
    pub sender_names: Vec<String>,

    pub has_unread: bool,
    pub has_trashed: bool,
    pub has_draft: bool,
    pub has_starred: bool,
    pub has_sender: bool,
    pub has_attachments: bool,
    pub has_active: bool,
    pub has_messages: bool,
    pub is_spam: bool,

    /// Optional model-generated summary; never computed here.
    pub summary: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum ThreadRole {
    #[default]
    Viewer,
    Editor,
}

/// Grants a mailbox visibility of a thread; `(thread, mailbox)` is unique.
/// `origin` records the ingress path that created the grant.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 6, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(access_key -> String, unique))]
pub struct ThreadAccess {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub thread_id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    pub role: ThreadRole,

    pub origin: String,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Thread {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn new(subject: &str) -> Self {
        Self {
            id: id!(64),
            subject: subject.to_string(),
            snippet: String::new(),
            messaged_at: None,
            sender_names: Vec::new(),
            has_unread: false,
            has_trashed: false,
            has_draft: false,
            has_starred: false,
            has_sender: false,
            has_attachments: false,
            has_active: false,
            has_messages: false,
            is_spam: false,
            summary: None,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<Thread>> {
        secondary_find_impl(DB_MANAGER.meta_db(), ThreadKey::id, id).await
    }

    pub async fn require(id: u64) -> MailroomResult<Thread> {
        Self::get(id).await?.ok_or_else(|| {
            raise_error!(
                format!("Thread with id={} not found", id),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn save(self) -> MailroomResult<()> {
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn apply_stats(id: u64, stats: crate::modules::thread::stats::ThreadStats) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<Thread>(ThreadKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Thread with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.has_unread = stats.has_unread;
                updated.has_trashed = stats.has_trashed;
                updated.has_draft = stats.has_draft;
                updated.has_starred = stats.has_starred;
                updated.has_sender = stats.has_sender;
                updated.has_attachments = stats.has_attachments;
                updated.has_active = stats.has_active;
                updated.has_messages = stats.has_messages;
                updated.is_spam = stats.is_spam;
                updated.messaged_at = stats.messaged_at;
                updated.sender_names = stats.sender_names.clone();
                updated.snippet = stats.snippet.clone();
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }
}

impl ThreadAccess {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn access_key(&self) -> String {
        format!("{}:{}", self.thread_id, self.mailbox_id)
    }

    pub fn new(thread_id: u64, mailbox_id: u64, role: ThreadRole, origin: &str) -> Self {
        Self {
            id: id!(64),
            thread_id,
            mailbox_id,
            role,
            origin: origin.to_string(),
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(thread_id: u64, mailbox_id: u64) -> MailroomResult<Option<ThreadAccess>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            ThreadAccessKey::access_key,
            format!("{}:{}", thread_id, mailbox_id),
        )
        .await
    }

    pub async fn list_for_thread(thread_id: u64) -> MailroomResult<Vec<ThreadAccess>> {
        filter_by_secondary_key_impl(DB_MANAGER.meta_db(), ThreadAccessKey::thread_id, thread_id)
            .await
    }

    pub async fn list_for_mailbox(mailbox_id: u64) -> MailroomResult<Vec<ThreadAccess>> {
        filter_by_secondary_key_impl(DB_MANAGER.meta_db(), ThreadAccessKey::mailbox_id, mailbox_id)
            .await
    }

    /// Grants access if missing; an existing grant keeps its role (grants are
    /// never silently downgraded).
    pub async fn ensure(
        thread_id: u64,
        mailbox_id: u64,
        role: ThreadRole,
        origin: &str,
    ) -> MailroomResult<()> {
        if let Some(existing) = Self::get(thread_id, mailbox_id).await? {
            if existing.role == ThreadRole::Viewer && role == ThreadRole::Editor {
                let mut upgraded = existing;
                upgraded.role = ThreadRole::Editor;
                upgraded.updated_at = utc_now!();
                return upsert_impl(DB_MANAGER.meta_db(), upgraded).await;
            }
            return Ok(());
        }
        insert_impl(
            DB_MANAGER.meta_db(),
            Self::new(thread_id, mailbox_id, role, origin),
        )
        .await
    }
}
