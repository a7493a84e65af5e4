// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{insert_impl, secondary_find_impl};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{id, raise_error, sha256_hex, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Immutable content-addressed bytes owned by one mailbox. The sha256 is
/// computed over the decoded content, so identical payloads are stored once
/// per mailbox regardless of transfer encoding.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 9, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(content_key -> String, unique))]
pub struct Blob {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    /// Hex SHA-256 of the decoded content.
    pub sha256: String,

    pub size: u64,

    pub content_type: String,

    /// Raw decoded bytes. Kept inline today; the content address leaves room
    /// to offload to an object store later.
    pub raw_content: Vec<u8>,

    pub size_compressed: Option<u64>,
    pub compression: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Blob {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn content_key(&self) -> String {
        format!("{}:{}", self.mailbox_id, self.sha256)
    }

    pub fn new(mailbox_id: u64, content: Vec<u8>, content_type: &str) -> Self {
        let sha256 = sha256_hex!(&content);
        Self {
            id: id!(64),
            mailbox_id,
            sha256,
            size: content.len() as u64,
            content_type: content_type.to_string(),
            raw_content: content,
            size_compressed: None,
            compression: None,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<Blob>> {
        secondary_find_impl(DB_MANAGER.meta_db(), BlobKey::id, id).await
    }

    pub async fn require(id: u64) -> MailroomResult<Blob> {
        Self::get(id).await?.ok_or_else(|| {
            raise_error!(
                format!("Blob with id={} not found", id),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn find_by_content(
        mailbox_id: u64,
        sha256: &str,
    ) -> MailroomResult<Option<Blob>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            BlobKey::content_key,
            format!("{}:{}", mailbox_id, sha256),
        )
        .await
    }

    /// Content-addressed insert: reuses the mailbox's existing blob when the
    /// same bytes are already stored.
    pub async fn get_or_create(
        mailbox_id: u64,
        content: Vec<u8>,
        content_type: &str,
    ) -> MailroomResult<Blob> {
        let sha256 = sha256_hex!(&content);
        if let Some(existing) = Self::find_by_content(mailbox_id, &sha256).await? {
            return Ok(existing);
        }
        let blob = Self::new(mailbox_id, content, content_type);
        insert_impl(DB_MANAGER.meta_db(), blob.clone()).await?;
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_is_of_decoded_content() {
        let blob = Blob::new(1, b"hello world".to_vec(), "text/plain");
        assert_eq!(
            blob.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(blob.size, 11);
    }
}
