// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{insert_impl, secondary_find_impl, update_impl};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{id, raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Slash-hierarchical label scoped to one mailbox; `(slug, mailbox)` is
/// unique. Parents implicitly exist for every label (created on demand).
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 11, version = 1)]
#[native_db(primary_key(pk -> String), secondary_key(slug_key -> String, unique))]
pub struct Label {
    #[secondary_key(unique)]
    pub id: u64,

    #[secondary_key]
    pub mailbox_id: u64,

    /// Slash-delimited hierarchical name, e.g. "Work/Projects/Urgent".
    pub name: String,

    /// Slug of the full name, slashes folded into dashes.
    pub slug: String,

    /// Hex display color, e.g. "#2196f3".
    pub color: String,

    pub description: String,

    /// Labels created by importers rather than users.
    pub is_auto: bool,

    /// Threads carrying this label.
    pub thread_ids: Vec<u64>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Django-style slug: lowercased, non-alphanumeric runs folded into single
/// dashes. Slashes are replaced by dashes beforehand so "A/B" and "A B"
/// cannot collide with "a-b" accidentally surviving as distinct labels.
pub fn slugify(name: &str) -> String {
    let replaced = name.replace('/', "-");
    let mut slug = String::with_capacity(replaced.len());
    let mut last_dash = true;
    for c in replaced.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

impl Label {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    fn slug_key(&self) -> String {
        format!("{}:{}", self.mailbox_id, self.slug)
    }

    pub fn new(
        mailbox_id: u64,
        name: &str,
        color: &str,
        description: &str,
        is_auto: bool,
    ) -> Self {
        Self {
            id: id!(64),
            mailbox_id,
            name: name.to_string(),
            slug: slugify(name),
            color: color.to_string(),
            description: description.to_string(),
            is_auto,
            thread_ids: Vec::new(),
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    /// Number of slashes in the name; roots have depth 0.
    pub fn depth(&self) -> usize {
        self.name.matches('/').count()
    }

    /// Last segment of the name.
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Name prefix up to the last slash, None for roots.
    pub fn parent_name(&self) -> Option<String> {
        self.name.rsplit_once('/').map(|(parent, _)| parent.to_string())
    }

    pub async fn get(id: u64) -> MailroomResult<Option<Label>> {
        secondary_find_impl(DB_MANAGER.meta_db(), LabelKey::id, id).await
    }

    pub async fn require(id: u64) -> MailroomResult<Label> {
        Self::get(id).await?.ok_or_else(|| {
            raise_error!(
                format!("Label with id={} not found", id),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn find_by_slug(mailbox_id: u64, slug: &str) -> MailroomResult<Option<Label>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            LabelKey::slug_key,
            format!("{}:{}", mailbox_id, slug),
        )
        .await
    }

    pub async fn save(self) -> MailroomResult<()> {
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn update_with(
        id: u64,
        apply: impl FnOnce(&mut Label) + Send + 'static,
    ) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<Label>(LabelKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Label with id={} not found", id),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Work/Projects/Urgent"), "work-projects-urgent");
        assert_eq!(slugify("Hello  World"), "hello-world");
        assert_eq!(slugify("a_b"), "a-b");
    }

    #[test]
    fn test_hierarchy_accessors() {
        let label = Label::new(1, "Work/Projects/Urgent", "#fff", "", false);
        assert_eq!(label.depth(), 2);
        assert_eq!(label.basename(), "Urgent");
        assert_eq!(label.parent_name().as_deref(), Some("Work/Projects"));

        let root = Label::new(1, "Work", "#fff", "", false);
        assert_eq!(root.depth(), 0);
        assert_eq!(root.parent_name(), None);
    }
}
