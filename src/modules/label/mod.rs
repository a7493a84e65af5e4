// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod entity;

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{batch_delete_impl, batch_update_impl, filter_by_secondary_key_impl};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::label::entity::{slugify, Label, LabelKey};
use crate::modules::mailbox::entity::{MailboxAccess, MailboxRole};
use crate::modules::thread::entity::ThreadAccess;
use crate::{raise_error, utc_now};
use serde::Serialize;

/// One node of the label tree returned by listings: the label itself plus
/// its children ordered by slug.
#[derive(Clone, Debug, Serialize)]
pub struct LabelNode {
    pub label: Label,
    pub children: Vec<LabelNode>,
}

/// Creates a label, materializing any missing ancestors with the child's
/// color. Existing parents are left untouched.
pub async fn create_label(
    mailbox_id: u64,
    name: &str,
    color: &str,
    description: &str,
    is_auto: bool,
) -> MailroomResult<Label> {
    let name = name.trim_matches('/');
    if name.is_empty() {
        return Err(raise_error!(
            "Label name cannot be empty".into(),
            ErrorCode::ValidationFailed
        ));
    }

    if Label::find_by_slug(mailbox_id, &slugify(name)).await?.is_some() {
        return Err(raise_error!(
            format!("A label with the name '{}' already exists", name),
            ErrorCode::AlreadyExists
        ));
    }

    // Ancestors first, from the root down.
    let segments: Vec<&str> = name.split('/').collect();
    for depth in 1..segments.len() {
        let parent_name = segments[..depth].join("/");
        if Label::find_by_slug(mailbox_id, &slugify(&parent_name))
            .await?
            .is_none()
        {
            Label::new(mailbox_id, &parent_name, color, "", is_auto)
                .save()
                .await?;
        }
    }

    let label = Label::new(mailbox_id, name, color, description, is_auto);
    let created = label.clone();
    label.save().await?;
    Ok(created)
}

/// Renames a label and rewrites the name prefix of every descendant.
pub async fn rename_label(mailbox_id: u64, label_id: u64, new_name: &str) -> MailroomResult<Label> {
    let label = Label::require(label_id).await?;
    if label.mailbox_id != mailbox_id {
        return Err(raise_error!(
            "Label does not belong to this mailbox".into(),
            ErrorCode::PermissionDenied
        ));
    }
    let new_name = new_name.trim_matches('/').to_string();
    if new_name.is_empty() {
        return Err(raise_error!(
            "Label name cannot be empty".into(),
            ErrorCode::ValidationFailed
        ));
    }
    if let Some(existing) = Label::find_by_slug(mailbox_id, &slugify(&new_name)).await? {
        if existing.id != label_id {
            return Err(raise_error!(
                format!("A label with the name '{}' already exists", new_name),
                ErrorCode::AlreadyExists
            ));
        }
    }

    let old_name = label.name.clone();
    let old_prefix = format!("{}/", old_name);
    let renamed_name = new_name.clone();
    batch_update_impl::<Label>(
        DB_MANAGER.meta_db(),
        move |rw| {
            let labels: Vec<Label> = rw
                .scan()
                .secondary(LabelKey::mailbox_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .start_with(mailbox_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .filter_map(|entry| entry.ok())
                .filter(|l: &Label| l.id == label_id || l.name.starts_with(&old_prefix))
                .collect();
            Ok(labels)
        },
        move |targets| {
            let mut updates = Vec::new();
            for target in targets.iter() {
                let mut updated = target.clone();
                updated.name = if target.id == label_id {
                    renamed_name.clone()
                } else {
                    format!(
                        "{}/{}",
                        renamed_name,
                        &target.name[old_name.len() + 1..]
                    )
                };
                updated.slug = slugify(&updated.name);
                updated.updated_at = utc_now!();
                updates.push((target.clone(), updated));
            }
            Ok(updates)
        },
    )
    .await?;

    Label::require(label_id).await
}

/// Deletes a label and every descendant. Thread associations go with the
/// labels; the threads themselves persist.
pub async fn delete_label(mailbox_id: u64, label_id: u64) -> MailroomResult<usize> {
    let label = Label::require(label_id).await?;
    if label.mailbox_id != mailbox_id {
        return Err(raise_error!(
            "Label does not belong to this mailbox".into(),
            ErrorCode::PermissionDenied
        ));
    }
    let prefix = format!("{}/", label.name);
    batch_delete_impl::<Label>(DB_MANAGER.meta_db(), move |rw| {
        let labels: Vec<Label> = rw
            .scan()
            .secondary(LabelKey::mailbox_id)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
            .start_with(mailbox_id)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
            .filter_map(|entry| entry.ok())
            .filter(|l: &Label| l.id == label_id || l.name.starts_with(&prefix))
            .collect();
        Ok(labels)
    })
    .await
}

/// Adds threads to a label. Requires a sending role on the label's mailbox
/// and at least viewer access on every thread.
pub async fn add_threads(
    label_id: u64,
    thread_ids: &[u64],
    acting_user_id: u64,
) -> MailroomResult<()> {
    let label = Label::require(label_id).await?;
    require_label_role(&label, acting_user_id).await?;
    for thread_id in thread_ids {
        if ThreadAccess::get(*thread_id, label.mailbox_id).await?.is_none() {
            return Err(raise_error!(
                format!("Thread {} is not visible to this mailbox", thread_id),
                ErrorCode::PermissionDenied
            ));
        }
    }
    let thread_ids = thread_ids.to_vec();
    Label::update_with(label_id, move |label| {
        for thread_id in &thread_ids {
            if !label.thread_ids.contains(thread_id) {
                label.thread_ids.push(*thread_id);
            }
        }
    })
    .await
}

pub async fn remove_threads(
    label_id: u64,
    thread_ids: &[u64],
    acting_user_id: u64,
) -> MailroomResult<()> {
    let label = Label::require(label_id).await?;
    require_label_role(&label, acting_user_id).await?;
    let thread_ids = thread_ids.to_vec();
    Label::update_with(label_id, move |label| {
        label.thread_ids.retain(|t| !thread_ids.contains(t));
    })
    .await
}

async fn require_label_role(label: &Label, acting_user_id: u64) -> MailroomResult<()> {
    let access = MailboxAccess::get(label.mailbox_id, acting_user_id)
        .await?
        .ok_or_else(|| {
            raise_error!(
                "No access to the label's mailbox".into(),
                ErrorCode::PermissionDenied
            )
        })?;
    if !matches!(
        access.role,
        MailboxRole::Editor | MailboxRole::Sender | MailboxRole::Admin
    ) {
        return Err(raise_error!(
            "Editing labels requires an editor, sender or admin role".into(),
            ErrorCode::PermissionDenied
        ));
    }
    Ok(())
}

/// Labels of one mailbox as a tree: roots ordered by slug, each node's
/// children ordered by slug.
pub async fn list_tree(mailbox_id: u64) -> MailroomResult<Vec<LabelNode>> {
    let mut labels: Vec<Label> = filter_by_secondary_key_impl(
        DB_MANAGER.meta_db(),
        LabelKey::mailbox_id,
        mailbox_id,
    )
    .await?;
    labels.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(build_tree(&labels, None))
}

fn build_tree(labels: &[Label], parent_name: Option<&str>) -> Vec<LabelNode> {
    labels
        .iter()
        .filter(|label| match parent_name {
            None => label.depth() == 0,
            Some(parent) => {
                label.parent_name().as_deref() == Some(parent)
            }
        })
        .map(|label| LabelNode {
            label: label.clone(),
            children: build_tree(labels, Some(&label.name)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &str) -> Label {
        Label::new(1, name, "#ff0000", "", false)
    }

    #[test]
    fn test_build_tree_orders_roots_and_children_by_slug() {
        let mut labels = vec![
            label("Work"),
            label("Work/Projects"),
            label("Work/Meetings"),
            label("Archive"),
        ];
        labels.sort_by(|a, b| a.slug.cmp(&b.slug));
        let tree = build_tree(&labels, None);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].label.name, "Archive");
        assert_eq!(tree[1].label.name, "Work");
        let children: Vec<&str> = tree[1]
            .children
            .iter()
            .map(|node| node.label.name.as_str())
            .collect();
        assert_eq!(children, vec!["Work/Meetings", "Work/Projects"]);
    }
}
