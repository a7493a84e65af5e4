// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::cache::lock::LOCK_MANAGER;
use crate::modules::error::MailroomResult;
use crate::modules::mailbox::contact::Contact;
use crate::modules::message::entity::Message;
use crate::modules::thread::entity::Thread;

/// The denormalized aggregation of one thread's messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadStats {
    pub has_unread: bool,
    pub has_trashed: bool,
    pub has_draft: bool,
    pub has_starred: bool,
    pub has_sender: bool,
    pub has_attachments: bool,
    pub has_active: bool,
    pub has_messages: bool,
    pub is_spam: bool,
    pub messaged_at: Option<i64>,
    pub sender_names: Vec<String>,
    pub snippet: String,
}

/// Aggregates messages (ordered by creation time) into thread stats.
/// `sender_names` pairs each message with its resolved sender display name;
/// `snippet` is carried through unchanged.
pub fn compute_stats(
    messages: &[Message],
    sender_names: &[String],
    snippet: String,
) -> ThreadStats {
    if messages.is_empty() {
        return ThreadStats {
            snippet,
            ..Default::default()
        };
    }

    let has_unread = messages
        .iter()
        .any(|m| m.is_unread && !m.is_trashed);
    let has_trashed = messages.iter().any(|m| m.is_trashed);
    let has_draft = messages.iter().any(|m| m.is_draft && !m.is_trashed);
    let has_starred = messages.iter().any(|m| m.is_starred && !m.is_trashed);
    let has_sender = messages
        .iter()
        .any(|m| m.is_sender && !m.is_trashed && !m.is_draft);
    let has_attachments = messages
        .iter()
        .any(|m| m.has_attachments && !m.is_trashed);

    // Active messages are the ones a mailbox list actually shows.
    let active: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| !m.is_trashed && !m.is_spam)
        .map(|(i, _)| i)
        .collect();
    let has_messages = !active.is_empty();

    // The first message's flag governs the whole thread.
    let is_spam = messages[0].is_spam;

    let has_active = messages.iter().any(|m| {
        !m.is_sender && !m.is_spam && !m.is_archived && !m.is_trashed && !m.is_draft
    });

    let messaged_at = messages
        .iter()
        .filter(|m| !m.is_trashed)
        .map(|m| m.created_at)
        .max()
        .or_else(|| messages.iter().map(|m| m.created_at).max());

    // First and last sender of the active set, falling back to all messages.
    let (first_idx, last_idx) = if let (Some(first), Some(last)) = (active.first(), active.last()) {
        (*first, *last)
    } else {
        (0, messages.len() - 1)
    };
    let first_sender = sender_names.get(first_idx).cloned().unwrap_or_default();
    let last_sender = sender_names.get(last_idx).cloned().unwrap_or_default();
    let sender_names = if first_sender == last_sender || last_sender.is_empty() {
        vec![first_sender]
    } else {
        vec![first_sender, last_sender]
    };

    ThreadStats {
        has_unread,
        has_trashed,
        has_draft,
        has_starred,
        has_sender,
        has_attachments,
        has_active,
        has_messages,
        is_spam,
        messaged_at,
        sender_names,
        snippet,
    }
}

/// Recomputes and persists one thread's stats inside its per-thread critical
/// section. Concurrent updates serialize here, so the terminal state always
/// equals a sequential recomputation.
pub async fn update_stats(thread_id: u64) -> MailroomResult<()> {
    update_stats_with_snippet(thread_id, None).await
}

pub async fn update_stats_with_snippet(
    thread_id: u64,
    snippet: Option<String>,
) -> MailroomResult<()> {
    let mutex = LOCK_MANAGER.thread_mutex(thread_id);
    let _guard = mutex.lock().await;

    let thread = Thread::require(thread_id).await?;
    let messages = Message::list_for_thread(thread_id).await?;
    let mut sender_names = Vec::with_capacity(messages.len());
    for message in &messages {
        let name = match Contact::get(message.sender_contact_id).await? {
            Some(contact) if !contact.name.is_empty() => contact.name,
            Some(contact) => contact.email,
            None => String::new(),
        };
        sender_names.push(name);
    }

    let snippet = snippet.unwrap_or(thread.snippet);
    let stats = compute_stats(&messages, &sender_names, snippet);
    Thread::apply_stats(thread_id, stats).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(flags: (bool, bool, bool, bool, bool, bool, bool), created_at: i64) -> Message {
        let (is_draft, is_sender, is_starred, is_trashed, is_unread, is_spam, is_archived) = flags;
        Message {
            id: created_at as u64,
            created_at,
            is_draft,
            is_sender,
            is_starred,
            is_trashed,
            is_unread,
            is_spam,
            is_archived,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_thread_resets_everything() {
        let stats = compute_stats(&[], &[], String::new());
        assert!(!stats.has_unread);
        assert!(!stats.has_messages);
        assert_eq!(stats.messaged_at, None);
        assert!(stats.sender_names.is_empty());
    }

    #[test]
    fn test_unread_ignores_trashed() {
        // (draft, sender, starred, trashed, unread, spam, archived)
        let messages = vec![
            message((false, false, false, true, true, false, false), 1),
            message((false, false, false, false, false, false, false), 2),
        ];
        let names = vec!["a".into(), "b".into()];
        let stats = compute_stats(&messages, &names, String::new());
        assert!(!stats.has_unread);
        assert!(stats.has_trashed);
    }

    #[test]
    fn test_first_message_spam_flag_governs_thread() {
        let messages = vec![
            message((false, false, false, false, false, true, false), 1),
            message((false, false, false, false, false, false, false), 2),
        ];
        let names = vec!["a".into(), "b".into()];
        let stats = compute_stats(&messages, &names, String::new());
        assert!(stats.is_spam);
        // The ham second message still counts for has_messages.
        assert!(stats.has_messages);
    }

    #[test]
    fn test_messaged_at_falls_back_to_trashed_messages() {
        let messages = vec![
            message((false, false, false, true, false, false, false), 5),
            message((false, false, false, true, false, false, false), 9),
        ];
        let names = vec!["a".into(), "a".into()];
        let stats = compute_stats(&messages, &names, String::new());
        assert_eq!(stats.messaged_at, Some(9));
    }

    #[test]
    fn test_sender_names_first_and_last_distinct() {
        let messages = vec![
            message((false, false, false, false, false, false, false), 1),
            message((false, false, false, false, false, false, false), 2),
            message((false, false, false, false, false, false, false), 3),
        ];
        let names = vec!["Alice".to_string(), "Bob".to_string(), "Carol".to_string()];
        let stats = compute_stats(&messages, &names, String::new());
        assert_eq!(stats.sender_names, vec!["Alice".to_string(), "Carol".to_string()]);
    }

    #[test]
    fn test_sender_names_collapse_when_same() {
        let messages = vec![
            message((false, false, false, false, false, false, false), 1),
            message((false, false, false, false, false, false, false), 2),
        ];
        let names = vec!["Alice".to_string(), "Alice".to_string()];
        let stats = compute_stats(&messages, &names, String::new());
        assert_eq!(stats.sender_names, vec!["Alice".to_string()]);
    }

    #[test]
    fn test_has_active_excludes_own_sent_drafts_archived() {
        let messages = vec![
            message((true, true, false, false, false, false, false), 1),
            message((false, true, false, false, false, false, false), 2),
            message((false, false, false, false, false, false, true), 3),
        ];
        let names = vec!["a".into(), "a".into(), "b".into()];
        let stats = compute_stats(&messages, &names, String::new());
        assert!(!stats.has_active);
        assert!(stats.has_sender);
        assert!(stats.has_draft);
    }
}
