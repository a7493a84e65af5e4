// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailroomResult;
use crate::modules::message::entity::Message;
use crate::modules::thread::entity::{Thread, ThreadAccess, ThreadRole};

/// Where a new message landed: an existing conversation or a fresh thread.
#[derive(Clone, Debug)]
pub struct ThreadPlacement {
    pub thread_id: u64,
    pub parent_id: Option<u64>,
    pub created_thread: bool,
}

/// Strips leading reply/forward markers for subject grouping. The stored
/// subject stays verbatim.
pub fn normalize_subject(subject: &str) -> &str {
    let mut current = subject.trim();
    loop {
        let lowered = current.to_ascii_lowercase();
        let stripped = if let Some(rest) = lowered
            .strip_prefix("re:")
            .map(|rest| &current[current.len() - rest.len()..])
        {
            rest
        } else if let Some(rest) = lowered
            .strip_prefix("fwd:")
            .map(|rest| &current[current.len() - rest.len()..])
        {
            rest
        } else {
            return current;
        };
        current = stripped.trim_start();
    }
}

/// Message-IDs from a whitespace-separated References value, brackets
/// stripped, oldest first.
pub fn reference_ids(references: &str) -> Vec<String> {
    references
        .split_whitespace()
        .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Places a message into a thread visible to `mailbox_id`.
///
/// In-Reply-To wins; otherwise the most recent resolvable References entry;
/// otherwise a fresh thread is created with the verbatim subject.
pub async fn place_message(
    mailbox_id: u64,
    subject: &str,
    in_reply_to: &str,
    references: &str,
) -> MailroomResult<ThreadPlacement> {
    if !in_reply_to.is_empty() {
        if let Some(parent) = Message::find_by_mime_id(mailbox_id, in_reply_to).await? {
            return Ok(ThreadPlacement {
                thread_id: parent.thread_id,
                parent_id: Some(parent.id),
                created_thread: false,
            });
        }
    }

    for reference in reference_ids(references).into_iter().rev() {
        if let Some(ancestor) = Message::find_by_mime_id(mailbox_id, &reference).await? {
            return Ok(ThreadPlacement {
                thread_id: ancestor.thread_id,
                parent_id: Some(ancestor.id),
                created_thread: false,
            });
        }
    }

    let thread = Thread::new(subject);
    let thread_id = thread.id;
    thread.save().await?;
    Ok(ThreadPlacement {
        thread_id,
        parent_id: None,
        created_thread: true,
    })
}

/// Access propagation: existing grants on the thread are untouched; the
/// participant mailbox gains the given role, tagged with the ingress path.
pub async fn grant_participant_access(
    thread_id: u64,
    mailbox_id: u64,
    role: ThreadRole,
    origin: &str,
) -> MailroomResult<()> {
    ThreadAccess::ensure(thread_id, mailbox_id, role, origin).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_subject_strips_markers() {
        assert_eq!(normalize_subject("Re: Hello"), "Hello");
        assert_eq!(normalize_subject("re: fwd: Hello"), "Hello");
        assert_eq!(normalize_subject("Fwd:Hello"), "Hello");
        assert_eq!(normalize_subject("Regards"), "Regards");
    }

    #[test]
    fn test_reference_ids_strip_brackets_and_keep_order() {
        let ids = reference_ids("<a@x> <b@y>\t<c@z>");
        assert_eq!(ids, vec!["a@x", "b@y", "c@z"]);
    }
}
