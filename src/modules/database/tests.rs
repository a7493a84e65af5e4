// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::blob::entity::Blob;
use crate::modules::dkim::entity::DkimKey;
use crate::modules::domain::entity::MailDomain;
use crate::modules::draft::{create_draft, CreateDraftRequest, DraftAttachment};
use crate::modules::error::code::ErrorCode;
use crate::modules::inbound::entity::InboundMessage;
use crate::modules::inbound::process_inbound;
use crate::modules::label;
use crate::modules::label::entity::Label;
use crate::modules::mailbox::contact::Contact;
use crate::modules::mailbox::entity::{Mailbox, MailboxAccess, MailboxRole};
use crate::modules::message::entity::Message;
use crate::modules::message::recipient::{MessageRecipient, RecipientType};
use crate::modules::outbound::prepare::prepare_outbound_message;
use crate::modules::thread::entity::Thread;

async fn fixture_mailbox(local_part: &str, domain_name: &str) -> Mailbox {
    let domain = match MailDomain::get_by_name(domain_name).await.unwrap() {
        Some(domain) => domain,
        None => {
            let domain = MailDomain::new(domain_name);
            let created = domain.clone();
            domain.save().await.unwrap();
            created
        }
    };
    match Mailbox::get_by_address(&format!("{}@{}", local_part, domain_name))
        .await
        .unwrap()
    {
        Some(mailbox) => mailbox,
        None => {
            let mailbox = Mailbox::new(local_part, &domain);
            let created = mailbox.clone();
            mailbox.save().await.unwrap();
            created
        }
    }
}

async fn grant_sender(mailbox: &Mailbox, user_id: u64) {
    MailboxAccess::new(mailbox.id, user_id, MailboxRole::Sender)
        .save()
        .await
        .unwrap();
}

fn inbound_row(mailbox: &Mailbox, raw: &[u8]) -> InboundMessage {
    InboundMessage::new(mailbox.id, raw.to_vec())
}

#[tokio::test]
async fn test_mailbox_and_contact_round_trip() {
    let mailbox = fixture_mailbox("roundtrip", "round-trip.test").await;
    assert_eq!(mailbox.address(), "roundtrip@round-trip.test");

    let found = Mailbox::get_by_address("roundtrip@round-trip.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, mailbox.id);

    let contact = Contact::get_or_create(mailbox.id, "peer@other.test", "Peer")
        .await
        .unwrap();
    let again = Contact::get_or_create(mailbox.id, "peer@other.test", "")
        .await
        .unwrap();
    assert_eq!(contact.id, again.id);
    assert_eq!(again.name, "Peer");
}

#[tokio::test]
async fn test_inbound_ingestion_is_idempotent_per_mime_id() {
    let mailbox = fixture_mailbox("dedup", "dedup.test").await;
    let raw = b"From: peer@other.test\r\n\
To: dedup@dedup.test\r\n\
Subject: once\r\n\
Message-ID: <once@other.test>\r\n\
\r\n\
only once\r\n";

    process_inbound(&inbound_row(&mailbox, raw)).await.unwrap();
    process_inbound(&inbound_row(&mailbox, raw)).await.unwrap();

    let message = Message::find_by_mime_id(mailbox.id, "once@other.test")
        .await
        .unwrap()
        .expect("message should exist");
    let thread_messages = Message::list_for_thread(message.thread_id).await.unwrap();
    assert_eq!(thread_messages.len(), 1);
}

#[tokio::test]
async fn test_reply_joins_thread_by_in_reply_to() {
    let mailbox = fixture_mailbox("threads", "threads.test").await;
    let first = b"From: peer@other.test\r\n\
To: threads@threads.test\r\n\
Subject: Topic\r\n\
Message-ID: <t1@other.test>\r\n\
\r\n\
first\r\n";
    let reply = b"From: peer@other.test\r\n\
To: threads@threads.test\r\n\
Subject: Re: Topic\r\n\
Message-ID: <t2@other.test>\r\n\
In-Reply-To: <t1@other.test>\r\n\
\r\n\
second\r\n";

    process_inbound(&inbound_row(&mailbox, first)).await.unwrap();
    process_inbound(&inbound_row(&mailbox, reply)).await.unwrap();

    let parent = Message::find_by_mime_id(mailbox.id, "t1@other.test")
        .await
        .unwrap()
        .unwrap();
    let child = Message::find_by_mime_id(mailbox.id, "t2@other.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parent.thread_id, child.thread_id);
    assert_eq!(child.parent_id, Some(parent.id));
    let thread_messages = Message::list_for_thread(parent.thread_id).await.unwrap();
    assert_eq!(thread_messages.len(), 2);

    let thread = Thread::require(parent.thread_id).await.unwrap();
    assert!(thread.has_unread);
    assert!(thread.has_active);
    assert!(!thread.is_spam);
}

#[tokio::test]
async fn test_inbound_spam_rule_marks_message() {
    let domain = MailDomain::new("spamrule.test");
    let mut domain_with_rules = domain.clone();
    domain_with_rules.custom_settings = Some(
        r#"{"SPAM_CONFIG": {"rules": [{"header_match": "X-Spam: Yes", "action": "spam"}], "trusted_relays": 3}}"#
            .into(),
    );
    domain_with_rules.clone().save().await.unwrap();
    let mailbox = Mailbox::new("victim", &domain_with_rules);
    let mailbox_clone = mailbox.clone();
    mailbox.save().await.unwrap();

    let raw = b"Received: from relay (relay) by us; Fri, 19 Apr 2024 10:00:00 +0000\r\n\
X-Spam: Yes\r\n\
Received: from sender (sender) by relay; Fri, 19 Apr 2024 09:59:00 +0000\r\n\
From: spammer@else.test\r\n\
To: victim@spamrule.test\r\n\
Subject: buy\r\n\
Message-ID: <spam1@else.test>\r\n\
\r\n\
offer\r\n";
    process_inbound(&inbound_row(&mailbox_clone, raw)).await.unwrap();

    let message = Message::find_by_mime_id(mailbox_clone.id, "spam1@else.test")
        .await
        .unwrap()
        .unwrap();
    assert!(message.is_spam);
    let thread = Thread::require(message.thread_id).await.unwrap();
    assert!(thread.is_spam);
}

#[tokio::test]
async fn test_label_rename_cascades_to_descendants() {
    let mailbox = fixture_mailbox("labels", "labels.test").await;

    label::create_label(mailbox.id, "Work/Projects/Urgent", "#f00", "", false)
        .await
        .unwrap();
    label::create_label(mailbox.id, "Work/Meetings", "#f00", "", false)
        .await
        .unwrap();

    // Parents were auto-created.
    let work = Label::find_by_slug(mailbox.id, "work").await.unwrap().unwrap();
    assert!(Label::find_by_slug(mailbox.id, "work-projects")
        .await
        .unwrap()
        .is_some());

    label::rename_label(mailbox.id, work.id, "Job").await.unwrap();

    assert!(Label::find_by_slug(mailbox.id, "work").await.unwrap().is_none());
    assert!(Label::find_by_slug(mailbox.id, "job").await.unwrap().is_some());
    assert!(Label::find_by_slug(mailbox.id, "job-projects")
        .await
        .unwrap()
        .is_some());
    assert!(Label::find_by_slug(mailbox.id, "job-projects-urgent")
        .await
        .unwrap()
        .is_some());
    assert!(Label::find_by_slug(mailbox.id, "job-meetings")
        .await
        .unwrap()
        .is_some());

    // Deleting the root removes the whole subtree.
    let job = Label::find_by_slug(mailbox.id, "job").await.unwrap().unwrap();
    let deleted = label::delete_label(mailbox.id, job.id).await.unwrap();
    assert_eq!(deleted, 4);
    assert!(Label::find_by_slug(mailbox.id, "job-projects")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_create_draft_persists_message_and_recipients() {
    let mailbox = fixture_mailbox("drafter", "drafts.test").await;
    grant_sender(&mailbox, 7001).await;

    let draft = create_draft(CreateDraftRequest {
        mailbox_id: mailbox.id,
        user_id: 7001,
        subject: "Hi".into(),
        draft_body: br#"{"text": "Hello"}"#.to_vec(),
        parent_id: None,
        to: vec!["bob@external.test".into()],
        cc: vec![],
        bcc: vec!["hidden@external.test".into()],
        attachments: vec![],
        signature_id: None,
    })
    .await
    .unwrap();

    assert!(draft.is_draft);
    assert!(draft.is_sender);
    assert!(draft.mime_id.ends_with("@drafts.test"));
    assert!(draft.draft_blob_id.is_some());

    let recipients = MessageRecipient::list_for_message(draft.id).await.unwrap();
    assert_eq!(recipients.len(), 2);
    assert!(recipients.iter().all(|r| r.delivery_status.is_none()));

    let thread = Thread::require(draft.thread_id).await.unwrap();
    assert!(thread.has_draft);
}

#[tokio::test]
async fn test_draft_attachment_size_cap_rolls_back() {
    let mailbox = fixture_mailbox("capped", "cap.test").await;
    grant_sender(&mailbox, 7002).await;

    let oversized = vec![0u8; 26214401];
    let blob = Blob::get_or_create(mailbox.id, oversized, "application/octet-stream")
        .await
        .unwrap();

    let result = create_draft(CreateDraftRequest {
        mailbox_id: mailbox.id,
        user_id: 7002,
        subject: "too big".into(),
        draft_body: b"{}".to_vec(),
        parent_id: None,
        to: vec!["bob@external.test".into()],
        cc: vec![],
        bcc: vec![],
        attachments: vec![DraftAttachment {
            blob_ref: blob.id.to_string(),
            name: Some("huge.bin".into()),
            cid: None,
        }],
        signature_id: None,
    })
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.code(), ErrorCode::ExceedsLimitation);
}

#[tokio::test]
async fn test_foreign_blob_reference_is_rejected() {
    let mailbox = fixture_mailbox("mine", "mine.test").await;
    let other = fixture_mailbox("other", "mine.test").await;
    grant_sender(&mailbox, 7003).await;

    let foreign_blob = Blob::get_or_create(other.id, b"theirs".to_vec(), "text/plain")
        .await
        .unwrap();

    let result = create_draft(CreateDraftRequest {
        mailbox_id: mailbox.id,
        user_id: 7003,
        subject: "sneaky".into(),
        draft_body: b"{}".to_vec(),
        parent_id: None,
        to: vec!["bob@external.test".into()],
        cc: vec![],
        bcc: vec![],
        attachments: vec![DraftAttachment {
            blob_ref: foreign_blob.id.to_string(),
            name: None,
            cid: None,
        }],
        signature_id: None,
    })
    .await;

    assert_eq!(result.unwrap_err().code(), ErrorCode::ValidationFailed);
}

#[tokio::test]
async fn test_prepare_outbound_finalizes_draft_with_dkim_signature() {
    let mailbox = fixture_mailbox("sender", "outbound.test").await;
    grant_sender(&mailbox, 7004).await;

    if DkimKey::active_for_domain("outbound.test").await.unwrap().is_none() {
        DkimKey::generate("outbound.test", "mail", 1024)
            .unwrap()
            .save()
            .await
            .unwrap();
    }

    let draft = create_draft(CreateDraftRequest {
        mailbox_id: mailbox.id,
        user_id: 7004,
        subject: "Hi".into(),
        draft_body: b"{}".to_vec(),
        parent_id: None,
        to: vec!["bob@external.test".into()],
        cc: vec![],
        bcc: vec!["hidden@external.test".into()],
        attachments: vec![],
        signature_id: None,
    })
    .await
    .unwrap();

    let signed = prepare_outbound_message(
        &mailbox,
        &draft,
        Some("Hello".into()),
        None,
        None,
        false,
    )
    .await
    .unwrap();

    let text = String::from_utf8_lossy(&signed);
    assert!(text.starts_with("DKIM-Signature:"));
    assert!(text.contains("From: "));
    assert!(text.contains("sender@outbound.test"));
    assert!(text.contains("bob@external.test"));
    assert!(text.contains("Hello"));
    // The Bcc recipient exists in the envelope rows, never on the wire.
    assert!(!text
        .lines()
        .any(|line| line.to_ascii_lowercase().starts_with("bcc:")));
    assert!(!text.contains("hidden@external.test"));

    let finalized = Message::require(draft.id).await.unwrap();
    assert!(!finalized.is_draft);
    assert!(finalized.sent_at.is_some());
    assert!(finalized.blob_id.is_some());
    assert!(finalized.draft_blob_id.is_none());

    // A second prepare is never attempted for a finalized message; the
    // recipient rows carry the remaining delivery state.
    let recipients = MessageRecipient::list_for_message(draft.id).await.unwrap();
    assert_eq!(recipients.len(), 2);
    assert!(recipients
        .iter()
        .any(|r| r.kind == RecipientType::Bcc && r.delivery_status.is_none()));
}

#[tokio::test]
async fn test_message_flag_updates_refresh_thread_stats() {
    let mailbox = fixture_mailbox("flagger", "flags.test").await;
    let raw = b"From: peer@other.test\r\n\
To: flagger@flags.test\r\n\
Subject: flags\r\n\
Message-ID: <flags1@other.test>\r\n\
\r\n\
body\r\n";
    process_inbound(&inbound_row(&mailbox, raw)).await.unwrap();

    let message = Message::find_by_mime_id(mailbox.id, "flags1@other.test")
        .await
        .unwrap()
        .unwrap();
    let thread = Thread::require(message.thread_id).await.unwrap();
    assert!(thread.has_unread);
    assert!(thread.has_messages);

    Message::set_unread(message.id, false).await.unwrap();
    Message::set_trashed(message.id, true).await.unwrap();
    crate::modules::thread::stats::update_stats(message.thread_id)
        .await
        .unwrap();

    let thread = Thread::require(message.thread_id).await.unwrap();
    assert!(!thread.has_unread);
    assert!(thread.has_trashed);
    assert!(!thread.has_messages);

    let refreshed = Message::require(message.id).await.unwrap();
    assert!(refreshed.read_at.is_some());
    assert!(refreshed.trashed_at.is_some());
}

#[tokio::test]
async fn test_forwarded_attachment_reference_is_copied_into_new_draft() {
    let mailbox = fixture_mailbox("forwarder", "forward.test").await;
    grant_sender(&mailbox, 7005).await;

    let raw = b"From: peer@other.test\r\n\
To: forwarder@forward.test\r\n\
Subject: with attachment\r\n\
Message-ID: <fwd-src@other.test>\r\n\
Content-Type: multipart/mixed; boundary=\"m\"\r\n\
\r\n\
--m\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attachment\r\n\
--m\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQ=\r\n\
--m--\r\n";
    process_inbound(&inbound_row(&mailbox, raw)).await.unwrap();
    let original = Message::find_by_mime_id(mailbox.id, "fwd-src@other.test")
        .await
        .unwrap()
        .unwrap();

    let draft = create_draft(CreateDraftRequest {
        mailbox_id: mailbox.id,
        user_id: 7005,
        subject: "Fwd: with attachment".into(),
        draft_body: b"{}".to_vec(),
        parent_id: None,
        to: vec!["bob@external.test".into()],
        cc: vec![],
        bcc: vec![],
        attachments: vec![
            DraftAttachment {
                blob_ref: format!("msg_{}_0", original.id),
                name: None,
                cid: None,
            },
            // Unknown source message: silently skipped, not an error.
            DraftAttachment {
                blob_ref: "msg_424242_0".into(),
                name: None,
                cid: None,
            },
        ],
        signature_id: None,
    })
    .await
    .unwrap();

    let attachments =
        crate::modules::blob::attachment::Attachment::list_for_message(mailbox.id, draft.id)
            .await
            .unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].name, "report.pdf");
    let blob = Blob::require(attachments[0].blob_id).await.unwrap();
    assert_eq!(blob.raw_content, b"%PDF-1.4");
    assert_eq!(blob.mailbox_id, mailbox.id);
}

#[tokio::test]
async fn test_update_draft_commits_replacements_atomically() {
    let mailbox = fixture_mailbox("updater", "update.test").await;
    grant_sender(&mailbox, 7006).await;

    let draft = create_draft(CreateDraftRequest {
        mailbox_id: mailbox.id,
        user_id: 7006,
        subject: "v1".into(),
        draft_body: b"{}".to_vec(),
        parent_id: None,
        to: vec!["one@external.test".into()],
        cc: vec![],
        bcc: vec![],
        attachments: vec![],
        signature_id: None,
    })
    .await
    .unwrap();

    let updated = crate::modules::draft::update_draft(
        draft.id,
        crate::modules::draft::UpdateDraftRequest {
            mailbox_id: mailbox.id,
            user_id: 7006,
            subject: Some("v2".into()),
            draft_body: Some(br#"{"text": "hi"}"#.to_vec()),
            to: Some(vec!["two@external.test".into(), "three@external.test".into()]),
            cc: None,
            bcc: None,
            attachments: None,
            signature_id: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.subject, "v2");
    assert_ne!(updated.draft_blob_id, draft.draft_blob_id);
    let recipients = MessageRecipient::list_for_message(draft.id).await.unwrap();
    let to_emails: Vec<&str> = recipients
        .iter()
        .filter(|r| r.kind == RecipientType::To)
        .map(|r| r.contact_email.as_str())
        .collect();
    assert_eq!(to_emails.len(), 2);
    assert!(to_emails.contains(&"two@external.test"));
    assert!(!to_emails.contains(&"one@external.test"));

    // A failing update must leave the draft exactly as committed above.
    let oversized = vec![0u8; 26214401];
    let big_blob = Blob::get_or_create(mailbox.id, oversized, "application/octet-stream")
        .await
        .unwrap();
    let result = crate::modules::draft::update_draft(
        draft.id,
        crate::modules::draft::UpdateDraftRequest {
            mailbox_id: mailbox.id,
            user_id: 7006,
            subject: Some("v3".into()),
            draft_body: None,
            to: None,
            cc: None,
            bcc: None,
            attachments: Some(vec![DraftAttachment {
                blob_ref: big_blob.id.to_string(),
                name: Some("huge.bin".into()),
                cid: None,
            }]),
            signature_id: None,
        },
    )
    .await;
    assert_eq!(result.unwrap_err().code(), ErrorCode::ExceedsLimitation);

    let unchanged = Message::require(draft.id).await.unwrap();
    assert_eq!(unchanged.subject, "v2");
    assert!(!unchanged.has_attachments);
}
