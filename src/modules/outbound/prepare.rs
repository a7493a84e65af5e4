// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::blob::attachment::Attachment;
use crate::modules::blob::entity::Blob;
use crate::modules::common::Addr;
use crate::modules::dkim::entity::DkimKey;
use crate::modules::dkim::sign;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::mailbox::contact::Contact;
use crate::modules::mailbox::entity::Mailbox;
use crate::modules::message::entity::Message;
use crate::modules::message::recipient::{MessageRecipient, RecipientType};
use crate::modules::mime::composer::{self, ComposeMail, FilePart, InlinePart};
use crate::modules::mime::parser;
use crate::modules::outbound::SenderUser;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::template::entity::{MessageTemplate, TemplateKind};
use crate::modules::template::render;
use crate::{raise_error, utc_now};

/// Resolves the signature to apply: the draft's referenced template when it
/// is still active and its scope covers the mailbox, otherwise the forced
/// active signature of the scope. Unauthorized or inactive references are
/// ignored without error.
async fn resolve_signature(
    message: &Message,
    mailbox: &Mailbox,
) -> MailroomResult<Option<MessageTemplate>> {
    if let Some(template_id) = message.signature_template_id {
        if let Some(template) = MessageTemplate::get(template_id).await? {
            if template.is_active
                && template.kind == TemplateKind::Signature
                && template.covers_mailbox(mailbox.id, mailbox.domain_id)
            {
                return Ok(Some(template));
            }
        }
    }
    MessageTemplate::forced_for_scope(mailbox.id, mailbox.domain_id, TemplateKind::Signature).await
}

/// Renders the signature for the sending user and appends it to the bodies.
/// When no body was provided at all, the signature is the body.
fn materialize_signature(
    template: &MessageTemplate,
    user: Option<&SenderUser>,
    text_body: &mut Option<String>,
    html_body: &mut Option<String>,
) {
    let attributes = match user {
        Some(user) => render::user_attributes(&user.name, user.custom_attributes.as_deref()),
        None => render::user_attributes("", None),
    };

    if let Some(signature_text) = &template.text_body {
        let rendered = render::render_placeholders(signature_text, &attributes);
        match text_body {
            Some(existing) => {
                existing.push_str("\n\n");
                existing.push_str(&rendered);
            }
            None => *text_body = Some(rendered),
        }
    }
    if let Some(signature_html) = &template.html_body {
        let rendered = render::render_placeholders(signature_html, &attributes);
        match html_body {
            Some(existing) => {
                existing.push_str("\n");
                existing.push_str(&rendered);
            }
            None => *html_body = Some(rendered),
        }
    }
}

/// Composes, signs and finalizes one draft: the resulting signed bytes are
/// persisted as the message blob, `is_draft` flips exactly once and
/// `sent_at` is stamped. Any failure before that leaves the draft intact.
pub async fn prepare_outbound_message(
    mailbox: &Mailbox,
    message: &Message,
    text_body: Option<String>,
    html_body: Option<String>,
    user: Option<&SenderUser>,
    include_quote: bool,
) -> MailroomResult<Vec<u8>> {
    let mut text_body = text_body;
    let mut html_body = html_body;

    if let Some(signature) = resolve_signature(message, mailbox).await? {
        materialize_signature(&signature, user, &mut text_body, &mut html_body);
    }

    // Threading context from the parent, when this is a reply.
    let mut in_reply_to = None;
    let mut references = None;
    if let Some(parent_id) = message.parent_id {
        if let Some(parent) = Message::get(parent_id).await? {
            in_reply_to = Some(parent.mime_id.clone());
            if let Some(parent_blob_id) = parent.blob_id {
                let parent_raw = Blob::require(parent_blob_id).await?.raw_content;
                if let Ok(parent_parsed) = parser::parse(&parent_raw) {
                    references = (!parent_parsed.references.is_empty())
                        .then(|| parent_parsed.references.clone());
                    if include_quote {
                        let skeleton = composer::create_reply(
                            &parent_parsed,
                            text_body.as_deref(),
                            html_body.as_deref(),
                            true,
                        );
                        text_body = Some(skeleton.text_body);
                        html_body = skeleton.html_body.or(html_body);
                    }
                }
            }
        }
    }

    let recipients = MessageRecipient::list_for_message(message.id).await?;
    let mut to = Vec::new();
    let mut cc = Vec::new();
    let mut bcc = Vec::new();
    for recipient in &recipients {
        let name = Contact::get(recipient.contact_id)
            .await?
            .map(|contact| contact.name)
            .unwrap_or_default();
        let addr = Addr::new(&name, &recipient.contact_email);
        match recipient.kind {
            RecipientType::To => to.push(addr),
            RecipientType::Cc => cc.push(addr),
            RecipientType::Bcc => bcc.push(addr),
        }
    }

    let sender_name = Contact::get(message.sender_contact_id)
        .await?
        .map(|contact| contact.name)
        .unwrap_or_default();

    let mut inline_parts = Vec::new();
    let mut attachments = Vec::new();
    for attachment in Attachment::list_for_message(mailbox.id, message.id).await? {
        let blob = Blob::require(attachment.blob_id).await?;
        match &attachment.cid {
            Some(cid) => inline_parts.push(InlinePart {
                content_type: blob.content_type.clone(),
                cid: cid.clone(),
                content: blob.raw_content,
            }),
            None => attachments.push(FilePart {
                content_type: blob.content_type.clone(),
                name: attachment.name.clone(),
                content: blob.raw_content,
            }),
        }
    }

    let mail = ComposeMail {
        subject: message.subject.clone(),
        from: Addr::new(&sender_name, &mailbox.address()),
        to,
        cc,
        bcc,
        date: utc_now!(),
        message_id: message.mime_id.clone(),
        in_reply_to,
        references,
        text_body,
        html_body,
        inline_parts,
        attachments,
        extra_headers: Vec::new(),
    };

    let raw = composer::compose(&mail)?;

    if raw.len() as u64 > SETTINGS.mailroom_max_outgoing_message_size {
        return Err(raise_error!(
            format!(
                "composed message size {} exceeds the {} byte limit",
                raw.len(),
                SETTINGS.mailroom_max_outgoing_message_size
            ),
            ErrorCode::ExceedsLimitation
        ));
    }

    let key = DkimKey::active_for_domain(&mailbox.domain_name)
        .await?
        .ok_or_else(|| {
            raise_error!(
                format!("no active DKIM key for domain '{}'", mailbox.domain_name),
                ErrorCode::DkimSigningFailed
            )
        })?;
    let signed = sign::sign_message(&key, &raw)?;

    // Finalize: persist the signed bytes and flip the draft exactly once.
    let blob = Blob::get_or_create(mailbox.id, signed.clone(), "message/rfc822").await?;
    let blob_id = blob.id;
    Message::update_with(message.id, move |m| {
        m.blob_id = Some(blob_id);
        m.draft_blob_id = None;
        m.is_draft = false;
        m.sent_at = Some(utc_now!());
    })
    .await?;

    Ok(signed)
}
