// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::common::Addr;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::mime::ParsedEmail;
use crate::raise_error;
use chrono::DateTime;
use mail_send::mail_builder::headers::address::Address;
use mail_send::mail_builder::headers::raw::Raw;
use mail_send::mail_builder::MessageBuilder;
use std::borrow::Cow;

/// Header names the caller may not override through `extra_headers`.
const RESERVED_HEADERS: [&str; 10] = [
    "from",
    "to",
    "cc",
    "bcc",
    "subject",
    "date",
    "message-id",
    "in-reply-to",
    "references",
    "mime-version",
];

#[derive(Clone, Debug, Default)]
pub struct InlinePart {
    pub content_type: String,
    pub cid: String,
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct FilePart {
    pub content_type: String,
    pub name: String,
    pub content: Vec<u8>,
}

/// The outbound composition input. Bcc recipients are carried for envelope
/// derivation only and are never serialized into the wire bytes.
#[derive(Clone, Debug, Default)]
pub struct ComposeMail {
    pub subject: String,
    pub from: Addr,
    pub to: Vec<Addr>,
    pub cc: Vec<Addr>,
    pub bcc: Vec<Addr>,
    /// Epoch millis; the Date header is always emitted.
    pub date: i64,
    /// Bare Message-ID; angle brackets are added on the wire.
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub inline_parts: Vec<InlinePart>,
    pub attachments: Vec<FilePart>,
    /// Arbitrary non-reserved extra headers.
    pub extra_headers: Vec<(String, String)>,
}

impl ComposeMail {
    /// Every envelope recipient: To + Cc + Bcc.
    pub fn envelope_recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(|addr| addr.email.clone())
            .collect()
    }
}

fn to_builder_address(addrs: &[Addr]) -> Address<'static> {
    if addrs.len() == 1 {
        let addr = &addrs[0];
        Address::new_address(
            (!addr.name.is_empty()).then(|| Cow::Owned(addr.name.clone())),
            Cow::Owned(addr.email.clone()),
        )
    } else {
        Address::new_list(
            addrs
                .iter()
                .map(|addr| {
                    Address::new_address(
                        (!addr.name.is_empty()).then(|| Cow::Owned(addr.name.clone())),
                        Cow::Owned(addr.email.clone()),
                    )
                })
                .collect(),
        )
    }
}

/// Serializes the mail to RFC 5322 wire bytes.
///
/// The MIME shape follows from what is present: lone renditions stay
/// single-part, text+html nest in an alternative, inline images wrap the
/// main part in a related, and file attachments wrap everything in a mixed.
pub fn compose(mail: &ComposeMail) -> MailroomResult<Vec<u8>> {
    if mail.to.is_empty() && mail.cc.is_empty() && mail.bcc.is_empty() {
        return Err(raise_error!(
            "cannot compose a message without recipients".into(),
            ErrorCode::ValidationFailed
        ));
    }

    let mut builder = MessageBuilder::new()
        .from(to_builder_address(std::slice::from_ref(&mail.from)))
        .subject(mail.subject.clone())
        .message_id(mail.message_id.clone())
        .date(mail.date / 1000);

    if !mail.to.is_empty() {
        builder = builder.to(to_builder_address(&mail.to));
    }
    if !mail.cc.is_empty() {
        builder = builder.cc(to_builder_address(&mail.cc));
    }
    // No Bcc header ever reaches the wire; the envelope carries them.

    if let Some(in_reply_to) = &mail.in_reply_to {
        builder = builder.header(
            "In-Reply-To",
            Raw::new(Cow::Owned(format!("<{}>", in_reply_to))),
        );
        let references = match &mail.references {
            Some(existing) if !existing.is_empty() => {
                format!("{} <{}>", existing, in_reply_to)
            }
            _ => format!("<{}>", in_reply_to),
        };
        builder = builder.header("References", Raw::new(Cow::Owned(references)));
    }

    for (name, value) in &mail.extra_headers {
        if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        builder = builder.header(name.clone(), Raw::new(Cow::Owned(value.clone())));
    }

    if let Some(text) = &mail.text_body {
        builder = builder.text_body(text.clone());
    }
    if let Some(html) = &mail.html_body {
        builder = builder.html_body(html.clone());
    }
    for inline in &mail.inline_parts {
        builder = builder.inline(
            inline.content_type.clone(),
            inline.cid.clone(),
            inline.content.clone(),
        );
    }
    for attachment in &mail.attachments {
        builder = builder.attachment(
            attachment.content_type.clone(),
            attachment.name.clone(),
            attachment.content.clone(),
        );
    }

    builder
        .write_to_vec()
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}

/// A draft body pair produced by the reply/forward helpers, ready to feed
/// into `ComposeMail`.
#[derive(Clone, Debug, Default)]
pub struct DraftSkeleton {
    pub subject: String,
    pub to: Vec<Addr>,
    pub cc: Vec<Addr>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub text_body: String,
    pub html_body: Option<String>,
}

fn format_date(date: i64) -> String {
    DateTime::from_timestamp_millis(date)
        .map(|dt| dt.to_rfc2822())
        .unwrap_or_else(|| "an unknown date".to_string())
}

fn format_address_list(addrs: &[Addr]) -> String {
    addrs
        .iter()
        .map(Addr::display)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds a reply skeleton: `Re:` subject (idempotent), recipients default
/// to the original sender, original Cc preserved, threading headers set, and
/// optionally the quoted original body.
pub fn create_reply(
    original: &ParsedEmail,
    reply_text: Option<&str>,
    reply_html: Option<&str>,
    include_quote: bool,
) -> DraftSkeleton {
    let reply_text = reply_text.unwrap_or_default();

    let subject = if original.subject.to_ascii_lowercase().starts_with("re:") {
        original.subject.clone()
    } else {
        format!("Re: {}", original.subject)
    };

    let mut skeleton = DraftSkeleton {
        subject,
        to: if original.from.email.is_empty() {
            Vec::new()
        } else {
            vec![original.from.clone()]
        },
        cc: original.cc.clone(),
        in_reply_to: (!original.message_id.is_empty()).then(|| original.message_id.clone()),
        references: (!original.references.is_empty()).then(|| original.references.clone()),
        text_body: reply_text.to_string(),
        html_body: reply_html.map(str::to_string),
    };

    if !include_quote {
        return skeleton;
    }

    let date_str = format_date(original.date);
    let from_display = original.from.display();
    let attribution = if from_display.is_empty() {
        format!("\n\nOn {}, someone wrote:\n", date_str)
    } else {
        format!("\n\nOn {}, {} wrote:\n", date_str, from_display)
    };

    let mut text_body = format!("{}{}", reply_text, attribution);
    if let Some(original_text) = original.primary_text() {
        let quoted = original_text
            .lines()
            .map(|line| format!("> {}", line))
            .collect::<Vec<_>>()
            .join("\n");
        text_body.push_str(&quoted);
    }
    skeleton.text_body = text_body;

    let html_content = reply_html.map(str::to_string).unwrap_or_else(|| {
        format!("<p>{}</p>", html_escape::encode_text(reply_text))
    });
    if let Some(original_html) = original.html_body.first().map(|part| part.content.as_str()) {
        let header_html = quoted_header_html(original, &date_str, false);
        skeleton.html_body = Some(format!(
            "{}\n<hr data-type=\"quote-separator\" />\n<blockquote>\n{}\n{}\n</blockquote>",
            html_content, header_html, original_html
        ));
    }

    skeleton
}

/// Builds a forward skeleton: `Fwd:` subject (idempotent), empty recipients,
/// no threading headers, and the original content behind a forwarded-message
/// preamble.
pub fn create_forward(
    original: &ParsedEmail,
    forward_text: &str,
    forward_html: Option<&str>,
    include_original: bool,
) -> DraftSkeleton {
    let subject = if original.subject.to_ascii_lowercase().starts_with("fwd:") {
        original.subject.clone()
    } else {
        format!("Fwd: {}", original.subject)
    };

    let mut skeleton = DraftSkeleton {
        subject,
        to: Vec::new(),
        cc: Vec::new(),
        in_reply_to: None,
        references: None,
        text_body: forward_text.to_string(),
        html_body: forward_html.map(str::to_string),
    };

    if !include_original {
        return skeleton;
    }

    let date_str = format_date(original.date);
    let mut header_text = String::from("\n\n---------- Forwarded message ----------\n");
    let from_display = original.from.display();
    if !from_display.is_empty() {
        header_text.push_str(&format!("From: {}\n", from_display));
    }
    if !original.to.is_empty() {
        header_text.push_str(&format!("To: {}\n", format_address_list(&original.to)));
    }
    if !original.cc.is_empty() {
        header_text.push_str(&format!("Cc: {}\n", format_address_list(&original.cc)));
    }
    header_text.push_str(&format!("Subject: {}\n", original.subject));
    header_text.push_str(&format!("Date: {}\n\n", date_str));

    let mut text_body = format!("{}{}", forward_text, header_text);
    if let Some(original_text) = original.primary_text() {
        text_body.push_str(original_text);
    }
    skeleton.text_body = text_body;

    if let Some(original_html) = original.html_body.first().map(|part| part.content.as_str()) {
        let html_content = forward_html.map(str::to_string).unwrap_or_else(|| {
            format!("<p>{}</p>", html_escape::encode_text(forward_text))
        });
        let header_html = quoted_header_html(original, &date_str, true);
        skeleton.html_body = Some(format!(
            "{}\n<hr data-type=\"quote-separator\" />\n<blockquote>\n{}\n{}\n</blockquote>",
            html_content, header_html, original_html
        ));
    }

    skeleton
}

fn quoted_header_html(original: &ParsedEmail, date_str: &str, is_forward: bool) -> String {
    let mut header = if is_forward {
        String::from("<p>---------- Forwarded message ----------<br/>")
    } else {
        String::from("<p>---------- In reply to ----------<br/>")
    };
    let from_display = original.from.display();
    if !from_display.is_empty() {
        header.push_str(&format!(
            "<strong>From:</strong> {}<br/>",
            html_escape::encode_text(&from_display)
        ));
    }
    if !original.to.is_empty() {
        header.push_str(&format!(
            "<strong>To:</strong> {}<br/>",
            html_escape::encode_text(&format_address_list(&original.to))
        ));
    }
    if !original.cc.is_empty() {
        header.push_str(&format!(
            "<strong>Cc:</strong> {}<br/>",
            html_escape::encode_text(&format_address_list(&original.cc))
        ));
    }
    header.push_str(&format!(
        "<strong>Subject:</strong> {}<br/>",
        html_escape::encode_text(&original.subject)
    ));
    header.push_str(&format!(
        "<strong>Date:</strong> {}<br/>",
        html_escape::encode_text(date_str)
    ));
    header.push_str("</p>");
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::mime::parser::parse;

    fn simple_mail() -> ComposeMail {
        ComposeMail {
            subject: "Hi".into(),
            from: Addr::new("Alice", "alice@example.com"),
            to: vec![Addr::new("", "bob@external.com")],
            date: 1713520800000,
            message_id: "mid123@example.com".into(),
            text_body: Some("Hello".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_compose_simple_text() {
        let bytes = compose(&simple_mail()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("From: "));
        assert!(text.contains("alice@example.com"));
        assert!(text.contains("To: "));
        assert!(text.contains("bob@external.com"));
        assert!(text.contains("Subject: Hi"));
        assert!(text.contains("Message-ID: <mid123@example.com>"));
        assert!(text.contains("Hello"));
    }

    #[test]
    fn test_bcc_never_reaches_the_wire() {
        let mut mail = simple_mail();
        mail.bcc = vec![Addr::new("", "hidden@external.com")];
        let bytes = compose(&mail).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text
            .lines()
            .any(|line| line.to_ascii_lowercase().starts_with("bcc:")));
        assert!(!text.contains("hidden@external.com"));
        // The envelope still carries every recipient.
        assert_eq!(
            mail.envelope_recipients(),
            vec!["bob@external.com", "hidden@external.com"]
        );
    }

    #[test]
    fn test_threading_headers() {
        let mut mail = simple_mail();
        mail.in_reply_to = Some("parent@example.com".into());
        mail.references = Some("<r1@example.com>".into());
        let bytes = compose(&mail).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("In-Reply-To: <parent@example.com>"));
        assert!(text.contains("References: <r1@example.com> <parent@example.com>"));
    }

    #[test]
    fn test_extra_headers_cannot_override_reserved() {
        let mut mail = simple_mail();
        mail.extra_headers = vec![
            ("X-Campaign".into(), "welcome".into()),
            ("Bcc".into(), "sneaky@example.com".into()),
        ];
        let bytes = compose(&mail).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("X-Campaign: welcome"));
        assert!(!text.to_ascii_lowercase().contains("sneaky@example.com"));
    }

    #[test]
    fn test_compose_parse_round_trip_preserves_semantics() {
        let mut mail = simple_mail();
        mail.html_body = Some("<p>Hello</p>".into());
        mail.attachments = vec![FilePart {
            content_type: "application/pdf".into(),
            name: "doc.pdf".into(),
            content: b"%PDF-1.4 fake".to_vec(),
        }];
        let bytes = compose(&mail).unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.subject, "Hi");
        assert_eq!(parsed.from.email, "alice@example.com");
        assert_eq!(parsed.message_id, "mid123@example.com");
        assert_eq!(parsed.attachments.len(), 1);
        assert_eq!(parsed.attachments[0].name, "doc.pdf");
        assert_eq!(parsed.attachments[0].content, b"%PDF-1.4 fake");
        assert!(parsed.primary_text().unwrap().contains("Hello"));
        assert!(parsed.primary_html().unwrap().contains("<p>Hello</p>"));
    }

    fn original_email() -> ParsedEmail {
        let raw = b"From: Carol <carol@example.net>\r\n\
To: alice@example.com\r\n\
Cc: dave@example.net\r\n\
Subject: Plans\r\n\
Message-ID: <orig@example.net>\r\n\
Date: Fri, 19 Apr 2024 10:00:00 +0000\r\n\
\r\n\
Shall we meet at noon?\r\n";
        parse(raw).unwrap()
    }

    #[test]
    fn test_create_reply_quotes_original() {
        let original = original_email();
        let reply = create_reply(&original, Some("Sounds good."), None, true);
        assert_eq!(reply.subject, "Re: Plans");
        assert_eq!(reply.to[0].email, "carol@example.net");
        assert_eq!(reply.cc[0].email, "dave@example.net");
        assert_eq!(reply.in_reply_to.as_deref(), Some("orig@example.net"));
        assert!(reply.text_body.starts_with("Sounds good."));
        assert!(reply
            .text_body
            .contains("Carol <carol@example.net> wrote:"));
        assert!(reply.text_body.contains("> Shall we meet at noon?"));
        let html = reply.html_body.unwrap();
        assert!(html.contains("<blockquote>"));
    }

    #[test]
    fn test_create_reply_subject_idempotent() {
        let mut original = original_email();
        original.subject = "Re: Plans".into();
        let reply = create_reply(&original, Some("ok"), None, false);
        assert_eq!(reply.subject, "Re: Plans");
    }

    #[test]
    fn test_create_forward_embeds_preamble_without_threading() {
        let original = original_email();
        let forward = create_forward(&original, "FYI", None, true);
        assert_eq!(forward.subject, "Fwd: Plans");
        assert!(forward.to.is_empty());
        assert!(forward.in_reply_to.is_none());
        assert!(forward
            .text_body
            .contains("---------- Forwarded message ----------"));
        assert!(forward.text_body.contains("From: Carol <carol@example.net>"));
        assert!(forward.text_body.contains("Subject: Plans"));
        assert!(forward.text_body.contains("Shall we meet at noon?"));
    }
}
