// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::common::Addr;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::mime::{BodyPart, HeaderEntry, ParsedAttachment, ParsedEmail};
use crate::{base64_encode, raise_error, sha256_hex, utc_now};
use mail_parser::{
    Address, HeaderValue, Message, MessageParser, MessagePart, MimeHeaders, PartType,
};
use std::collections::HashMap;

const MAX_FILENAME_BYTES: usize = 255;

/// Parses raw RFC 5322 bytes into the canonical JMAP-flavored object.
///
/// Missing headers are not errors; only structural impossibilities
/// (empty input, multipart with unusable boundaries) fail.
pub fn parse(raw: &[u8]) -> MailroomResult<ParsedEmail> {
    if raw.is_empty() {
        return Err(raise_error!(
            "cannot parse an empty message".into(),
            ErrorCode::MimeParseFailed
        ));
    }

    let message = MessageParser::default().parse(raw).ok_or_else(|| {
        raise_error!(
            "failed to parse message".into(),
            ErrorCode::MimeParseFailed
        )
    })?;

    let declares_multipart = message
        .content_type()
        .map(|ct| ct.ctype().eq_ignore_ascii_case("multipart"))
        .unwrap_or(false);
    let has_multipart_part = message
        .parts
        .iter()
        .any(|part| matches!(part.body, PartType::Multipart(_)));
    if declares_multipart && !has_multipart_part {
        return Err(raise_error!(
            "malformed multipart message: boundary never matched".into(),
            ErrorCode::MimeParseFailed
        ));
    }

    let (headers, headers_list, headers_blocks) = collect_headers(&message, raw);

    let from = match first_address(message.from()) {
        Some(addr) => addr,
        None => Addr {
            name: String::new(),
            email: headers_list
                .iter()
                .find(|(name, _)| name == "from")
                .map(|(_, value)| value.clone())
                .unwrap_or_default(),
        },
    };

    let references = headers_list
        .iter()
        .find(|(name, _)| name == "references")
        .map(|(_, value)| value.clone())
        .unwrap_or_default();

    let gmail_labels = headers
        .get("x-gmail-labels")
        .map(|entry| {
            entry
                .first()
                .split(',')
                .map(|label| label.trim().to_string())
                .filter(|label| !label.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut parsed = ParsedEmail {
        subject: message.subject().unwrap_or_default().to_string(),
        from,
        to: address_list(message.to()),
        cc: address_list(message.cc()),
        bcc: address_list(message.bcc()),
        date: message
            .date()
            .map(|d| d.to_timestamp() * 1000)
            .unwrap_or_else(|| utc_now!()),
        message_id: strip_angle_brackets(message.message_id().unwrap_or_default()),
        in_reply_to: strip_angle_brackets(
            message.in_reply_to().as_text().unwrap_or_default(),
        ),
        references,
        gmail_labels,
        headers,
        headers_list,
        headers_blocks,
        text_body: Vec::new(),
        html_body: Vec::new(),
        attachments: Vec::new(),
    };

    walk_part(&message, 0, PartContext::default(), &mut parsed);

    Ok(parsed)
}

pub fn strip_angle_brackets(id: &str) -> String {
    id.trim().trim_matches(|c| c == '<' || c == '>').to_string()
}

fn collect_headers(
    message: &Message<'_>,
    raw: &[u8],
) -> (
    HashMap<String, HeaderEntry>,
    Vec<(String, String)>,
    Vec<HashMap<String, Vec<String>>>,
) {
    let mut headers: HashMap<String, HeaderEntry> = HashMap::new();
    let mut headers_list = Vec::new();

    for header in message.headers() {
        let name = header.name.as_str().to_ascii_lowercase();
        let raw_value = unfold_raw(
            raw.get(header.offset_start as usize..header.offset_end as usize)
                .unwrap_or_default(),
        );
        let decoded = decoded_header_value(&header.value, &raw_value);
        headers_list.push((name.clone(), raw_value));
        headers
            .entry(name)
            .and_modify(|entry| entry.push(decoded.clone()))
            .or_insert(HeaderEntry::Single(decoded));
    }

    // Relays prepend, so the walk runs most-recent-relay first. Every
    // `received` closes a block; the trailing collection is the original
    // message's own headers.
    let mut headers_blocks = Vec::new();
    let mut current: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in &headers_list {
        current.entry(name.clone()).or_default().push(value.clone());
        if name == "received" {
            headers_blocks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        headers_blocks.push(current);
    }

    (headers, headers_list, headers_blocks)
}

/// Unfolds a folded header value and strips NUL bytes.
fn unfold_raw(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut unfolded = String::with_capacity(text.len());
    for line in text.lines() {
        let piece = line.trim();
        if piece.is_empty() {
            continue;
        }
        if !unfolded.is_empty() {
            unfolded.push(' ');
        }
        unfolded.push_str(piece);
    }
    unfolded.trim().replace('\0', "")
}

fn decoded_header_value(value: &HeaderValue<'_>, raw_fallback: &str) -> String {
    match value {
        HeaderValue::Text(text) => text.replace('\0', ""),
        HeaderValue::TextList(list) => list
            .iter()
            .map(|text| text.replace('\0', ""))
            .collect::<Vec<_>>()
            .join(" "),
        HeaderValue::Address(address) => flatten_addresses(address)
            .iter()
            .map(Addr::display)
            .collect::<Vec<_>>()
            .join(", "),
        _ => raw_fallback.to_string(),
    }
}

fn flatten_addresses(address: &Address<'_>) -> Vec<Addr> {
    let addr_of = |addr: &mail_parser::Addr<'_>| {
        let name = addr
            .name
            .as_ref()
            .map(|n| n.replace('\0', ""))
            .unwrap_or_default();
        match addr.address.as_ref() {
            Some(email) => Addr {
                name,
                email: email.to_string(),
            },
            // An unparseable bare string surfaces as a nameless address.
            None => Addr {
                name: String::new(),
                email: name,
            },
        }
    };
    match address {
        Address::List(list) => list.iter().map(addr_of).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter())
            .map(addr_of)
            .collect(),
    }
}

fn address_list(address: Option<&Address<'_>>) -> Vec<Addr> {
    address.map(flatten_addresses).unwrap_or_default()
}

fn first_address(address: Option<&Address<'_>>) -> Option<Addr> {
    address_list(address).into_iter().next()
}

#[derive(Clone, Copy, Default)]
struct PartContext {
    in_alternative: bool,
    related_non_root: bool,
}

fn walk_part(message: &Message<'_>, part_id: usize, ctx: PartContext, out: &mut ParsedEmail) {
    let Some(part) = message.parts.get(part_id) else {
        return;
    };

    match &part.body {
        PartType::Multipart(children) => {
            let subtype = part
                .content_type()
                .and_then(|ct| ct.subtype())
                .unwrap_or("mixed")
                .to_ascii_lowercase();
            for (position, child) in children.iter().enumerate() {
                let child_ctx = PartContext {
                    in_alternative: ctx.in_alternative || subtype == "alternative",
                    related_non_root: ctx.related_non_root
                        || (subtype == "related" && position > 0),
                };
                walk_part(message, *child as usize, child_ctx, out);
            }
        }
        PartType::Text(text) => classify_text(
            part,
            part_id,
            &content_type_of(part, "text/plain"),
            text,
            false,
            ctx,
            out,
        ),
        PartType::Html(html) => classify_text(
            part,
            part_id,
            &content_type_of(part, "text/html"),
            html,
            true,
            ctx,
            out,
        ),
        PartType::Binary(_) | PartType::InlineBinary(_) => {
            classify_binary(part, part_id, ctx, out)
        }
        PartType::Message(nested) => {
            let content = nested.raw_message.to_vec();
            push_attachment(part, "message/rfc822", content, "attachment", out);
        }
    }
}

fn classify_text(
    part: &MessagePart<'_>,
    part_id: usize,
    content_type: &str,
    text: &str,
    is_html: bool,
    ctx: PartContext,
    out: &mut ParsedEmail,
) {
    let disposition = disposition_of(part);
    if disposition == "attachment" {
        push_attachment(
            part,
            content_type,
            text.as_bytes().to_vec(),
            "attachment",
            out,
        );
        return;
    }

    let body_part = BodyPart {
        part_type: content_type.to_string(),
        content: text.replace('\0', ""),
        part_id: Some(part_id.to_string()),
        cid: part.content_id().map(String::from),
    };

    if ctx.in_alternative {
        // Inside multipart/alternative each rendition stays on its side.
        if is_html {
            out.html_body.push(body_part);
        } else {
            out.text_body.push(body_part);
        }
    } else {
        // The JMAP copy rule: a lone rendition serves both sides.
        out.text_body.push(body_part.clone());
        out.html_body.push(body_part);
    }
}

fn classify_binary(
    part: &MessagePart<'_>,
    part_id: usize,
    ctx: PartContext,
    out: &mut ParsedEmail,
) {
    let content_type = content_type_of(part, "application/octet-stream");
    let disposition = disposition_of(part);

    if disposition == "attachment" {
        push_attachment(part, &content_type, part.contents().to_vec(), "attachment", out);
        return;
    }

    // Inline-disposed parts render with the body regardless of container.
    if disposition == "inline" {
        let body_part = BodyPart {
            part_type: content_type,
            content: base64_encode!(part.contents()),
            part_id: Some(part_id.to_string()),
            cid: part.content_id().map(String::from),
        };
        out.text_body.push(body_part.clone());
        out.html_body.push(body_part);
        return;
    }

    // Undisposed non-root parts of a multipart/related are the resources
    // its root references; the cid keeps cid: links resolvable.
    if ctx.related_non_root {
        push_attachment(
            part,
            &content_type,
            part.contents().to_vec(),
            &disposition,
            out,
        );
        return;
    }

    // Any other undisposed binary is a plain attachment.
    push_attachment(
        part,
        &content_type,
        part.contents().to_vec(),
        &disposition,
        out,
    );
}

fn push_attachment(
    part: &MessagePart<'_>,
    content_type: &str,
    content: Vec<u8>,
    disposition: &str,
    out: &mut ParsedEmail,
) {
    let name = sanitize_filename(part.attachment_name(), content_type);
    let sha256 = sha256_hex!(&content);
    out.attachments.push(ParsedAttachment {
        content_type: content_type.to_string(),
        name,
        size: content.len(),
        disposition: disposition.to_string(),
        cid: part.content_id().map(String::from),
        content,
        sha256,
    });
}

fn content_type_of(part: &MessagePart<'_>, default: &str) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        })
        .unwrap_or_else(|| default.to_string())
}

fn disposition_of(part: &MessagePart<'_>) -> String {
    part.content_disposition()
        .map(|d| d.ctype().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Sanitizes an attachment file name: path prefixes and leading dots are
/// stripped, empty names fall back to `unnamed` with the content type's
/// canonical extension, and the result is capped at 255 bytes.
pub fn sanitize_filename(name: Option<&str>, content_type: &str) -> String {
    let fallback_extension = || {
        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|extensions| extensions.first())
            .copied()
    };

    let mut sanitized = match name {
        Some(original) => {
            let base = original
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or("")
                .trim_start_matches('.')
                .trim();
            if base.is_empty() {
                match fallback_extension() {
                    Some(ext) => format!("unnamed.{}", ext),
                    None => "unnamed".to_string(),
                }
            } else {
                base.to_string()
            }
        }
        None => match fallback_extension() {
            Some(ext) => format!("unnamed.{}", ext),
            None => "unnamed".to_string(),
        },
    };

    if sanitized.ends_with('.') {
        sanitized = "unnamed".to_string();
    }

    while sanitized.len() > MAX_FILENAME_BYTES {
        sanitized.pop();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_text_message_copies_into_both_bodies() {
        let raw = b"From: Alice <alice@example.com>\r\n\
To: bob@external.com\r\n\
Subject: Hi\r\n\
Message-ID: <simple@example.com>\r\n\
Date: Fri, 19 Apr 2024 10:00:00 +0000\r\n\
\r\n\
Hello\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.subject, "Hi");
        assert_eq!(parsed.from.name, "Alice");
        assert_eq!(parsed.from.email, "alice@example.com");
        assert_eq!(parsed.message_id, "simple@example.com");
        assert_eq!(parsed.text_body.len(), 1);
        assert_eq!(parsed.html_body.len(), 1);
        assert_eq!(parsed.text_body[0].content.trim_end(), "Hello");
        assert_eq!(parsed.text_body[0], parsed.html_body[0]);
        assert!(parsed.attachments.is_empty());
    }

    #[test]
    fn test_alternative_splits_renditions() {
        let raw = b"From: a@example.com\r\n\
To: b@example.com\r\n\
Subject: Alt\r\n\
Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
\r\n\
--alt\r\n\
Content-Type: text/plain\r\n\
\r\n\
plain version\r\n\
--alt\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html version</p>\r\n\
--alt--\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.text_body.len(), 1);
        assert_eq!(parsed.html_body.len(), 1);
        assert!(parsed.text_body[0].content.contains("plain version"));
        assert!(parsed.html_body[0].content.contains("html version"));
        assert!(parsed.attachments.is_empty());
    }

    #[test]
    fn test_mixed_inline_image_goes_to_bodies_attachment_to_attachments() {
        let raw = b"From: a@example.com\r\n\
To: b@example.com\r\n\
Subject: Classification\r\n\
Content-Type: multipart/mixed; boundary=\"mix\"\r\n\
\r\n\
--mix\r\n\
Content-Type: text/plain\r\n\
\r\n\
Body.\r\n\
--mix\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"doc.pdf\"\r\n\
\r\n\
PDF content\r\n\
--mix\r\n\
Content-Type: image/png\r\n\
Content-ID: <img1>\r\n\
Content-Disposition: inline; filename=\"img.png\"\r\n\
\r\n\
Image content\r\n\
--mix--\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.attachments.len(), 1);
        assert_eq!(parsed.attachments[0].name, "doc.pdf");
        assert_eq!(parsed.attachments[0].disposition, "attachment");
        // text/plain body plus the inline image, copied to both arrays.
        assert_eq!(parsed.text_body.len(), 2);
        assert_eq!(parsed.html_body.len(), 2);
        let image = parsed
            .text_body
            .iter()
            .find(|part| part.part_type == "image/png")
            .expect("inline image should be in textBody");
        assert_eq!(image.cid.as_deref(), Some("img1"));
    }

    #[test]
    fn test_related_inline_image_goes_to_bodies_not_attachments() {
        let raw = b"From: a@example.com\r\n\
To: b@example.com\r\n\
Subject: Related inline\r\n\
Content-Type: multipart/related; boundary=\"rel\"\r\n\
\r\n\
--rel\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>See image: <img src=\"cid:image1\"></p>\r\n\
--rel\r\n\
Content-Type: image/png\r\n\
Content-ID: <image1>\r\n\
Content-Disposition: inline; filename=\"image.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aW1hZ2UgZGF0YSBoZXJl\r\n\
--rel--\r\n";
        let parsed = parse(raw).unwrap();
        assert!(parsed.attachments.is_empty());
        // html root plus the inline image, copied to both arrays.
        assert_eq!(parsed.html_body.len(), 2);
        assert_eq!(parsed.text_body.len(), 2);
        let image = parsed
            .html_body
            .iter()
            .find(|part| part.part_type == "image/png")
            .expect("inline image should be in htmlBody");
        assert_eq!(image.cid.as_deref(), Some("image1"));
        assert!(parsed
            .text_body
            .iter()
            .any(|part| part.part_type == "image/png"));
    }

    #[test]
    fn test_related_non_root_without_disposition_is_attachment() {
        let raw = b"From: a@example.com\r\n\
To: b@example.com\r\n\
Subject: Related\r\n\
Content-Type: multipart/related; boundary=\"rel\"\r\n\
\r\n\
--rel\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>See image: <img src=\"cid:image1\"></p>\r\n\
--rel\r\n\
Content-Type: image/png\r\n\
Content-ID: <image1>\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aW1hZ2UgZGF0YSBoZXJl\r\n\
--rel--\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.html_body.len(), 1);
        assert!(parsed.html_body[0].content.contains("cid:image1"));
        // The html root copies into textBody per the JMAP rule.
        assert_eq!(parsed.text_body.len(), 1);
        assert_eq!(parsed.attachments.len(), 1);
        let attachment = &parsed.attachments[0];
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.cid.as_deref(), Some("image1"));
        assert_eq!(attachment.content, b"image data here");
        assert_eq!(attachment.name, "unnamed.png");
    }

    #[test]
    fn test_encoded_word_headers_are_decoded() {
        let raw = b"From: =?utf-8?b?U8OgbmRlciBOw6FtZQ==?= <sender@example.com>\r\n\
To: =?utf-8?q?Recipient?= <recipient@example.com>\r\n\
Subject: =?iso-8859-1?q?Encoded_Subject_with_=E4ccents?=\r\n\
\r\n\
Simple body.\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.from.name, "S\u{e0}nder N\u{e1}me");
        assert_eq!(parsed.subject, "Encoded Subject with \u{e4}ccents");
    }

    #[test]
    fn test_missing_date_defaults_to_now() {
        let raw = b"From: a@example.com\r\nTo: b@example.com\r\nSubject: No date\r\n\r\nbody\r\n";
        let before = crate::utc_now!();
        let parsed = parse(raw).unwrap();
        assert!(parsed.date >= before);
    }

    #[test]
    fn test_header_blocks_split_on_received() {
        let raw = b"Received: from mta.ours (ours) by mx; Fri, 19 Apr 2024 10:02:00 +0000\r\n\
X-Spam: Ham\r\n\
Received: from relay2 (relay2) by mta.ours; Fri, 19 Apr 2024 10:01:00 +0000\r\n\
X-Spam: Spam\r\n\
Received: from relay1 (relay1) by relay2; Fri, 19 Apr 2024 10:00:00 +0000\r\n\
X-Spam: SenderSpam\r\n\
From: spammer@example.org\r\n\
Subject: offer\r\n\
\r\n\
hi\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.headers_blocks.len(), 4);
        assert!(parsed.headers_blocks[0].contains_key("received"));
        assert!(!parsed.headers_blocks[0].contains_key("x-spam"));
        assert_eq!(parsed.headers_blocks[1]["x-spam"], vec!["Ham"]);
        assert_eq!(parsed.headers_blocks[2]["x-spam"], vec!["Spam"]);
        assert_eq!(parsed.headers_blocks[3]["x-spam"], vec!["SenderSpam"]);
        assert!(parsed.headers_blocks[3].contains_key("from"));
    }

    #[test]
    fn test_repeated_headers_aggregate_in_order() {
        let raw = b"From: a@example.com\r\n\
X-Tag: one\r\n\
X-Tag: two\r\n\
Subject: tags\r\n\
\r\n\
body\r\n";
        let parsed = parse(raw).unwrap();
        match parsed.headers.get("x-tag").unwrap() {
            HeaderEntry::Multiple(values) => assert_eq!(values, &vec!["one".to_string(), "two".to_string()]),
            HeaderEntry::Single(_) => panic!("repeated header should aggregate"),
        }
    }

    #[test]
    fn test_references_kept_verbatim_and_ids_stripped() {
        let raw = b"From: a@example.com\r\n\
Subject: refs\r\n\
Message-ID: <mid@example.com>\r\n\
In-Reply-To: <parent@example.com>\r\n\
References: <r1@example.com> <r2@example.com>\r\n\
\r\n\
body\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.message_id, "mid@example.com");
        assert_eq!(parsed.in_reply_to, "parent@example.com");
        assert_eq!(parsed.references, "<r1@example.com> <r2@example.com>");
    }

    #[test]
    fn test_gmail_labels() {
        let raw = b"From: a@example.com\r\n\
X-Gmail-Labels: Inbox, Work/Projects , Starred\r\n\
Subject: labels\r\n\
\r\n\
body\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.gmail_labels, vec!["Inbox", "Work/Projects", "Starred"]);
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        assert!(parse(b"").is_err());
    }

    #[test]
    fn test_malformed_multipart_is_parse_error() {
        let raw = b"From: a@example.com\r\n\
Subject: Malformed\r\n\
Content-Type: multipart/alternative; boundary=\"bad_boundary\"\r\n\
\r\n\
--correct_boundary\r\n\
Content-Type: text/plain\r\n\
\r\n\
Text part.\r\n\
--correct_boundary--\r\n";
        assert!(parse(raw).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(Some("../../etc/passwd"), "text/plain"), "passwd");
        assert_eq!(sanitize_filename(Some("C:\\temp\\doc.pdf"), "application/pdf"), "doc.pdf");
        assert_eq!(sanitize_filename(Some(".hidden"), "text/plain"), "hidden");
        assert_eq!(sanitize_filename(Some("..."), "image/png"), "unnamed.png");
        assert_eq!(sanitize_filename(None, "application/x-unknown-zzz"), "unnamed");
        let long = "a".repeat(300);
        assert_eq!(sanitize_filename(Some(&long), "text/plain").len(), 255);
    }

    #[test]
    fn test_attachment_content_is_decoded_with_matching_sha256() {
        let raw = b"From: a@example.com\r\n\
Subject: encoded attachment\r\n\
Content-Type: multipart/mixed; boundary=\"m\"\r\n\
\r\n\
--m\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attachment\r\n\
--m\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"blob.bin\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8gd29ybGQ=\r\n\
--m--\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.attachments.len(), 1);
        let attachment = &parsed.attachments[0];
        assert_eq!(attachment.content, b"hello world");
        assert_eq!(attachment.size, 11);
        assert_eq!(
            attachment.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
