// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;

use crate::modules::common::Addr;

pub mod composer;
pub mod parser;

/// A header that appeared once is a plain string; repeats aggregate in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderEntry {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderEntry {
    pub fn push(&mut self, value: String) {
        match self {
            HeaderEntry::Single(existing) => {
                *self = HeaderEntry::Multiple(vec![existing.clone(), value]);
            }
            HeaderEntry::Multiple(values) => values.push(value),
        }
    }

    pub fn first(&self) -> &str {
        match self {
            HeaderEntry::Single(value) => value,
            HeaderEntry::Multiple(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }
}

/// One entry of `textBody` / `htmlBody`. Binary inline parts carry their
/// decoded bytes base64-encoded in `content`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyPart {
    pub part_type: String,
    pub content: String,
    pub part_id: Option<String>,
    pub cid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedAttachment {
    pub content_type: String,
    /// Sanitized file name.
    pub name: String,
    /// Decoded size in bytes.
    pub size: usize,
    /// "attachment", "inline", or "" when no disposition was given.
    pub disposition: String,
    pub cid: Option<String>,
    /// Decoded bytes.
    pub content: Vec<u8>,
    /// Hex SHA-256 of the decoded bytes.
    pub sha256: String,
}

/// The canonical JMAP-flavored value produced by the parser and consumed by
/// the composer, thread assembly, and the spam rule engine.
#[derive(Clone, Debug, Default)]
pub struct ParsedEmail {
    pub subject: String,
    pub from: Addr,
    pub to: Vec<Addr>,
    pub cc: Vec<Addr>,
    pub bcc: Vec<Addr>,
    /// Epoch millis; now() when the Date header is missing or unparseable.
    pub date: i64,
    /// Message-ID without angle brackets.
    pub message_id: String,
    /// In-Reply-To without angle brackets.
    pub in_reply_to: String,
    /// Verbatim References value (whitespace-separated id list).
    pub references: String,
    pub gmail_labels: Vec<String>,
    /// Lowercased header names to decoded values.
    pub headers: HashMap<String, HeaderEntry>,
    /// (lowercase name, raw unfolded value) in original top-to-bottom order.
    pub headers_list: Vec<(String, String)>,
    /// Received-bounded header blocks, most recent relay first.
    pub headers_blocks: Vec<HashMap<String, Vec<String>>>,
    pub text_body: Vec<BodyPart>,
    pub html_body: Vec<BodyPart>,
    pub attachments: Vec<ParsedAttachment>,
}

impl ParsedEmail {
    /// First text body content, the usual input for snippets and quoting.
    pub fn primary_text(&self) -> Option<&str> {
        self.text_body
            .iter()
            .find(|part| part.part_type.starts_with("text/"))
            .map(|part| part.content.as_str())
    }

    pub fn primary_html(&self) -> Option<&str> {
        self.html_body
            .iter()
            .find(|part| part.part_type == "text/html")
            .map(|part| part.content.as_str())
    }
}
