// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::domain::entity::MailDomain;
use crate::modules::error::MailroomResult;
use crate::modules::mime::ParsedEmail;
use crate::modules::settings::cli::SETTINGS;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod rspamd;
pub mod rules;

/// One hardcoded classifier rule. `header_match` compares the whole value
/// case-insensitively; `header_match_regex` anchors a case-insensitive
/// regex at the start of the value.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpamRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_match_regex: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

/// SPAM_CONFIG: process-wide by default, overridable per mail domain.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SpamConfig {
    #[serde(default)]
    pub rules: Vec<SpamRule>,
    /// How many header blocks, counted from the most recent relay, the rule
    /// engine is willing to believe. Our own MTA's block is always trusted.
    #[serde(default)]
    pub trusted_relays: usize,
    #[serde(default)]
    pub rspamd_url: Option<String>,
    #[serde(default)]
    pub rspamd_auth: Option<String>,
}

impl SpamConfig {
    pub fn from_settings() -> Self {
        serde_json::from_str(&SETTINGS.mailroom_spam_config).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    Spam,
    Ham,
    /// No rule matched and rspamd was unavailable or not configured.
    None,
}

impl Classification {
    pub fn is_spam(&self) -> bool {
        matches!(self, Classification::Spam)
    }
}

/// Classifies one inbound message for a recipient domain. Hardcoded rules
/// win over rspamd; rspamd outages never block legitimate mail.
pub async fn classify(
    domain: &MailDomain,
    parsed: &ParsedEmail,
    raw: &[u8],
) -> MailroomResult<Classification> {
    let config = domain.spam_config();

    if let Some(is_spam) = rules::apply_rules(&config, &parsed.headers_blocks) {
        return Ok(if is_spam {
            Classification::Spam
        } else {
            Classification::Ham
        });
    }

    if let Some(url) = &config.rspamd_url {
        match rspamd::check(url, config.rspamd_auth.as_deref(), raw).await {
            Ok(is_spam) => {
                return Ok(if is_spam {
                    Classification::Spam
                } else {
                    Classification::Ham
                });
            }
            Err(e) => {
                // Treated as ham so an rspamd outage never bounces mail.
                warn!("rspamd check failed, treating message as ham: {:?}", e);
                return Ok(Classification::Ham);
            }
        }
    }

    Ok(Classification::None)
}
