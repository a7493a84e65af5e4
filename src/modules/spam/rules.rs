// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::spam::SpamConfig;
use regex::RegexBuilder;
use std::collections::HashMap;
use tracing::debug;

/// Runs the hardcoded rules over the trusted prefix of the header blocks.
///
/// Blocks are walked most-recent-relay first; block 0 (our own MTA) is
/// always trusted, plus `trusted_relays` more. The first matching rule
/// decides: `spam`/`reject` => spam, `ham`/`no action` => ham. None means
/// no rule matched and the caller should consult rspamd.
pub fn apply_rules(
    config: &SpamConfig,
    headers_blocks: &[HashMap<String, Vec<String>>],
) -> Option<bool> {
    let trusted = headers_blocks
        .len()
        .min(config.trusted_relays.saturating_add(1));

    for block in &headers_blocks[..trusted] {
        for rule in &config.rules {
            if rule_matches(rule, block) {
                return action_verdict(rule.action.as_deref());
            }
        }
    }
    None
}

fn rule_matches(
    rule: &crate::modules::spam::SpamRule,
    block: &HashMap<String, Vec<String>>,
) -> bool {
    if let Some(header_match) = &rule.header_match {
        let Some((name, expected)) = split_rule(header_match) else {
            return false;
        };
        if let Some(values) = block.get(&name) {
            if values
                .iter()
                .any(|value| value.trim().eq_ignore_ascii_case(expected.trim()))
            {
                return true;
            }
        }
    }

    if let Some(header_match_regex) = &rule.header_match_regex {
        let Some((name, pattern)) = split_rule(header_match_regex) else {
            return false;
        };
        let Ok(regex) = RegexBuilder::new(pattern.trim())
            .case_insensitive(true)
            .build()
        else {
            debug!("ignoring unparsable spam rule regex: {}", pattern);
            return false;
        };
        if let Some(values) = block.get(&name) {
            if values.iter().any(|value| {
                regex
                    .find(value.trim())
                    .map(|m| m.start() == 0)
                    .unwrap_or(false)
            }) {
                return true;
            }
        }
    }

    false
}

/// "Name:Value" => (lowercased name, value).
fn split_rule(rule: &str) -> Option<(String, &str)> {
    let (name, value) = rule.split_once(':')?;
    Some((name.trim().to_ascii_lowercase(), value))
}

fn action_verdict(action: Option<&str>) -> Option<bool> {
    match action.unwrap_or("spam").trim().to_ascii_lowercase().as_str() {
        "spam" | "reject" => Some(true),
        "ham" | "no action" => Some(false),
        _ => Some(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::spam::SpamRule;

    fn block(pairs: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in pairs {
            map.entry(name.to_string()).or_default().push(value.to_string());
        }
        map
    }

    fn config(rules: Vec<SpamRule>, trusted_relays: usize) -> SpamConfig {
        SpamConfig {
            rules,
            trusted_relays,
            rspamd_url: None,
            rspamd_auth: None,
        }
    }

    fn ham_rule() -> SpamRule {
        SpamRule {
            header_match: Some("X-Spam: Ham".into()),
            header_match_regex: None,
            action: Some("ham".into()),
        }
    }

    fn spam_rule() -> SpamRule {
        SpamRule {
            header_match: Some("X-Spam: Spam".into()),
            header_match_regex: None,
            action: Some("spam".into()),
        }
    }

    // Three relays: ours, relay2 (says Ham), relay1 (says Spam); the
    // sender's own block claims SenderSpam.
    fn relay_blocks() -> Vec<HashMap<String, Vec<String>>> {
        vec![
            block(&[("received", "from ours")]),
            block(&[("x-spam", "Ham"), ("received", "from relay2")]),
            block(&[("x-spam", "Spam"), ("received", "from relay1")]),
            block(&[("x-spam", "SenderSpam"), ("from", "spammer@example.org")]),
        ]
    }

    #[test]
    fn test_trusted_relay_prefix_short_circuits_on_first_match() {
        let config = config(vec![ham_rule(), spam_rule()], 1);
        assert_eq!(apply_rules(&config, &relay_blocks()), Some(false));
    }

    #[test]
    fn test_zero_trusted_relays_ignores_relay_headers() {
        let config = config(vec![ham_rule(), spam_rule()], 0);
        assert_eq!(apply_rules(&config, &relay_blocks()), None);
    }

    #[test]
    fn test_deeper_trust_reaches_spam_verdict() {
        // With two trusted relays and only the spam rule configured, the
        // relay1 block decides.
        let config = config(vec![spam_rule()], 2);
        assert_eq!(apply_rules(&config, &relay_blocks()), Some(true));
    }

    #[test]
    fn test_header_match_is_case_insensitive_whole_value() {
        let rule = SpamRule {
            header_match: Some("X-Spam: yes".into()),
            header_match_regex: None,
            action: Some("spam".into()),
        };
        let config = config(vec![rule], 0);
        let blocks = vec![block(&[("x-spam", "YES")])];
        assert_eq!(apply_rules(&config, &blocks), Some(true));

        let blocks = vec![block(&[("x-spam", "YES indeed")])];
        assert_eq!(apply_rules(&config, &blocks), None);
    }

    #[test]
    fn test_regex_match_is_anchored_at_start() {
        let rule = SpamRule {
            header_match: None,
            header_match_regex: Some(r"X-Spam-Score: \d{2,}".into()),
            action: Some("reject".into()),
        };
        let config = config(vec![rule], 0);
        let blocks = vec![block(&[("x-spam-score", "42.1")])];
        assert_eq!(apply_rules(&config, &blocks), Some(true));

        let blocks = vec![block(&[("x-spam-score", "score is 42")])];
        assert_eq!(apply_rules(&config, &blocks), None);
    }

    #[test]
    fn test_no_action_verdict_is_ham() {
        let rule = SpamRule {
            header_match: Some("X-Checked: true".into()),
            header_match_regex: None,
            action: Some("no action".into()),
        };
        let config = config(vec![rule], 0);
        let blocks = vec![block(&[("x-checked", "true")])];
        assert_eq!(apply_rules(&config, &blocks), Some(false));
    }
}
