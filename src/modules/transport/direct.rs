// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::MailroomResult;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::transport::dns::resolve_delivery_chain;
use crate::modules::transport::{
    next_direct_proxy_excluding, send_smtp_mail, DeliveryMap, Encryption, RecipientOutcome,
    TransportOptions,
};
use crate::modules::utils::split_address;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const SMTP_PORT: u16 = 25;

/// Direct mode: per recipient domain, walk the MX chain in preference order.
/// Recipients refused transiently by one MX are retried against the next;
/// delivered recipients are never retried.
pub async fn deliver(
    envelope_from: &str,
    recipient_emails: &[String],
    message_content: &[u8],
) -> MailroomResult<DeliveryMap> {
    let mut by_domain: HashMap<String, Vec<String>> = HashMap::new();
    let mut outcomes = DeliveryMap::new();

    for email in recipient_emails {
        match split_address(email) {
            Some((_, domain)) => by_domain
                .entry(domain.to_ascii_lowercase())
                .or_default()
                .push(email.clone()),
            None => {
                outcomes.insert(
                    email.clone(),
                    RecipientOutcome::permanent(format!("'{}' is not a deliverable address", email)),
                );
            }
        }
    }

    for (domain, recipients) in by_domain {
        let domain_outcomes =
            deliver_domain(&domain, envelope_from, &recipients, message_content).await;
        outcomes.extend(domain_outcomes);
    }

    Ok(outcomes)
}

async fn deliver_domain(
    domain: &str,
    envelope_from: &str,
    recipients: &[String],
    message_content: &[u8],
) -> DeliveryMap {
    let mut outcomes = DeliveryMap::new();

    let chain = match resolve_delivery_chain(domain).await {
        Ok(chain) => chain,
        Err(e) => {
            let error = e.to_string();
            for recipient in recipients {
                outcomes.insert(recipient.clone(), RecipientOutcome::transient(error.clone()));
            }
            return outcomes;
        }
    };

    if chain.is_empty() {
        // Neither MX nor A records: nothing answers for this domain today.
        for recipient in recipients {
            outcomes.insert(
                recipient.clone(),
                RecipientOutcome::transient(format!(
                    "no MX or A records found for '{}'",
                    domain
                )),
            );
        }
        return outcomes;
    }

    let mut pending: Vec<String> = recipients.to_vec();
    let mut previous_proxy: Option<String> = None;

    for candidate in &chain {
        if pending.is_empty() {
            break;
        }
        debug!(
            "attempting delivery for {} via {} (preference {})",
            domain, candidate.host, candidate.preference
        );

        let proxy = next_direct_proxy_excluding(previous_proxy.as_deref());
        let options = TransportOptions {
            auth: None,
            proxy: proxy.clone(),
            smtp_ip: None,
            encryption: Encryption::Opportunistic,
            sender_hostname: SETTINGS.sender_hostname(),
            timeout: Duration::from_secs(SETTINGS.mailroom_smtp_timeout_secs),
        };
        previous_proxy = proxy;

        let attempt = send_smtp_mail(
            &candidate.host,
            SMTP_PORT,
            envelope_from,
            &pending,
            message_content,
            &options,
        )
        .await;

        let mut still_pending = Vec::new();
        for recipient in pending {
            match attempt.get(&recipient) {
                Some(outcome) if outcome.delivered => {
                    info!("delivered to {} via {}", recipient, candidate.host);
                    outcomes.insert(recipient, outcome.clone());
                }
                Some(outcome) if outcome.retry => {
                    // Transport-level MX fallback: try the next hop.
                    outcomes.insert(recipient.clone(), outcome.clone());
                    still_pending.push(recipient);
                }
                Some(outcome) => {
                    outcomes.insert(recipient, outcome.clone());
                }
                None => {
                    let outcome = RecipientOutcome::transient(format!(
                        "no response for recipient from {}",
                        candidate.host
                    ));
                    outcomes.insert(recipient.clone(), outcome);
                    still_pending.push(recipient);
                }
            }
        }
        pending = still_pending;
    }

    outcomes
}
