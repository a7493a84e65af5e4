// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::raise_error;
use mail_auth::MessageAuthenticator;
use std::net::IpAddr;
use std::sync::LazyLock;

pub static RESOLVER: LazyLock<MessageAuthenticator> = LazyLock::new(|| {
    MessageAuthenticator::new_system_conf().expect("failed to initialize the system DNS resolver")
});

/// One candidate next-hop for a recipient domain, MX preference order.
#[derive(Clone, Debug)]
pub struct MxCandidate {
    pub preference: u16,
    pub host: String,
    pub ips: Vec<IpAddr>,
}

/// Resolves the delivery chain of a recipient domain: MX records sorted
/// ascending by preference, each with its A records; MX hosts that resolve
/// to nothing are skipped. A domain without MX records falls back to its
/// own A record at preference 0.
pub async fn resolve_delivery_chain(domain: &str) -> MailroomResult<Vec<MxCandidate>> {
    let mx_records = match RESOLVER
        .mx_lookup(domain, None::<&mail_auth::common::cache::NoCache<String, _>>)
        .await
    {
        Ok(records) => records,
        Err(mail_auth::Error::DnsRecordNotFound(_)) => Default::default(),
        Err(e) => {
            return Err(raise_error!(
                format!("MX lookup for '{}' failed: {:?}", domain, e),
                ErrorCode::DnsLookupFailed
            ))
        }
    };

    let mut chain = Vec::new();
    let mut exchanges: Vec<(u16, String)> = mx_records
        .iter()
        .flat_map(|mx| {
            mx.exchanges
                .iter()
                .map(|exchange| (mx.preference, exchange.clone()))
        })
        .collect();
    exchanges.sort_by_key(|(preference, _)| *preference);

    if exchanges.is_empty() {
        // NoAnswer: the domain itself may accept mail on its A record.
        exchanges.push((0, domain.to_string()));
    }

    for (preference, host) in exchanges {
        let ips = resolve_ips(&host).await;
        if ips.is_empty() {
            continue;
        }
        chain.push(MxCandidate {
            preference,
            host,
            ips,
        });
    }

    Ok(chain)
}

async fn resolve_ips(host: &str) -> Vec<IpAddr> {
    match RESOLVER
        .ipv4_lookup(host, None::<&mail_auth::common::cache::NoCache<String, _>>)
        .await
    {
        Ok(addrs) => addrs.iter().copied().map(IpAddr::from).collect(),
        Err(_) => Vec::new(),
    }
}
