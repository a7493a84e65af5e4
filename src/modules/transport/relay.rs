// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::transport::{
    send_smtp_mail, DeliveryMap, Encryption, SmtpAuth, TransportOptions,
};
use crate::raise_error;
use std::time::Duration;

/// Relay mode: one transaction with all recipients against the configured
/// upstream.
pub async fn deliver(
    envelope_from: &str,
    recipient_emails: &[String],
    message_content: &[u8],
) -> MailroomResult<DeliveryMap> {
    let relay = SETTINGS
        .mailroom_mta_out_relay_host
        .as_deref()
        .ok_or_else(|| {
            raise_error!(
                "'mailroom_mta_out_relay_host' is not configured".into(),
                ErrorCode::MissingConfiguration
            )
        })?;
    let (host, port) = relay.rsplit_once(':').ok_or_else(|| {
        raise_error!(
            format!("relay host '{}' is not host:port", relay),
            ErrorCode::MissingConfiguration
        )
    })?;
    let port: u16 = port.parse().map_err(|_| {
        raise_error!(
            format!("relay port in '{}' is not a number", relay),
            ErrorCode::MissingConfiguration
        )
    })?;

    let auth = match (
        &SETTINGS.mailroom_mta_out_relay_username,
        &SETTINGS.mailroom_mta_out_relay_password,
    ) {
        (Some(username), Some(password)) => Some(SmtpAuth {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    let encryption = if port == 465 {
        Encryption::Tls
    } else if SETTINGS.mailroom_mta_out_relay_use_tls {
        Encryption::StartTls
    } else {
        Encryption::None
    };

    let options = TransportOptions {
        auth,
        proxy: None,
        smtp_ip: None,
        encryption,
        sender_hostname: SETTINGS.sender_hostname(),
        timeout: Duration::from_secs(SETTINGS.mailroom_smtp_timeout_secs),
    };

    Ok(send_smtp_mail(
        host,
        port,
        envelope_from,
        recipient_emails,
        message_content,
        &options,
    )
    .await)
}
