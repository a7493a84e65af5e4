// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::dkim::entity::DkimKey;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::raise_error;
use mail_auth::common::crypto::{RsaKey, Sha256};
use mail_auth::common::headers::HeaderWriter;
use mail_auth::dkim::DkimSigner;

/// Headers covered by our signatures, relaxed/relaxed canonicalization.
const SIGNED_HEADERS: [&str; 7] = [
    "From",
    "To",
    "Cc",
    "Subject",
    "Date",
    "Message-ID",
    "MIME-Version",
];

/// Signs `raw` with the domain's key and returns the message with the
/// DKIM-Signature header prepended.
pub fn sign_message(key: &DkimKey, raw: &[u8]) -> MailroomResult<Vec<u8>> {
    let pk_rsa = RsaKey::<Sha256>::from_rsa_pem(&key.private_key).map_err(|e| {
        raise_error!(
            format!("unusable DKIM private key: {:?}", e),
            ErrorCode::DkimSigningFailed
        )
    })?;

    let signature = DkimSigner::from_key(pk_rsa)
        .domain(key.domain_name.clone())
        .selector(key.selector.clone())
        .headers(SIGNED_HEADERS)
        .sign(raw)
        .map_err(|e| {
            raise_error!(
                format!("DKIM signing failed: {:?}", e),
                ErrorCode::DkimSigningFailed
            )
        })?;

    let header = signature.to_header();
    let mut signed = Vec::with_capacity(header.len() + raw.len());
    signed.extend_from_slice(header.as_bytes());
    signed.extend_from_slice(raw);
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_prepends_signature_header() {
        let key = DkimKey::generate("example.com", "mail", 1024).unwrap();
        let raw = b"From: alice@example.com\r\nTo: bob@external.com\r\nSubject: Hi\r\n\r\nHello\r\n";
        let signed = sign_message(&key, raw).unwrap();
        let text = String::from_utf8_lossy(&signed);
        assert!(text.starts_with("DKIM-Signature:"));
        assert!(text.contains("d=example.com"));
        assert!(text.contains("s=mail"));
        assert!(text.ends_with("Hello\r\n"));
    }
}
