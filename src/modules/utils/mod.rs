// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use base64::{engine::general_purpose, Engine};

use super::error::code::ErrorCode;

pub mod shutdown;

#[macro_export]
macro_rules! mailroom_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! base64_encode {
    ($bytes:expr) => {{
        use base64::{engine::general_purpose::STANDARD, *};
        STANDARD.encode($bytes)
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::MailroomError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! validate_email {
    ($email:expr) => {{
        $crate::modules::utils::validate_email($email)
    }};
}

#[macro_export]
macro_rules! id {
    ($bit_strength:expr) => {{
        // Generate a token with the given bit strength
        let token = $crate::modules::utils::generate_token_impl($bit_strength);
        // Hash the generated token
        $crate::modules::utils::hash(&token)
    }};
}

#[macro_export]
macro_rules! sha256_hex {
    ($bytes:expr) => {{
        let digest = ring::digest::digest(&ring::digest::SHA256, $bytes);
        hex::encode(digest.as_ref())
    }};
}

pub(crate) fn generate_token_impl(bit_strength: usize) -> String {
    let byte_length = (bit_strength + 23) / 24 * 3;
    let random_bytes: Vec<u8> = (0..byte_length).map(|_| rand::random::<u8>()).collect();
    general_purpose::URL_SAFE.encode(&random_bytes)
}

pub fn validate_email(email: &str) -> crate::modules::error::MailroomResult<()> {
    use std::str::FromStr;
    let email_address = email_address::EmailAddress::from_str(email).map_err(|_| {
        raise_error!(
            format!("Invalid email format : {}", email),
            ErrorCode::InvalidParameter
        )
    })?;
    if email != email_address.email() {
        return Err(raise_error!(
            format!("Invalid email format: {}", email),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

/// Generates a 64-bit hash from a string, ensuring the output is within JavaScript's safe integer range (0 to 2^53 - 1).
pub fn hash(s: &str) -> u64 {
    let mut cursor = std::io::Cursor::new(s.as_bytes().to_vec());
    let hash = murmur3::murmur3_x64_128(&mut cursor, 0).unwrap();
    (hash & 0x1F_FFFF_FFFF_FFFF) as u64
}

/// Splits an address into its local part and domain, if well-formed.
pub fn split_address(email: &str) -> Option<(&str, &str)> {
    let (local_part, domain) = email.rsplit_once('@')?;
    if local_part.is_empty() || domain.is_empty() {
        return None;
    }
    Some((local_part, domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash("alice@example.com"), hash("alice@example.com"));
        assert_ne!(hash("alice@example.com"), hash("bob@example.com"));
    }

    #[test]
    fn test_split_address() {
        assert_eq!(
            split_address("alice@example.com"),
            Some(("alice", "example.com"))
        );
        assert_eq!(split_address("no-at-sign"), None);
        assert_eq!(split_address("@example.com"), None);
    }
}
