// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::modules::transport::dns::RESOLVER;
use crate::raise_error;
use mail_auth::{AuthenticatedMessage, DkimResult};

/// Verifies the DKIM signatures of `raw` by resolving the public keys at
/// `<selector>._domainkey.<domain>`. Every present signature must pass.
///
/// Returns the failure reason so the dispatcher can park external
/// recipients in Retry with a meaningful `delivery_message`.
pub async fn verify_message(raw: &[u8]) -> MailroomResult<()> {
    let authenticated = AuthenticatedMessage::parse(raw).ok_or_else(|| {
        raise_error!(
            "message is not verifiable RFC 5322".into(),
            ErrorCode::DkimVerificationFailed
        )
    })?;

    let outputs = RESOLVER.verify_dkim(&authenticated).await;
    if outputs.is_empty() {
        return Err(raise_error!(
            "no DKIM signature present".into(),
            ErrorCode::DkimVerificationFailed
        ));
    }
    for output in &outputs {
        match output.result() {
            DkimResult::Pass => {}
            other => {
                return Err(raise_error!(
                    format!("{:?}", other),
                    ErrorCode::DkimVerificationFailed
                ));
            }
        }
    }
    Ok(())
}
