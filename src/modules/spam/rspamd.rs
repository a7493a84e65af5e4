// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailroomResult;
use crate::{mailroom_version, raise_error};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct RspamdResponse {
    pub action: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub required_score: f64,
}

/// POSTs the raw MIME to rspamd's checkv2 endpoint. Only an explicit
/// `reject` verdict counts as spam.
pub async fn check(rspamd_url: &str, auth: Option<&str>, raw: &[u8]) -> MailroomResult<bool> {
    let client = reqwest::ClientBuilder::new()
        .user_agent(format!("mailroom/{}", mailroom_version!()))
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

    let url = format!("{}/checkv2", rspamd_url.trim_end_matches('/'));
    let mut request = client.post(&url).body(raw.to_vec());
    if let Some(auth) = auth {
        request = request.header("Authorization", auth);
    }

    let response = request
        .send()
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransportFailed))?;

    if !response.status().is_success() {
        return Err(raise_error!(
            format!("rspamd returned HTTP {}", response.status()),
            ErrorCode::HttpResponseError
        ));
    }

    let verdict: RspamdResponse = response
        .json()
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::HttpResponseError))?;

    tracing::debug!(
        "rspamd verdict action={} score={} required={}",
        verdict.action,
        verdict.score,
        verdict.required_score
    );

    Ok(verdict.action.eq_ignore_ascii_case("reject"))
}
