// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    ValidationFailed = 10010,
    MissingConfiguration = 10020,
    ExceedsLimitation = 10040,
    MimeParseFailed = 10050,

    // Authentication and authorization errors (20000–20999)
    PermissionDenied = 20000,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,
    AlreadyExists = 30010,

    // Network and delivery errors (40000–40999)
    TransportFailed = 40000,
    ConnectionTimeout = 40010,
    HttpResponseError = 40030,
    DnsLookupFailed = 40040,

    // Mail service errors (50000–50999)
    SmtpCommandFailed = 50030,
    SmtpConnectionFailed = 50040,
    DkimSigningFailed = 50060,
    DkimVerificationFailed = 50070,

    // Internal system errors (70000–70999)
    InternalError = 70000,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameter
            | ErrorCode::MissingConfiguration
            | ErrorCode::MimeParseFailed => StatusCode::BAD_REQUEST,
            ErrorCode::ValidationFailed | ErrorCode::ExceedsLimitation => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::TransportFailed
            | ErrorCode::ConnectionTimeout
            | ErrorCode::HttpResponseError
            | ErrorCode::DnsLookupFailed
            | ErrorCode::SmtpCommandFailed
            | ErrorCode::SmtpConnectionFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::DkimSigningFailed
            | ErrorCode::DkimVerificationFailed
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
