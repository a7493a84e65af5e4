// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use snafu::{Location, Snafu};

pub mod code;

use code::ErrorCode;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MailroomError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

impl MailroomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MailroomError::Generic { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MailroomError::Generic { message, .. } => message,
        }
    }
}

pub type MailroomResult<T, E = MailroomError> = std::result::Result<T, E>;
