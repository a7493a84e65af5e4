// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};

pub mod signal;
pub mod tls;

/// One side of an address header, as parsed from or written to RFC 5322 mail.
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Addr {
    /// The display name associated with the address (e.g., "John Doe").
    pub name: String,
    /// The address itself (e.g., "john.doe@example.com").
    pub email: String,
}

impl Addr {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Addr::new("John Doe", "john@example.com").display(),
            "John Doe <john@example.com>"
        );
        assert_eq!(Addr::new("", "john@example.com").display(), "john@example.com");
    }
}
