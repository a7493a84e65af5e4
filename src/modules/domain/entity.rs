// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{
    delete_impl, insert_impl, list_all_impl, secondary_find_impl, update_impl,
};
use crate::modules::error::code::ErrorCode;
use crate::modules::spam::SpamConfig;
use crate::{id, raise_error, utc_now};
use crate::modules::error::MailroomResult;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A mail domain served by this instance. Mail addressed to any mailbox
/// under an active MailDomain is delivered internally without an SMTP hop.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 1, version = 1)]
#[native_db(primary_key(pk -> String))]
pub struct MailDomain {
    #[secondary_key(unique)]
    pub id: u64,

    /// Fully qualified domain name; unique across the instance.
    #[secondary_key(unique)]
    pub name: String,

    /// When set, this domain is an alias of another MailDomain.
    pub alias_of: Option<u64>,

    /// Automatically create mailbox access for OIDC users whose email is
    /// under this domain.
    pub oidc_autojoin: bool,

    /// Keep identity mailboxes in sync with the identity provider.
    pub identity_sync: bool,

    /// Free-form JSON attributes attached by administrators.
    pub custom_attributes: Option<String>,

    /// Per-domain JSON overrides of process settings, e.g. SPAM_CONFIG.
    pub custom_settings: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl MailDomain {
    fn pk(&self) -> String {
        format!("{}_{}", self.created_at, self.id)
    }

    pub fn new(name: &str) -> Self {
        Self {
            id: id!(64),
            name: name.to_ascii_lowercase(),
            alias_of: None,
            oidc_autojoin: false,
            identity_sync: false,
            custom_attributes: None,
            custom_settings: None,
            created_at: utc_now!(),
            updated_at: utc_now!(),
        }
    }

    pub async fn get(id: u64) -> MailroomResult<Option<MailDomain>> {
        secondary_find_impl(DB_MANAGER.meta_db(), MailDomainKey::id, id).await
    }

    pub async fn get_by_name(name: &str) -> MailroomResult<Option<MailDomain>> {
        secondary_find_impl(
            DB_MANAGER.meta_db(),
            MailDomainKey::name,
            name.to_ascii_lowercase(),
        )
        .await
    }

    /// Whether mail for `domain` is served by this instance.
    pub async fn is_local(domain: &str) -> MailroomResult<bool> {
        Ok(Self::get_by_name(domain).await?.is_some())
    }

    pub async fn list_all() -> MailroomResult<Vec<MailDomain>> {
        list_all_impl(DB_MANAGER.meta_db()).await
    }

    pub async fn save(self) -> MailroomResult<()> {
        if Self::get_by_name(&self.name).await?.is_some() {
            return Err(raise_error!(
                format!("Mail domain '{}' already exists.", self.name),
                ErrorCode::AlreadyExists
            ));
        }
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn update_custom_settings(id: u64, custom_settings: Option<String>) -> MailroomResult<()> {
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .secondary::<MailDomain>(MailDomainKey::id, id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Mail domain with id={} not found", id),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.custom_settings = custom_settings;
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn delete(id: u64) -> MailroomResult<()> {
        delete_impl(DB_MANAGER.meta_db(), move |rw| {
            rw.get()
                .secondary::<MailDomain>(MailDomainKey::id, id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Mail domain with id={} not found", id),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }

    /// The spam configuration for this domain: the per-domain override when
    /// present, otherwise the process-wide SPAM_CONFIG.
    pub fn spam_config(&self) -> SpamConfig {
        if let Some(settings) = &self.custom_settings {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(settings) {
                if let Some(spam) = value.get("SPAM_CONFIG") {
                    if let Ok(config) = serde_json::from_value::<SpamConfig>(spam.clone()) {
                        return config;
                    }
                }
            }
        }
        SpamConfig::from_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spam_config_falls_back_to_process_settings() {
        let domain = MailDomain::new("example.com");
        let config = domain.spam_config();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_spam_config_prefers_domain_override() {
        let mut domain = MailDomain::new("example.com");
        domain.custom_settings = Some(
            r#"{"SPAM_CONFIG": {"rules": [{"header_match": "X-Spam: Yes", "action": "spam"}], "trusted_relays": 2}}"#
                .into(),
        );
        let config = domain.spam_config();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.trusted_relays, 2);
    }
}
