//! Ledger types: inbound conversion events, stored conversions and costs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Click, Currency, MacroPatch, MacroSet, Money};
use crate::utils::hashing::hash_identifier;

/// Plaintext user identifiers as received on a postback
///
/// Never persisted; only [`HashedIdentifiers`] reach the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserIdentifiers {
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// SHA-256 hex digests of normalized identifiers; absent when not supplied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedIdentifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

fn hash_opt(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(hash_identifier)
        .filter(|h| !h.is_empty())
}

impl HashedIdentifiers {
    pub fn from_plain(plain: &UserIdentifiers) -> Self {
        Self {
            external_id: hash_opt(&plain.external_id),
            email: hash_opt(&plain.email),
            phone: hash_opt(&plain.phone),
            first_name: hash_opt(&plain.first_name),
            last_name: hash_opt(&plain.last_name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.external_id.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
    }
}

/// An inbound conversion (postback) before it is matched and recorded
#[derive(Debug, Clone, Default)]
pub struct ConversionEvent {
    pub click_id: Option<String>,
    /// gclid / fbclid forwarded by the advertiser
    pub platform_click_id: Option<String>,
    /// Used when the click cannot be resolved
    pub campaign_id: Option<i64>,
    pub revenue: Money,
    pub currency: Currency,
    pub event_name: String,
    pub identifiers: UserIdentifiers,
    pub content_ids: Vec<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub macros: MacroPatch,
}

pub const DEFAULT_EVENT_NAME: &str = "Purchase";

impl ConversionEvent {
    pub fn new(click_id: impl Into<String>, revenue: Money, currency: Currency) -> Self {
        Self {
            click_id: Some(click_id.into()),
            revenue,
            currency,
            event_name: DEFAULT_EVENT_NAME.to_string(),
            ..Default::default()
        }
    }

    /// Click id compared verbatim; `None` when absent or blank
    pub fn lookup_key(&self) -> Option<&str> {
        self.click_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// Outcome of resolving a conversion to its click
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub click: Option<Click>,
    pub macros: Option<MacroSet>,
    pub matched: bool,
}

impl MatchResult {
    pub fn unmatched() -> Self {
        Self::default()
    }

    pub fn matched(click: Click, macros: MacroSet) -> Self {
        Self {
            click: Some(click),
            macros: Some(macros),
            matched: true,
        }
    }
}

/// Append-only conversion record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: String,
    pub click_id: Option<String>,
    pub raw_click_id: Option<String>,
    pub platform_click_id: Option<String>,
    pub campaign_id: Option<i64>,
    pub matched: bool,
    pub revenue: Money,
    pub currency: Currency,
    pub event_name: String,
    pub identifiers: HashedIdentifiers,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub content_ids: Vec<String>,
    /// subN values sent with an unmatched postback; there is no click to
    /// merge them into, so they stay with the conversion
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub postback_macros: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Conversion {
    /// Build the ledger row for an event; `matched` decides the click link
    pub fn from_event(id: String, result: &MatchResult, event: &ConversionEvent) -> Self {
        let click = result.click.as_ref().filter(|_| result.matched);
        Self {
            id,
            click_id: click.map(|c| c.click_id.clone()),
            raw_click_id: event.click_id.clone(),
            platform_click_id: event.platform_click_id.clone(),
            campaign_id: click.map(|c| c.campaign_id()).or(event.campaign_id),
            matched: click.is_some(),
            revenue: event.revenue,
            currency: event.currency.clone(),
            event_name: event.event_name.clone(),
            identifiers: HashedIdentifiers::from_plain(&event.identifiers),
            client_ip: event
                .client_ip
                .clone()
                .or_else(|| click.and_then(|c| c.context.ip_address.clone())),
            user_agent: event
                .user_agent
                .clone()
                .or_else(|| click.and_then(|c| c.context.user_agent.clone())),
            content_ids: event.content_ids.clone(),
            postback_macros: match click {
                Some(_) => BTreeMap::new(),
                None => event.macros.to_map(),
            },
            created_at: Utc::now(),
        }
    }
}

/// Ad-spend entry; negative amounts are compensating corrections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEntry {
    pub id: String,
    pub click_id: String,
    pub campaign_id: Option<i64>,
    pub amount: Money,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}
