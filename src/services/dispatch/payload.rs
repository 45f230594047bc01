//! Platform payloads
//!
//! A payload is the full outbound snapshot minus credentials. It is stored on
//! the dispatch record and re-sent unchanged on retries; the access token is
//! looked up again at send time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::models::{
    Conversion, MacroMapping, MacroSet, MappedField, MatchResult, Platform,
};
use crate::utils::hash_optional;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformPayload {
    Facebook(FacebookPayload),
    Google(GooglePayload),
    None,
}

impl PlatformPayload {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformPayload::Facebook(_) => Platform::Facebook,
            PlatformPayload::Google(_) => Platform::Google,
            PlatformPayload::None => Platform::None,
        }
    }

    /// JSON body exactly as posted to the platform
    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            PlatformPayload::Facebook(p) => serde_json::to_value(&p.request),
            PlatformPayload::Google(p) => serde_json::to_value(&p.request),
            PlatformPayload::None => Ok(serde_json::Value::Null),
        }
    }

    pub fn to_snapshot(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn from_snapshot(snapshot: &serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(snapshot.clone())
    }
}

// ---- Facebook Conversions API ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookPayload {
    pub pixel_id: String,
    pub request: FacebookRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookRequest {
    pub data: Vec<FacebookEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookEvent {
    pub event_name: String,
    /// Unix seconds
    pub event_time: i64,
    pub action_source: String,
    /// Conversion id, used by the platform for deduplication
    pub event_id: String,
    pub user_data: FacebookUserData,
    pub custom_data: FacebookCustomData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacebookUserData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub em: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ph: Vec<String>,
    #[serde(rename = "fn", default, skip_serializing_if = "Vec::is_empty")]
    pub first_name: Vec<String>,
    #[serde(rename = "ln", default, skip_serializing_if = "Vec::is_empty")]
    pub last_name: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    /// Click id cookie value built from fbclid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookCustomData {
    pub value: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_ids: Vec<String>,
    /// `custom_subN` for macros not mapped to a named field
    #[serde(flatten)]
    pub custom: BTreeMap<String, String>,
}

// ---- Google Ads click conversions ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GooglePayload {
    pub account_id: String,
    pub conversion_id: String,
    pub conversion_label: String,
    pub request: GoogleUploadRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUploadRequest {
    pub conversions: Vec<GoogleClickConversion>,
    pub partial_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleClickConversion {
    pub conversion_action: String,
    /// `yyyy-mm-dd hh:mm:ss+00:00`
    pub conversion_date_time: String,
    pub conversion_value: f64,
    pub currency_code: String,
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_identifiers: Vec<GoogleUserIdentifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUserIdentifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_info: Option<GoogleAddressInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAddressInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_last_name: Option<String>,
}

// ---- field resolution ----

/// Named fields resolved from the conversion, then from mapped macros
///
/// Identifier fields are always hashed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFields {
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gclid: Option<String>,
    pub content_ids: Vec<String>,
    /// `custom_subN -> value` for unmapped macros
    pub custom: BTreeMap<String, String>,
}

fn mapped_value<'a>(
    macros: Option<&'a MacroSet>,
    mapping: &MacroMapping,
    field: MappedField,
) -> Option<&'a str> {
    let key = mapping.get(&field)?;
    macros.and_then(|m| m.get(*key))
}

impl ResolvedFields {
    pub fn resolve(
        conversion: &Conversion,
        result: &MatchResult,
        mapping: Option<&MacroMapping>,
    ) -> Self {
        let empty = MacroMapping::new();
        let mapping = mapping.unwrap_or(&empty);
        let macros = result.macros.as_ref().filter(|_| result.matched);

        let mapped = |field: MappedField| mapped_value(macros, mapping, field);
        let mapped_hash = |field: MappedField| hash_optional(mapped(field));

        let ids = &conversion.identifiers;
        let content_ids = if conversion.content_ids.is_empty() {
            mapped(MappedField::ContentIds)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        } else {
            conversion.content_ids.clone()
        };

        let custom = macros
            .map(|m| {
                m.iter()
                    .filter(|(key, _)| !mapping.values().any(|k| k == key))
                    .map(|(key, value)| (format!("custom_{}", key), value.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            external_id: ids
                .external_id
                .clone()
                .or_else(|| mapped_hash(MappedField::ExternalId)),
            email: ids.email.clone().or_else(|| mapped_hash(MappedField::Email)),
            phone: ids.phone.clone().or_else(|| mapped_hash(MappedField::Phone)),
            first_name: ids
                .first_name
                .clone()
                .or_else(|| mapped_hash(MappedField::FirstName)),
            last_name: ids
                .last_name
                .clone()
                .or_else(|| mapped_hash(MappedField::LastName)),
            gclid: conversion
                .platform_click_id
                .clone()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| mapped(MappedField::Gclid).map(String::from)),
            content_ids,
            custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{
        Click, ClickContext, ConversionEvent, Currency, MacroKey, MacroPatch, Money,
        UserIdentifiers,
    };
    use crate::utils::hash_identifier;

    fn key(n: u8) -> MacroKey {
        MacroKey::new(n).unwrap()
    }

    fn matched_with(patch: MacroPatch) -> MatchResult {
        let click = Click::new("c1", ClickContext::default());
        MatchResult::matched(click, MacroSet::from_patch("c1", &patch))
    }

    fn conversion(event: &ConversionEvent, result: &MatchResult) -> Conversion {
        Conversion::from_event("conv-1".into(), result, event)
    }

    #[test]
    fn test_event_fields_take_precedence_over_macros() {
        let result = matched_with(MacroPatch::new().with(key(5), "macro@example.com"));
        let mut event = ConversionEvent::new("c1", Money::ZERO, Currency::default());
        event.identifiers = UserIdentifiers {
            email: Some("Event@Example.com".into()),
            ..Default::default()
        };
        let mapping = MacroMapping::from([(MappedField::Email, key(5))]);

        let fields = ResolvedFields::resolve(&conversion(&event, &result), &result, Some(&mapping));
        assert_eq!(fields.email, Some(hash_identifier("event@example.com")));
    }

    #[test]
    fn test_mapped_macros_fill_missing_fields_and_are_not_echoed() {
        let result = matched_with(
            MacroPatch::new()
                .with(key(1), "ad-42")
                .with(key(2), "GCLID-XYZ")
                .with(key(3), " Foo@Bar.com ")
                .with(key(4), "sku1, sku2"),
        );
        let event = ConversionEvent::new("c1", Money::ZERO, Currency::default());
        let mapping = MacroMapping::from([
            (MappedField::Gclid, key(2)),
            (MappedField::Email, key(3)),
            (MappedField::ContentIds, key(4)),
        ]);

        let fields = ResolvedFields::resolve(&conversion(&event, &result), &result, Some(&mapping));
        assert_eq!(fields.gclid.as_deref(), Some("GCLID-XYZ"));
        assert_eq!(fields.email, Some(hash_identifier("foo@bar.com")));
        assert_eq!(fields.content_ids, vec!["sku1", "sku2"]);
        assert_eq!(fields.custom.len(), 1);
        assert_eq!(fields.custom["custom_sub1"], "ad-42");
    }

    #[test]
    fn test_unmatched_result_ignores_macros() {
        let mut result = matched_with(MacroPatch::new().with(key(1), "x"));
        result.matched = false;
        let event = ConversionEvent::new("c1", Money::ZERO, Currency::default());

        let fields = ResolvedFields::resolve(&conversion(&event, &result), &result, None);
        assert!(fields.custom.is_empty());
    }

    #[test]
    fn test_none_payload_snapshot() {
        let snapshot = PlatformPayload::None.to_snapshot().unwrap();
        assert_eq!(snapshot, serde_json::json!({ "platform": "none" }));
        assert_eq!(
            PlatformPayload::from_snapshot(&snapshot).unwrap(),
            PlatformPayload::None
        );
    }
}
