//! Loose inbound parameters
//!
//! Trackers and advertisers send the same fields as JSON bodies or query
//! strings, with numbers as either strings or numbers. Everything is first
//! flattened to `name -> string`, then picked apart.

use std::collections::BTreeMap;

use actix_web::HttpRequest;
use actix_web::http::header::USER_AGENT;
use serde_json::Value;
use tracing::trace;

use crate::errors::{AttributorError, Result};
use crate::storage::models::{
    ConversionEvent, Currency, DEFAULT_EVENT_NAME, MacroPatch, Money, UserIdentifiers,
};
use crate::utils::extract_client_ip;

pub type Params = BTreeMap<String, String>;

/// Scalars become strings; null, arrays and objects are dropped
pub fn params_from_json(body: BTreeMap<String, Value>) -> Params {
    body.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(items) => items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                _ => return None,
            };
            Some((key.to_ascii_lowercase(), value))
        })
        .collect()
}

pub fn params_from_query(query: BTreeMap<String, String>) -> Params {
    query
        .into_iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), value))
        .collect()
}

/// Split `subN` keys into a patch; a `sub*` key out of range is an error
pub fn take_macros(params: &mut Params) -> Result<MacroPatch> {
    let keys: Vec<String> = params
        .keys()
        .filter(|k| k.starts_with("sub"))
        .cloned()
        .collect();

    let mut pairs = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(value) = params.remove(&key) {
            pairs.push((key, value));
        }
    }
    MacroPatch::from_pairs(pairs)
}

pub fn take_string(params: &mut Params, names: &[&str]) -> Option<String> {
    take_id(params, names).map(|value| value.trim().to_string())
}

/// Like [`take_string`] but returns the value verbatim; ids are opaque
pub fn take_id(params: &mut Params, names: &[&str]) -> Option<String> {
    let mut found = None;
    for name in names {
        if let Some(value) = params.remove(*name)
            && found.is_none()
            && !value.trim().is_empty()
        {
            found = Some(value);
        }
    }
    found
}

pub fn take_i64(params: &mut Params, names: &[&str]) -> Result<Option<i64>> {
    let name = names.first().copied().unwrap_or_default();
    take_string(params, names)
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| {
                AttributorError::validation(format!("{} must be an integer, got '{}'", name, raw))
            })
        })
        .transpose()
}

pub fn take_money(params: &mut Params, names: &[&str]) -> Result<Option<Money>> {
    take_string(params, names)
        .map(|raw| Money::parse(&raw))
        .transpose()
}

pub fn take_currency(params: &mut Params) -> Result<Currency> {
    match take_string(params, &["currency"]) {
        Some(raw) => Currency::parse(&raw),
        None => Ok(Currency::default()),
    }
}

/// Request user agent when the payload does not carry one
pub fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}

/// Build a conversion event from postback parameters
///
/// `ip` / `user_agent` fall back to the caller's own. Unrecognized
/// parameters are ignored.
pub fn conversion_event(mut params: Params, req: &HttpRequest) -> Result<ConversionEvent> {
    let macros = take_macros(&mut params)?;

    let content_ids = take_string(&mut params, &["content_ids"])
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let event = ConversionEvent {
        click_id: take_id(&mut params, &["click_id", "clickid"]),
        platform_click_id: take_string(&mut params, &["gclid", "fbclid"]),
        campaign_id: take_i64(&mut params, &["campaign_id"])?,
        revenue: take_money(&mut params, &["revenue", "payout"])?.unwrap_or(Money::ZERO),
        currency: take_currency(&mut params)?,
        event_name: take_string(&mut params, &["event_name"])
            .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
        identifiers: UserIdentifiers {
            external_id: take_string(&mut params, &["external_id"]),
            email: take_string(&mut params, &["email"]),
            phone: take_string(&mut params, &["phone"]),
            first_name: take_string(&mut params, &["first_name"]),
            last_name: take_string(&mut params, &["last_name"]),
        },
        content_ids,
        client_ip: take_string(&mut params, &["ip"]).or_else(|| extract_client_ip(req)),
        user_agent: take_string(&mut params, &["user_agent"]).or_else(|| user_agent(req)),
        macros,
    };

    if !params.is_empty() {
        trace!("Ignored postback parameters: {:?}", params.keys().collect::<Vec<_>>());
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_params(value: Value) -> Params {
        let map: BTreeMap<String, Value> = serde_json::from_value(value).unwrap();
        params_from_json(map)
    }

    #[test]
    fn test_json_scalars_flatten() {
        let params = json_params(json!({
            "Revenue": 10.5,
            "campaign_id": 7,
            "content_ids": ["a", 2],
            "extra": null,
        }));
        assert_eq!(params["revenue"], "10.5");
        assert_eq!(params["campaign_id"], "7");
        assert_eq!(params["content_ids"], "a,2");
        assert!(!params.contains_key("extra"));
    }

    #[test]
    fn test_take_macros() {
        let mut params = json_params(json!({ "sub1": "abc", "SUB2": "", "click_id": "c1" }));
        let patch = take_macros(&mut params).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(params.len(), 1);

        let mut params = json_params(json!({ "sub26": "x" }));
        let err = take_macros(&mut params).unwrap_err();
        assert!(matches!(err, AttributorError::InvalidMacroKey(_)));
    }

    #[test]
    fn test_take_string_prefers_first_alias() {
        let mut params = json_params(json!({ "gclid": "G", "fbclid": "F" }));
        assert_eq!(take_string(&mut params, &["gclid", "fbclid"]).as_deref(), Some("G"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_take_id_keeps_value_verbatim() {
        let mut params = json_params(json!({ "click_id": " c1 ", "ip": " 10.0.0.1 " }));
        assert_eq!(take_id(&mut params, &["click_id"]).as_deref(), Some(" c1 "));
        assert_eq!(take_string(&mut params, &["ip"]).as_deref(), Some("10.0.0.1"));

        let mut params = json_params(json!({ "click_id": "   " }));
        assert_eq!(take_id(&mut params, &["click_id"]), None);
    }

    #[test]
    fn test_take_i64_rejects_garbage() {
        let mut params = json_params(json!({ "campaign_id": "abc" }));
        assert!(take_i64(&mut params, &["campaign_id"]).is_err());
    }
}
