//! Facebook Conversions API payload builder

use chrono::{DateTime, Utc};

use super::payload::{
    FacebookCustomData, FacebookEvent, FacebookPayload, FacebookRequest, FacebookUserData,
    ResolvedFields,
};
use crate::config::DispatchConfig;
use crate::errors::{AttributorError, Result};
use crate::storage::models::{Conversion, FacebookCredentials};

const ACTION_SOURCE: &str = "website";

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AttributorError::configuration(format!("Facebook {} is not configured", name)))
}

/// Access token for the send; never part of the stored payload
pub fn access_token(creds: &FacebookCredentials) -> Result<&str> {
    required(creds.access_token.as_deref(), "access token")
}

pub fn build_facebook_payload(
    creds: &FacebookCredentials,
    conversion: &Conversion,
    fields: &ResolvedFields,
    now: DateTime<Utc>,
) -> Result<FacebookPayload> {
    let pixel_id = required(creds.pixel_id.as_deref(), "pixel id")?;
    access_token(creds)?;

    let fbc = conversion
        .platform_click_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|fbclid| format!("fb.1.{}.{}", conversion.created_at.timestamp_millis(), fbclid));

    let user_data = FacebookUserData {
        external_id: fields.external_id.iter().cloned().collect(),
        em: fields.email.iter().cloned().collect(),
        ph: fields.phone.iter().cloned().collect(),
        first_name: fields.first_name.iter().cloned().collect(),
        last_name: fields.last_name.iter().cloned().collect(),
        client_ip_address: conversion.client_ip.clone(),
        client_user_agent: conversion.user_agent.clone(),
        fbc,
    };

    let event = FacebookEvent {
        event_name: conversion.event_name.clone(),
        event_time: now.timestamp(),
        action_source: ACTION_SOURCE.to_string(),
        event_id: conversion.id.clone(),
        user_data,
        custom_data: FacebookCustomData {
            value: conversion.revenue.to_f64(),
            currency: conversion.currency.as_str().to_string(),
            content_ids: fields.content_ids.clone(),
            custom: fields.custom.clone(),
        },
    };

    Ok(FacebookPayload {
        pixel_id: pixel_id.to_string(),
        request: FacebookRequest {
            data: vec![event],
            test_event_code: creds
                .test_event_code
                .clone()
                .filter(|c| !c.trim().is_empty()),
        },
    })
}

/// `{base}/{version}/{pixel_id}/events?access_token=..`
pub fn facebook_url(config: &DispatchConfig, pixel_id: &str, access_token: &str) -> String {
    format!(
        "{}/{}/{}/events?access_token={}",
        config.facebook_api_base.trim_end_matches('/'),
        config.facebook_api_version,
        urlencoding::encode(pixel_id),
        urlencoding::encode(access_token)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{ConversionEvent, Currency, MatchResult, Money};
    use crate::utils::hash_identifier;

    fn creds() -> FacebookCredentials {
        FacebookCredentials {
            pixel_id: Some("1234".into()),
            access_token: Some("tok".into()),
            test_event_code: None,
        }
    }

    fn conversion() -> Conversion {
        let mut event = ConversionEvent::new(
            "c1",
            Money::parse("10.00").unwrap(),
            Currency::default(),
        );
        event.platform_click_id = Some("IwAR0abc".into());
        Conversion::from_event("conv-1".into(), &MatchResult::unmatched(), &event)
    }

    #[test]
    fn test_missing_credentials_are_configuration_errors() {
        let fields = ResolvedFields::default();
        let now = Utc::now();

        let mut no_token = creds();
        no_token.access_token = Some("  ".into());
        let err = build_facebook_payload(&no_token, &conversion(), &fields, now).unwrap_err();
        assert!(matches!(err, AttributorError::Configuration(_)));

        let mut no_pixel = creds();
        no_pixel.pixel_id = None;
        let err = build_facebook_payload(&no_pixel, &conversion(), &fields, now).unwrap_err();
        assert!(matches!(err, AttributorError::Configuration(_)));
    }

    #[test]
    fn test_event_shape() {
        let conversion = conversion();
        let mut fields = ResolvedFields {
            email: Some(hash_identifier("Foo@Bar.com")),
            content_ids: vec!["sku1".into()],
            ..Default::default()
        };
        fields.custom.insert("custom_sub3".into(), "ad-9".into());
        let now = Utc::now();

        let payload = build_facebook_payload(&creds(), &conversion, &fields, now).unwrap();
        let body = serde_json::to_value(&payload.request).unwrap();
        let event = &body["data"][0];

        assert_eq!(event["event_name"], "Purchase");
        assert_eq!(event["event_time"], now.timestamp());
        assert_eq!(event["action_source"], "website");
        assert_eq!(event["event_id"], "conv-1");
        assert_eq!(event["user_data"]["em"][0], hash_identifier("foo@bar.com"));
        assert!(event["user_data"].get("ph").is_none());
        assert!(
            event["user_data"]["fbc"]
                .as_str()
                .unwrap()
                .ends_with(".IwAR0abc")
        );
        assert_eq!(event["custom_data"]["value"], 10.0);
        assert_eq!(event["custom_data"]["currency"], "USD");
        assert_eq!(event["custom_data"]["content_ids"][0], "sku1");
        assert_eq!(event["custom_data"]["custom_sub3"], "ad-9");
        assert!(body.get("test_event_code").is_none());
        assert!(!body.to_string().contains("tok"));
    }

    #[test]
    fn test_url_encodes_token() {
        let config = DispatchConfig::default();
        let url = facebook_url(&config, "1234", "a b&c");
        assert_eq!(
            url,
            "https://graph.facebook.com/v17.0/1234/events?access_token=a%20b%26c"
        );
    }
}
