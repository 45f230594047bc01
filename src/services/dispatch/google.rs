//! Google Ads click conversion payload builder
//!
//! gclid wins when present; otherwise hashed enhanced-conversion
//! identifiers are sent.

use super::payload::{
    GoogleAddressInfo, GoogleClickConversion, GooglePayload, GoogleUploadRequest,
    GoogleUserIdentifier, ResolvedFields,
};
use crate::config::DispatchConfig;
use crate::errors::{AttributorError, Result};
use crate::storage::models::{Conversion, GoogleCredentials};

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AttributorError::configuration(format!("Google {} is not configured", name)))
}

fn enhanced_identifiers(fields: &ResolvedFields) -> Vec<GoogleUserIdentifier> {
    let mut identifiers = Vec::new();

    if let Some(email) = &fields.email {
        identifiers.push(GoogleUserIdentifier {
            hashed_email: Some(email.clone()),
            ..Default::default()
        });
    }
    if let Some(phone) = &fields.phone {
        identifiers.push(GoogleUserIdentifier {
            hashed_phone_number: Some(phone.clone()),
            ..Default::default()
        });
    }
    if fields.first_name.is_some() || fields.last_name.is_some() {
        identifiers.push(GoogleUserIdentifier {
            address_info: Some(GoogleAddressInfo {
                hashed_first_name: fields.first_name.clone(),
                hashed_last_name: fields.last_name.clone(),
            }),
            ..Default::default()
        });
    }

    identifiers
}

pub fn build_google_payload(
    creds: &GoogleCredentials,
    conversion: &Conversion,
    fields: &ResolvedFields,
) -> Result<GooglePayload> {
    let account_id = required(creds.account_id.as_deref(), "account id")?;
    let conversion_id = required(creds.conversion_id.as_deref(), "conversion id")?;
    let conversion_label = required(creds.conversion_label.as_deref(), "conversion label")?;

    let gclid = fields.gclid.clone();
    let user_identifiers = if gclid.is_some() {
        Vec::new()
    } else {
        enhanced_identifiers(fields)
    };

    let click_conversion = GoogleClickConversion {
        conversion_action: format!(
            "customers/{}/conversionActions/{}",
            account_id, conversion_id
        ),
        conversion_date_time: conversion
            .created_at
            .format("%Y-%m-%d %H:%M:%S+00:00")
            .to_string(),
        conversion_value: conversion.revenue.to_f64(),
        currency_code: conversion.currency.as_str().to_string(),
        order_id: conversion.id.clone(),
        gclid,
        user_identifiers,
    };

    Ok(GooglePayload {
        account_id: account_id.to_string(),
        conversion_id: conversion_id.to_string(),
        conversion_label: conversion_label.to_string(),
        request: GoogleUploadRequest {
            conversions: vec![click_conversion],
            partial_failure: true,
        },
    })
}

/// `{base}/pagead/conversion/{conversion_id}/?cv={label}`
pub fn google_url(config: &DispatchConfig, conversion_id: &str, conversion_label: &str) -> String {
    format!(
        "{}/pagead/conversion/{}/?cv={}",
        config.google_api_base.trim_end_matches('/'),
        urlencoding::encode(conversion_id),
        urlencoding::encode(conversion_label)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{ConversionEvent, Currency, MatchResult, Money};
    use crate::utils::hash_identifier;

    fn creds() -> GoogleCredentials {
        GoogleCredentials {
            account_id: Some("111".into()),
            conversion_id: Some("AW-222".into()),
            conversion_label: Some("lbl".into()),
        }
    }

    fn conversion() -> Conversion {
        let event = ConversionEvent::new(
            "c1",
            Money::parse("4.50").unwrap(),
            Currency::parse("eur").unwrap(),
        );
        Conversion::from_event("conv-7".into(), &MatchResult::unmatched(), &event)
    }

    #[test]
    fn test_missing_label_is_configuration_error() {
        let mut creds = creds();
        creds.conversion_label = None;
        let err = build_google_payload(&creds, &conversion(), &ResolvedFields::default()).unwrap_err();
        assert!(matches!(err, AttributorError::Configuration(_)));
    }

    #[test]
    fn test_gclid_preferred_over_identifiers() {
        let fields = ResolvedFields {
            gclid: Some("GCLID1".into()),
            email: Some(hash_identifier("a@b.com")),
            ..Default::default()
        };
        let payload = build_google_payload(&creds(), &conversion(), &fields).unwrap();
        let body = serde_json::to_value(&payload.request).unwrap();
        let conv = &body["conversions"][0];

        assert_eq!(conv["gclid"], "GCLID1");
        assert!(conv.get("userIdentifiers").is_none());
        assert_eq!(conv["conversionAction"], "customers/111/conversionActions/AW-222");
        assert_eq!(conv["currencyCode"], "EUR");
        assert_eq!(conv["conversionValue"], 4.5);
        assert_eq!(conv["orderId"], "conv-7");
        assert_eq!(body["partialFailure"], true);
    }

    #[test]
    fn test_enhanced_identifiers_without_gclid() {
        let fields = ResolvedFields {
            email: Some(hash_identifier(" Foo@Bar.com")),
            phone: Some(hash_identifier("+15550100")),
            last_name: Some(hash_identifier("Doe")),
            ..Default::default()
        };
        let payload = build_google_payload(&creds(), &conversion(), &fields).unwrap();
        let body = serde_json::to_value(&payload.request).unwrap();
        let ids = body["conversions"][0]["userIdentifiers"].as_array().unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0]["hashedEmail"], hash_identifier("foo@bar.com"));
        assert_eq!(ids[1]["hashedPhoneNumber"], hash_identifier("+15550100"));
        assert_eq!(ids[2]["addressInfo"]["hashedLastName"], hash_identifier("doe"));
        assert!(ids[2]["addressInfo"].get("hashedFirstName").is_none());
    }

    #[test]
    fn test_url() {
        let url = google_url(&DispatchConfig::default(), "AW-222", "lbl");
        assert_eq!(
            url,
            "https://www.googleadservices.com/pagead/conversion/AW-222/?cv=lbl"
        );
    }
}
