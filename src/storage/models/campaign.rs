//! Catalog rows and the read-only campaign context used for dispatch routing

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::{Currency, MacroKey, Money, Platform};
use crate::errors::Result;

/// Conversion fields a channel may source from a macro slot
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MappedField {
    ExternalId,
    Email,
    Phone,
    FirstName,
    LastName,
    Gclid,
    ContentIds,
}

pub type MacroMapping = BTreeMap<MappedField, MacroKey>;

/// Parse a stored mapping such as `{"gclid":"sub2","email":"sub5"}`
pub fn parse_macro_mapping(raw: Option<&str>) -> Result<MacroMapping> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(json) => Ok(serde_json::from_str(json)?),
        None => Ok(MacroMapping::new()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub traffic_channel_id: Option<i64>,
    pub offer_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacebookCredentials {
    pub pixel_id: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub test_event_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub account_id: Option<String>,
    pub conversion_id: Option<String>,
    pub conversion_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficChannel {
    pub id: i64,
    pub name: String,
    /// Raw value as configured; see [`TrafficChannel::platform`]
    pub platform_type: Option<String>,
    #[serde(default)]
    pub facebook: FacebookCredentials,
    #[serde(default)]
    pub google: GoogleCredentials,
    #[serde(default)]
    pub macro_mapping: MacroMapping,
}

impl TrafficChannel {
    pub fn platform(&self) -> Platform {
        Platform::from_channel(self.platform_type.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub name: String,
    pub offer_source_id: Option<i64>,
    pub payout_micros: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSource {
    pub id: i64,
    pub name: String,
}

/// Join of campaign, traffic channel, offer and offer source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignContext {
    pub campaign: Campaign,
    pub traffic_channel: Option<TrafficChannel>,
    pub offer: Option<Offer>,
    pub offer_source: Option<OfferSource>,
}

impl CampaignContext {
    pub fn platform(&self) -> Platform {
        self.traffic_channel
            .as_ref()
            .map(TrafficChannel::platform)
            .unwrap_or(Platform::None)
    }

    pub fn macro_mapping(&self) -> Option<&MacroMapping> {
        self.traffic_channel.as_ref().map(|c| &c.macro_mapping)
    }
}

/// Revenue and cost of one day in one currency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTotals {
    pub currency: Currency,
    pub revenue_micros: i64,
    pub cost_micros: i64,
}

/// One day of rolled-up campaign counters
///
/// Money is never summed across currencies; `money` holds one entry per
/// currency seen that day, ordered by code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub campaign_id: i64,
    pub day: NaiveDate,
    pub clicks: i64,
    pub lp_views: i64,
    pub lp_clicks: i64,
    pub conversions: i64,
    pub money: Vec<CurrencyTotals>,
}

impl CampaignMetrics {
    pub fn totals_for(&self, currency: &Currency) -> Option<&CurrencyTotals> {
        self.money.iter().find(|t| &t.currency == currency)
    }
}

/// Counter increment applied to a day bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsDelta {
    pub clicks: i64,
    pub lp_views: i64,
    pub lp_clicks: i64,
    pub conversions: i64,
}

/// Money increment applied to a (day, currency) bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoneyDelta {
    pub revenue_micros: i64,
    pub cost_micros: i64,
}

impl MoneyDelta {
    pub fn revenue(amount: Money) -> Self {
        Self {
            revenue_micros: amount.micros(),
            ..Default::default()
        }
    }

    pub fn cost(amount: Money) -> Self {
        Self {
            cost_micros: amount.micros(),
            ..Default::default()
        }
    }
}

impl MetricsDelta {
    pub fn click() -> Self {
        Self {
            clicks: 1,
            ..Default::default()
        }
    }

    pub fn lp_view() -> Self {
        Self {
            lp_views: 1,
            ..Default::default()
        }
    }

    pub fn lp_click() -> Self {
        Self {
            lp_clicks: 1,
            ..Default::default()
        }
    }

    pub fn conversion() -> Self {
        Self {
            conversions: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_macro_mapping() {
        let mapping = parse_macro_mapping(Some(r#"{"gclid":"sub2","email":"SUB5"}"#)).unwrap();
        assert_eq!(mapping[&MappedField::Gclid].number(), 2);
        assert_eq!(mapping[&MappedField::Email].number(), 5);

        assert!(parse_macro_mapping(None).unwrap().is_empty());
        assert!(parse_macro_mapping(Some("  ")).unwrap().is_empty());
        assert!(parse_macro_mapping(Some(r#"{"gclid":"sub40"}"#)).is_err());
        assert!(parse_macro_mapping(Some(r#"{"nickname":"sub1"}"#)).is_err());
    }

    #[test]
    fn test_access_token_not_serialized() {
        let creds = FacebookCredentials {
            pixel_id: Some("123".into()),
            access_token: Some("secret".into()),
            test_event_code: None,
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert!(!json.contains("secret"));
    }
}
