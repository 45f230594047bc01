//! Entity model <-> domain type conversions

use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};

use crate::errors::{AttributorError, Result};
use crate::storage::models::{
    Campaign, CampaignMetrics, Click, ClickContext, Conversion, CostEntry, Currency,
    CurrencyTotals, DispatchRecord, FacebookCredentials, GoogleCredentials, HashedIdentifiers, MacroKey, MacroSet,
    Money, Offer, OfferSource, TrafficChannel, parse_macro_mapping,
};
use migration::entities::{
    campaign, campaign_metrics_daily, campaign_money_daily, click, conversion, cost_entry, dispatch_record, macro_set,
    offer, offer_source, traffic_channel,
};

// ---- clicks ----

pub fn model_to_click(model: click::Model) -> Click {
    Click {
        click_id: model.click_id,
        context: ClickContext {
            campaign_id: model.campaign_id,
            traffic_channel_id: model.traffic_channel_id,
            lander_id: model.lander_id,
            offer_id: model.offer_id,
            ip_address: model.ip_address,
            user_agent: model.user_agent,
            country: model.country,
            region: model.region,
            city: model.city,
        },
        clicked_at: model.clicked_at,
        converted: model.converted,
    }
}

pub fn click_to_active_model(click: &Click) -> click::ActiveModel {
    let ctx = &click.context;
    click::ActiveModel {
        click_id: Set(click.click_id.clone()),
        campaign_id: Set(ctx.campaign_id),
        traffic_channel_id: Set(ctx.traffic_channel_id),
        lander_id: Set(ctx.lander_id),
        offer_id: Set(ctx.offer_id),
        ip_address: Set(ctx.ip_address.clone()),
        user_agent: Set(ctx.user_agent.clone()),
        country: Set(ctx.country.clone()),
        region: Set(ctx.region.clone()),
        city: Set(ctx.city.clone()),
        clicked_at: Set(click.clicked_at),
        converted: Set(click.converted),
    }
}

// ---- macros ----

/// Column backing a macro slot
pub fn macro_column(key: MacroKey) -> macro_set::Column {
    use macro_set::Column as C;
    const COLUMNS: [macro_set::Column; 25] = [
        C::Sub1, C::Sub2, C::Sub3, C::Sub4, C::Sub5, C::Sub6, C::Sub7, C::Sub8, C::Sub9,
        C::Sub10, C::Sub11, C::Sub12, C::Sub13, C::Sub14, C::Sub15, C::Sub16, C::Sub17,
        C::Sub18, C::Sub19, C::Sub20, C::Sub21, C::Sub22, C::Sub23, C::Sub24, C::Sub25,
    ];
    COLUMNS[key.index()]
}

pub fn model_to_macro_set(model: macro_set::Model) -> MacroSet {
    MacroSet {
        click_id: model.click_id,
        values: [
            model.sub1, model.sub2, model.sub3, model.sub4, model.sub5, model.sub6, model.sub7,
            model.sub8, model.sub9, model.sub10, model.sub11, model.sub12, model.sub13,
            model.sub14, model.sub15, model.sub16, model.sub17, model.sub18, model.sub19,
            model.sub20, model.sub21, model.sub22, model.sub23, model.sub24, model.sub25,
        ],
        version: model.version,
    }
}

pub fn macro_set_to_active_model(set: &MacroSet) -> macro_set::ActiveModel {
    let [
        sub1, sub2, sub3, sub4, sub5, sub6, sub7, sub8, sub9, sub10, sub11, sub12, sub13,
        sub14, sub15, sub16, sub17, sub18, sub19, sub20, sub21, sub22, sub23, sub24, sub25,
    ] = set.values.clone();

    macro_set::ActiveModel {
        click_id: Set(set.click_id.clone()),
        sub1: Set(sub1),
        sub2: Set(sub2),
        sub3: Set(sub3),
        sub4: Set(sub4),
        sub5: Set(sub5),
        sub6: Set(sub6),
        sub7: Set(sub7),
        sub8: Set(sub8),
        sub9: Set(sub9),
        sub10: Set(sub10),
        sub11: Set(sub11),
        sub12: Set(sub12),
        sub13: Set(sub13),
        sub14: Set(sub14),
        sub15: Set(sub15),
        sub16: Set(sub16),
        sub17: Set(sub17),
        sub18: Set(sub18),
        sub19: Set(sub19),
        sub20: Set(sub20),
        sub21: Set(sub21),
        sub22: Set(sub22),
        sub23: Set(sub23),
        sub24: Set(sub24),
        sub25: Set(sub25),
        version: Set(set.version),
        updated_at: Set(Utc::now()),
    }
}

// ---- ledger ----

pub fn model_to_conversion(model: conversion::Model) -> Result<Conversion> {
    let identifiers: HashedIdentifiers = match model.identifiers.as_deref() {
        Some(json) => serde_json::from_str(json)?,
        None => HashedIdentifiers::default(),
    };
    let content_ids: Vec<String> = match model.content_ids.as_deref() {
        Some(json) => serde_json::from_str(json)?,
        None => Vec::new(),
    };
    let postback_macros = match model.postback_macros.as_deref() {
        Some(json) => serde_json::from_str(json)?,
        None => Default::default(),
    };

    Ok(Conversion {
        id: model.id,
        click_id: model.click_id,
        raw_click_id: model.raw_click_id,
        platform_click_id: model.platform_click_id,
        campaign_id: model.campaign_id,
        matched: model.matched,
        revenue: Money::from_micros(model.revenue_micros),
        currency: Currency::parse(&model.currency)?,
        event_name: model.event_name,
        identifiers,
        client_ip: model.client_ip,
        user_agent: model.user_agent,
        content_ids,
        postback_macros,
        created_at: model.created_at,
    })
}

pub fn conversion_to_active_model(conv: &Conversion) -> Result<conversion::ActiveModel> {
    let identifiers = if conv.identifiers.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&conv.identifiers)?)
    };
    let content_ids = if conv.content_ids.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&conv.content_ids)?)
    };
    let postback_macros = if conv.postback_macros.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&conv.postback_macros)?)
    };

    Ok(conversion::ActiveModel {
        id: Set(conv.id.clone()),
        click_id: Set(conv.click_id.clone()),
        raw_click_id: Set(conv.raw_click_id.clone()),
        platform_click_id: Set(conv.platform_click_id.clone()),
        campaign_id: Set(conv.campaign_id),
        matched: Set(conv.matched),
        revenue_micros: Set(conv.revenue.micros()),
        currency: Set(conv.currency.to_string()),
        event_name: Set(conv.event_name.clone()),
        identifiers: Set(identifiers),
        client_ip: Set(conv.client_ip.clone()),
        user_agent: Set(conv.user_agent.clone()),
        content_ids: Set(content_ids),
        postback_macros: Set(postback_macros),
        created_at: Set(conv.created_at),
    })
}

pub fn model_to_cost_entry(model: cost_entry::Model) -> Result<CostEntry> {
    Ok(CostEntry {
        id: model.id,
        click_id: model.click_id,
        campaign_id: model.campaign_id,
        amount: Money::from_micros(model.amount_micros),
        currency: Currency::parse(&model.currency)?,
        created_at: model.created_at,
    })
}

pub fn cost_entry_to_active_model(entry: &CostEntry) -> cost_entry::ActiveModel {
    cost_entry::ActiveModel {
        id: Set(entry.id.clone()),
        click_id: Set(entry.click_id.clone()),
        campaign_id: Set(entry.campaign_id),
        amount_micros: Set(entry.amount.micros()),
        currency: Set(entry.currency.to_string()),
        created_at: Set(entry.created_at),
    }
}

// ---- dispatch ----

pub fn model_to_dispatch_record(model: dispatch_record::Model) -> Result<DispatchRecord> {
    Ok(DispatchRecord {
        id: model.id,
        conversion_id: model.conversion_id,
        platform: model.platform.parse().map_err(|_| {
            AttributorError::database_operation(format!("Unknown platform '{}'", model.platform))
        })?,
        payload: serde_json::from_str(&model.payload)?,
        status: model.status.parse().map_err(|_| {
            AttributorError::database_operation(format!(
                "Unknown dispatch status '{}'",
                model.status
            ))
        })?,
        response: model.response,
        error_code: model.error_code,
        retryable: model.retryable,
        attempt_count: model.attempt_count.max(0) as u32,
        last_attempt_at: model.last_attempt_at,
        created_at: model.created_at,
    })
}

/// `id == 0` leaves the key unset so the database assigns it
pub fn dispatch_record_to_active_model(
    record: &DispatchRecord,
) -> Result<dispatch_record::ActiveModel> {
    Ok(dispatch_record::ActiveModel {
        id: if record.id == 0 { NotSet } else { Set(record.id) },
        conversion_id: Set(record.conversion_id.clone()),
        platform: Set(record.platform.to_string()),
        payload: Set(serde_json::to_string(&record.payload)?),
        status: Set(record.status.to_string()),
        response: Set(record.response.clone()),
        error_code: Set(record.error_code.clone()),
        retryable: Set(record.retryable),
        attempt_count: Set(record.attempt_count.min(i32::MAX as u32) as i32),
        last_attempt_at: Set(record.last_attempt_at),
        created_at: Set(record.created_at),
    })
}

// ---- catalog ----

pub fn model_to_campaign(model: campaign::Model) -> Campaign {
    Campaign {
        id: model.id,
        name: model.name,
        traffic_channel_id: model.traffic_channel_id,
        offer_id: model.offer_id,
    }
}

pub fn campaign_to_active_model(c: &Campaign) -> campaign::ActiveModel {
    campaign::ActiveModel {
        id: Set(c.id),
        name: Set(c.name.clone()),
        traffic_channel_id: Set(c.traffic_channel_id),
        offer_id: Set(c.offer_id),
        updated_at: Set(Utc::now()),
    }
}

pub fn model_to_traffic_channel(model: traffic_channel::Model) -> Result<TrafficChannel> {
    Ok(TrafficChannel {
        id: model.id,
        name: model.name,
        platform_type: model.platform_type,
        facebook: FacebookCredentials {
            pixel_id: model.facebook_pixel_id,
            access_token: model.facebook_access_token,
            test_event_code: model.facebook_test_event_code,
        },
        google: GoogleCredentials {
            account_id: model.google_account_id,
            conversion_id: model.google_conversion_id,
            conversion_label: model.google_conversion_label,
        },
        macro_mapping: parse_macro_mapping(model.macro_mapping.as_deref())?,
    })
}

pub fn traffic_channel_to_active_model(
    channel: &TrafficChannel,
) -> Result<traffic_channel::ActiveModel> {
    let mapping = if channel.macro_mapping.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&channel.macro_mapping)?)
    };

    Ok(traffic_channel::ActiveModel {
        id: Set(channel.id),
        name: Set(channel.name.clone()),
        platform_type: Set(channel.platform_type.clone()),
        facebook_pixel_id: Set(channel.facebook.pixel_id.clone()),
        facebook_access_token: Set(channel.facebook.access_token.clone()),
        facebook_test_event_code: Set(channel.facebook.test_event_code.clone()),
        google_account_id: Set(channel.google.account_id.clone()),
        google_conversion_id: Set(channel.google.conversion_id.clone()),
        google_conversion_label: Set(channel.google.conversion_label.clone()),
        macro_mapping: Set(mapping),
        updated_at: Set(Utc::now()),
    })
}

pub fn model_to_offer(model: offer::Model) -> Offer {
    Offer {
        id: model.id,
        name: model.name,
        offer_source_id: model.offer_source_id,
        payout_micros: model.payout_micros,
    }
}

pub fn offer_to_active_model(o: &Offer) -> offer::ActiveModel {
    offer::ActiveModel {
        id: Set(o.id),
        name: Set(o.name.clone()),
        offer_source_id: Set(o.offer_source_id),
        payout_micros: Set(o.payout_micros),
        updated_at: Set(Utc::now()),
    }
}

pub fn model_to_offer_source(model: offer_source::Model) -> OfferSource {
    OfferSource {
        id: model.id,
        name: model.name,
    }
}

pub fn offer_source_to_active_model(s: &OfferSource) -> offer_source::ActiveModel {
    offer_source::ActiveModel {
        id: Set(s.id),
        name: Set(s.name.clone()),
        updated_at: Set(Utc::now()),
    }
}

pub fn model_to_metrics(model: campaign_metrics_daily::Model) -> CampaignMetrics {
    CampaignMetrics {
        campaign_id: model.campaign_id,
        day: model.day_bucket,
        clicks: model.clicks,
        lp_views: model.lp_views,
        lp_clicks: model.lp_clicks,
        conversions: model.conversions,
        money: Vec::new(),
    }
}

pub fn model_to_currency_totals(model: campaign_money_daily::Model) -> Result<CurrencyTotals> {
    Ok(CurrencyTotals {
        currency: Currency::parse(&model.currency)?,
        revenue_micros: model.revenue_micros,
        cost_micros: model.cost_micros,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{DispatchStatus, MacroPatch, Platform};
    use sea_orm::ActiveValue;

    #[test]
    fn test_macro_column_mapping() {
        use sea_orm::IdenStatic;
        for key in MacroKey::all() {
            assert_eq!(macro_column(key).as_str(), key.name());
        }
    }

    #[test]
    fn test_macro_set_roundtrip_through_active_model() {
        let patch = MacroPatch::new()
            .with(MacroKey::new(1).unwrap(), "a")
            .with(MacroKey::new(25).unwrap(), "z");
        let mut set = MacroSet::from_patch("c1", &patch);
        set.version = 3;

        let active = macro_set_to_active_model(&set);
        assert!(matches!(active.sub1, ActiveValue::Set(Some(ref v)) if v == "a"));
        assert!(matches!(active.sub2, ActiveValue::Set(None)));
        assert!(matches!(active.sub25, ActiveValue::Set(Some(ref v)) if v == "z"));
        assert!(matches!(active.version, ActiveValue::Set(3)));
    }

    #[test]
    fn test_new_dispatch_record_leaves_id_unset() {
        let record = DispatchRecord::pending("conv", Platform::Google, serde_json::json!({"a": 1}));
        let active = dispatch_record_to_active_model(&record).unwrap();
        assert!(matches!(active.id, ActiveValue::NotSet));
        assert!(matches!(active.status, ActiveValue::Set(ref s) if s == "pending"));
        assert!(matches!(active.platform, ActiveValue::Set(ref s) if s == "google"));
    }

    #[test]
    fn test_dispatch_model_with_bad_status_is_rejected() {
        let model = dispatch_record::Model {
            id: 1,
            conversion_id: "conv".into(),
            platform: "facebook".into(),
            payload: "{}".into(),
            status: "exploded".into(),
            response: None,
            error_code: None,
            retryable: false,
            attempt_count: 1,
            last_attempt_at: None,
            created_at: Utc::now(),
        };
        assert!(model_to_dispatch_record(model).is_err());

        let model = dispatch_record::Model {
            id: 1,
            conversion_id: "conv".into(),
            platform: "facebook".into(),
            payload: "{}".into(),
            status: "failed".into(),
            response: None,
            error_code: None,
            retryable: true,
            attempt_count: -3,
            last_attempt_at: None,
            created_at: Utc::now(),
        };
        let record = model_to_dispatch_record(model).unwrap();
        assert_eq!(record.status, DispatchStatus::Failed);
        assert_eq!(record.attempt_count, 0);
    }
}
