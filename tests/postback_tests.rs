//! Postback pipeline tests: matching, ledger entries and metrics

use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use attributor::config::{StaticConfig, init_config};
use attributor::errors::AttributorError;
use attributor::services::{AppServices, ConversionTransport, TransportOutcome};
use attributor::storage::SeaOrmStorage;
use attributor::storage::models::{
    Campaign, ClickContext, ConversionEvent, Currency, DispatchStatus, MacroKey, MacroPatch,
    Money,
};

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

/// Records calls and answers 200
#[derive(Default)]
struct CountingTransport {
    calls: Mutex<usize>,
}

#[async_trait]
impl ConversionTransport for CountingTransport {
    async fn post_json(&self, _url: &str, _body: &Value) -> TransportOutcome {
        *self.calls.lock().unwrap() += 1;
        TransportOutcome::Response {
            status: 200,
            body: "{}".to_string(),
        }
    }
}

async fn create_services() -> (TempDir, AppServices, Arc<CountingTransport>) {
    init_static_config();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("postback_test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let storage = Arc::new(
        SeaOrmStorage::new(&db_url, "sqlite")
            .await
            .expect("Failed to create storage"),
    );
    let transport = Arc::new(CountingTransport::default());
    let services =
        AppServices::with_transport(storage, &StaticConfig::default(), transport.clone());
    (temp_dir, services, transport)
}

fn sub(n: u8) -> MacroKey {
    MacroKey::new(n).unwrap()
}

fn usd(amount: &str) -> (Money, Currency) {
    (Money::parse(amount).unwrap(), Currency::parse("USD").unwrap())
}

async fn record_click(services: &AppServices, click_id: &str, campaign_id: i64) {
    services
        .attribution
        .record_click(
            Some(click_id.to_string()),
            ClickContext {
                campaign_id,
                traffic_channel_id: 1,
                ip_address: Some("198.51.100.4".to_string()),
                ..Default::default()
            },
            MacroPatch::new().with(sub(1), "abc"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_matched_conversion_carries_click_macros() {
    let (_dir, services, _) = create_services().await;
    record_click(&services, "c1", 7).await;

    let (revenue, currency) = usd("10.00");
    let event = ConversionEvent::new("c1", revenue, currency);
    let (conversion, result) = services.postback.record_conversion(&event).await.unwrap();

    assert!(conversion.matched);
    assert_eq!(conversion.click_id.as_deref(), Some("c1"));
    assert_eq!(conversion.campaign_id, Some(7));
    assert_eq!(conversion.revenue.to_string(), "10.00");
    // 事件未带 IP 时取点击记录的
    assert_eq!(conversion.client_ip.as_deref(), Some("198.51.100.4"));
    assert_eq!(result.macros.unwrap().get(sub(1)), Some("abc"));

    let click = services.attribution.get_context("c1").await.unwrap();
    assert!(click.converted);

    let stored = services.ledger.get_conversion(&conversion.id).await.unwrap();
    assert_eq!(stored.click_id, conversion.click_id);
    assert_eq!(stored.revenue, conversion.revenue);
    assert_eq!(stored.currency.as_str(), "USD");
}

#[tokio::test]
async fn test_unknown_click_is_recorded_unmatched() {
    let (_dir, services, _) = create_services().await;

    let (revenue, currency) = usd("4.20");
    let mut event = ConversionEvent::new("unknown123", revenue, currency);
    event.macros = MacroPatch::new().with(sub(4), "affiliate-7");
    let (conversion, result) = services.postback.record_conversion(&event).await.unwrap();

    assert!(!conversion.matched);
    assert!(!result.matched);
    assert_eq!(conversion.click_id, None);
    assert_eq!(conversion.raw_click_id.as_deref(), Some("unknown123"));
    assert_eq!(conversion.campaign_id, None);

    // 未匹配的 sub 参数随转化保存，便于对账
    let stored = services.ledger.get_conversion(&conversion.id).await.unwrap();
    assert_eq!(
        stored.postback_macros.get("sub4").map(String::as_str),
        Some("affiliate-7")
    );

    let orphans = services.ledger.conversions_for_click("unknown123").await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, conversion.id);
}

#[tokio::test]
async fn test_click_id_matching_is_exact() {
    let (_dir, services, _) = create_services().await;
    record_click(&services, "c5", 7).await;

    let (revenue, currency) = usd("1");
    let padded = ConversionEvent::new(" c5 ", revenue, currency.clone());
    let (conversion, _) = services.postback.record_conversion(&padded).await.unwrap();
    assert!(!conversion.matched);
    assert_eq!(conversion.raw_click_id.as_deref(), Some(" c5 "));

    let upper = ConversionEvent::new("C5", revenue, currency);
    let (conversion, _) = services.postback.record_conversion(&upper).await.unwrap();
    assert!(!conversion.matched);

    let click = services.attribution.get_context("c5").await.unwrap();
    assert!(!click.converted);
}

#[tokio::test]
async fn test_matched_conversion_does_not_duplicate_subs() {
    let (_dir, services, _) = create_services().await;
    record_click(&services, "c6", 7).await;

    let (revenue, currency) = usd("1");
    let mut event = ConversionEvent::new("c6", revenue, currency);
    event.macros = MacroPatch::new().with(sub(4), "merged");
    let (conversion, result) = services.postback.record_conversion(&event).await.unwrap();

    assert!(conversion.postback_macros.is_empty());
    assert_eq!(result.macros.unwrap().get(sub(4)), Some("merged"));
}

#[tokio::test]
async fn test_postback_subs_merge_before_matching() {
    let (_dir, services, _) = create_services().await;
    record_click(&services, "c2", 7).await;

    let (revenue, currency) = usd("1");
    let mut event = ConversionEvent::new("c2", revenue, currency);
    event.macros = MacroPatch::new().with(sub(9), "from-postback");

    let (_, result) = services.postback.record_conversion(&event).await.unwrap();
    let macros = result.macros.unwrap();
    assert_eq!(macros.get(sub(1)), Some("abc"));
    assert_eq!(macros.get(sub(9)), Some("from-postback"));
}

#[tokio::test]
async fn test_empty_event_name_rejected() {
    let (_dir, services, _) = create_services().await;

    let (revenue, currency) = usd("1");
    let mut event = ConversionEvent::new("c3", revenue, currency);
    event.event_name = "  ".to_string();

    let err = services.postback.record_conversion(&event).await.unwrap_err();
    assert!(matches!(err, AttributorError::Validation(_)));
}

#[tokio::test]
async fn test_cost_entries_and_campaign_metrics() {
    let (_dir, services, _) = create_services().await;
    record_click(&services, "spend", 11).await;

    let (amount, currency) = usd("0.35");
    let entry = services
        .ledger
        .record_cost("spend", amount, currency.clone())
        .await
        .unwrap();
    assert_eq!(entry.campaign_id, Some(11));

    // 负数为冲正
    services
        .ledger
        .record_cost("spend", Money::parse("-0.05").unwrap(), currency.clone())
        .await
        .unwrap();

    let costs = services.ledger.costs_for_click("spend").await.unwrap();
    assert_eq!(costs.len(), 2);
    assert_eq!(costs[0].id, entry.id);

    // 未知点击也记账，但不归属活动
    let orphan = services
        .ledger
        .record_cost("not-a-click", Money::parse("1").unwrap(), currency.clone())
        .await
        .unwrap();
    assert_eq!(orphan.campaign_id, None);

    let (revenue, currency) = usd("12.50");
    services
        .postback
        .record_conversion(&ConversionEvent::new("spend", revenue, currency))
        .await
        .unwrap();

    let today = chrono::Utc::now().date_naive();
    let rows = services.storage.campaign_metrics(11, today, today).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].clicks, 1);
    assert_eq!(rows[0].conversions, 1);
    let totals = rows[0].totals_for(&Currency::parse("USD").unwrap()).unwrap();
    assert_eq!(totals.revenue_micros, 12_500_000);
    assert_eq!(totals.cost_micros, 300_000);

    let err = services
        .ledger
        .record_cost(" ", Money::parse("1").unwrap(), Currency::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AttributorError::Validation(_)));
}

#[tokio::test]
async fn test_metrics_keep_currencies_apart() {
    let (_dir, services, _) = create_services().await;
    record_click(&services, "multi", 12).await;

    let usd = Currency::parse("USD").unwrap();
    let eur = Currency::parse("eur").unwrap();
    for currency in [&usd, &eur] {
        services
            .postback
            .record_conversion(&ConversionEvent::new(
                "multi",
                Money::parse("10").unwrap(),
                currency.clone(),
            ))
            .await
            .unwrap();
    }
    services
        .ledger
        .record_cost("multi", Money::parse("2").unwrap(), eur.clone())
        .await
        .unwrap();

    let today = chrono::Utc::now().date_naive();
    let rows = services.storage.campaign_metrics(12, today, today).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].conversions, 2);
    assert_eq!(rows[0].money.len(), 2);
    // 按币种代码排序
    assert_eq!(rows[0].money[0].currency, eur);

    let eur_totals = rows[0].totals_for(&eur).unwrap();
    assert_eq!(eur_totals.revenue_micros, 10_000_000);
    assert_eq!(eur_totals.cost_micros, 2_000_000);
    let usd_totals = rows[0].totals_for(&usd).unwrap();
    assert_eq!(usd_totals.revenue_micros, 10_000_000);
    assert_eq!(usd_totals.cost_micros, 0);
}

#[tokio::test]
async fn test_handle_conversion_without_channel_is_skipped() {
    let (_dir, services, transport) = create_services().await;
    services
        .storage
        .upsert_campaign(&Campaign {
            id: 7,
            name: "no channel".to_string(),
            traffic_channel_id: None,
            offer_id: None,
        })
        .await
        .unwrap();
    record_click(&services, "c4", 7).await;

    let (revenue, currency) = usd("3");
    let (conversion, _) = services
        .postback
        .handle_conversion(&ConversionEvent::new("c4", revenue, currency))
        .await
        .unwrap();

    assert!(services.postback.wait_idle(std::time::Duration::from_secs(5)).await);
    let record = services
        .tracker
        .find_for_conversion(&conversion.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DispatchStatus::Skipped);
    assert_eq!(*transport.calls.lock().unwrap(), 0);
}
