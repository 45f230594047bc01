//! Outbound dispatch, delivery tracking and retry scheduling

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use attributor::config::{RetryConfig, StaticConfig, init_config};
use attributor::errors::AttributorError;
use attributor::services::{AppServices, ConversionTransport, PlatformPayload, TransportOutcome};
use attributor::storage::SeaOrmStorage;
use attributor::storage::models::{
    Campaign, ClickContext, Conversion, ConversionEvent, Currency, DispatchStatus,
    FacebookCredentials, GoogleCredentials, MacroKey, MacroMapping, MacroPatch, MappedField,
    MatchResult, Money, Platform, TrafficChannel, error_codes,
};

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

/// Scripted transport: pops one outcome per call, 200 when the script is empty
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<TransportOutcome>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    fn push(&self, outcome: TransportOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    fn push_status(&self, status: u16) {
        self.push(TransportOutcome::Response {
            status,
            body: format!("{{\"status\":{}}}", status),
        });
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> (String, Value) {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ConversionTransport for ScriptedTransport {
    async fn post_json(&self, url: &str, body: &Value) -> TransportOutcome {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TransportOutcome::Response {
                status: 200,
                body: "{\"events_received\":1}".to_string(),
            })
    }
}

async fn create_services() -> (TempDir, AppServices, Arc<ScriptedTransport>) {
    // 退避为 0，重试立即到期
    create_services_with(RetryConfig {
        base_delay_secs: 0,
        max_delay_secs: 0,
        max_attempts: 3,
        ..Default::default()
    })
    .await
}

async fn create_services_with(
    retry: RetryConfig,
) -> (TempDir, AppServices, Arc<ScriptedTransport>) {
    init_static_config();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("dispatch_test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let storage = Arc::new(
        SeaOrmStorage::new(&db_url, "sqlite")
            .await
            .expect("Failed to create storage"),
    );

    let config = StaticConfig {
        retry,
        ..Default::default()
    };
    let transport = Arc::new(ScriptedTransport::default());
    let services = AppServices::with_transport(storage, &config, transport.clone());
    (temp_dir, services, transport)
}

fn facebook_channel(access_token: Option<&str>) -> TrafficChannel {
    TrafficChannel {
        id: 1,
        name: "fb".to_string(),
        platform_type: Some("facebook".to_string()),
        facebook: FacebookCredentials {
            pixel_id: Some("1234".to_string()),
            access_token: access_token.map(String::from),
            test_event_code: None,
        },
        google: GoogleCredentials::default(),
        macro_mapping: MacroMapping::new(),
    }
}

fn google_channel() -> TrafficChannel {
    let mut mapping = MacroMapping::new();
    mapping.insert(MappedField::Gclid, MacroKey::new(2).unwrap());
    TrafficChannel {
        id: 1,
        name: "google".to_string(),
        platform_type: Some("google".to_string()),
        facebook: FacebookCredentials::default(),
        google: GoogleCredentials {
            account_id: Some("123-456-7890".to_string()),
            conversion_id: Some("AW-1".to_string()),
            conversion_label: Some("purchase".to_string()),
        },
        macro_mapping: mapping,
    }
}

/// Campaign 5 on channel 1, one click `c1` with sub1/sub2, one conversion
async fn setup_conversion(
    services: &AppServices,
    channel: TrafficChannel,
) -> (Conversion, MatchResult) {
    services.storage.upsert_traffic_channel(&channel).await.unwrap();
    services
        .storage
        .upsert_campaign(&Campaign {
            id: 5,
            name: "campaign".to_string(),
            traffic_channel_id: Some(channel.id),
            offer_id: None,
        })
        .await
        .unwrap();
    services.contexts.invalidate_all();

    services
        .attribution
        .record_click(
            Some("c1".to_string()),
            ClickContext {
                campaign_id: 5,
                traffic_channel_id: channel.id,
                ..Default::default()
            },
            MacroPatch::new()
                .with(MacroKey::new(1).unwrap(), "abc")
                .with(MacroKey::new(2).unwrap(), "GCLID-FROM-SUB2"),
        )
        .await
        .unwrap();

    let event = ConversionEvent::new(
        "c1",
        Money::parse("10.00").unwrap(),
        Currency::parse("USD").unwrap(),
    );
    services.postback.record_conversion(&event).await.unwrap()
}

#[tokio::test]
async fn test_missing_access_token_fails_before_any_request() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(None)).await;

    let err = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap_err();
    assert!(matches!(err, AttributorError::Configuration(_)));
    assert_eq!(transport.calls(), 0);

    // 留下一条不自动重试的失败记录，便于运维排查
    let record = services
        .tracker
        .find_for_conversion(&conversion.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DispatchStatus::Failed);
    assert_eq!(record.error_code.as_deref(), Some(error_codes::CONFIGURATION_ERROR));
    assert!(!record.retryable);
    assert_eq!(record.attempt_count, 0);
    assert_eq!(record.platform, Platform::Facebook);
}

#[tokio::test]
async fn test_unconfigured_conversion_is_sent_after_credentials_are_fixed() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(None)).await;

    services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap_err();
    let record = services
        .tracker
        .find_for_conversion(&conversion.id)
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let report = services.retry_worker.run_once().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(transport.calls(), 0);

    services
        .storage
        .upsert_traffic_channel(&facebook_channel(Some("fixed")))
        .await
        .unwrap();
    services.contexts.invalidate_all();

    let sent = services.postback.retry_record(record.id).await.unwrap();
    assert_eq!(sent.id, record.id);
    assert_eq!(sent.status, DispatchStatus::Sent);
    assert_eq!(sent.attempt_count, 1);
    assert!(sent.error_code.is_none());

    let (url, body) = transport.last_request();
    assert!(url.contains("access_token=fixed"));
    assert_eq!(body["data"][0]["custom_data"]["custom_sub1"], "abc");

    // 补建的快照可以还原
    let stored = services.tracker.get(record.id).await.unwrap();
    let payload = PlatformPayload::from_snapshot(&stored.payload).unwrap();
    assert_eq!(payload.platform(), Platform::Facebook);
    assert_eq!(payload.body().unwrap(), body);
}

#[tokio::test]
async fn test_token_removed_before_retry_keeps_record_failed() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(Some("tok"))).await;

    transport.push_status(500);
    let failed = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(failed.attempt_count, 1);
    assert!(failed.retryable);

    services
        .storage
        .upsert_traffic_channel(&facebook_channel(None))
        .await
        .unwrap();
    services.contexts.invalidate_all();

    for _ in 0..2 {
        let err = services.postback.retry_record(failed.id).await.unwrap_err();
        assert!(matches!(err, AttributorError::Configuration(_)));

        let record = services.tracker.get(failed.id).await.unwrap();
        assert_eq!(record.status, DispatchStatus::Failed);
        assert_eq!(record.error_code.as_deref(), Some(error_codes::CONFIGURATION_ERROR));
        assert!(!record.retryable);
        assert_eq!(record.attempt_count, 1);
    }

    // 调度器不会反复撞上同一个配置错误
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let report = services.retry_worker.run_once().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(transport.calls(), 1);

    services
        .storage
        .upsert_traffic_channel(&facebook_channel(Some("tok")))
        .await
        .unwrap();
    services.contexts.invalidate_all();

    let sent = services.postback.retry_record(failed.id).await.unwrap();
    assert_eq!(sent.status, DispatchStatus::Sent);
    assert_eq!(sent.attempt_count, 2);
}

#[tokio::test]
async fn test_conversion_without_record_is_swept() {
    let (_dir, services, transport) = create_services_with(RetryConfig {
        base_delay_secs: 0,
        max_delay_secs: 0,
        unrecorded_grace_secs: 0,
        ..Default::default()
    })
    .await;
    // 只入账不投递，模拟投递前进程退出
    let (conversion, _) = setup_conversion(&services, google_channel()).await;
    assert!(services
        .tracker
        .find_for_conversion(&conversion.id)
        .await
        .unwrap()
        .is_none());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let report = services.retry_worker.run_once().await.unwrap();
    assert_eq!(report.unrecorded, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(transport.calls(), 1);

    let (_, body) = transport.last_request();
    assert_eq!(body["conversions"][0]["gclid"], "GCLID-FROM-SUB2");

    let record = services
        .tracker
        .find_for_conversion(&conversion.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DispatchStatus::Sent);

    let report = services.retry_worker.run_once().await.unwrap();
    assert_eq!(report.unrecorded, 0);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_server_error_fails_and_redispatch_increments_attempts() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(Some("tok"))).await;

    transport.push_status(500);
    let first = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(first.status, DispatchStatus::Failed);
    assert_eq!(first.attempt_count, 1);
    assert!(first.retryable);
    assert_eq!(first.error_code.as_deref(), Some(error_codes::PLATFORM_UNAVAILABLE));

    transport.push_status(500);
    let second = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, DispatchStatus::Failed);
    assert_eq!(second.attempt_count, 2);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_facebook_payload_snapshot_and_url() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(Some("secret"))).await;

    let record = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(record.status, DispatchStatus::Sent);
    assert_eq!(record.platform, Platform::Facebook);

    let (url, body) = transport.last_request();
    assert!(url.starts_with("https://graph.facebook.com/v17.0/1234/events?access_token=secret"));
    let event = &body["data"][0];
    assert_eq!(event["event_name"], "Purchase");
    assert_eq!(event["event_id"], conversion.id.as_str());
    assert_eq!(event["custom_data"]["value"], 10.0);
    assert_eq!(event["custom_data"]["custom_sub1"], "abc");

    // 快照不含 token，且可以还原
    assert!(!record.payload.to_string().contains("secret"));
    let stored = services.tracker.get(record.id).await.unwrap();
    let payload = PlatformPayload::from_snapshot(&stored.payload).unwrap();
    assert_eq!(payload.body().unwrap(), body);
}

#[tokio::test]
async fn test_google_gclid_from_mapped_macro() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, google_channel()).await;

    let record = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(record.status, DispatchStatus::Sent);
    assert_eq!(record.platform, Platform::Google);

    let (url, body) = transport.last_request();
    assert!(url.ends_with("/pagead/conversion/AW-1/?cv=purchase"));
    assert_eq!(body["conversions"][0]["gclid"], "GCLID-FROM-SUB2");
    assert_eq!(body["partialFailure"], true);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(Some("tok"))).await;

    transport.push_status(400);
    let record = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(record.status, DispatchStatus::Failed);
    assert!(!record.retryable);
    assert_eq!(record.error_code.as_deref(), Some(error_codes::PLATFORM_REJECTED));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let report = services.retry_worker.run_once().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(transport.calls(), 1);

    // 人工重试仍然允许
    let retried = services.postback.retry_record(record.id).await.unwrap();
    assert_eq!(retried.status, DispatchStatus::Sent);
    assert_eq!(retried.attempt_count, 2);
}

#[tokio::test]
async fn test_retry_worker_delivers_failed_record() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(Some("tok"))).await;

    transport.push(TransportOutcome::Timeout);
    let failed = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(failed.error_code.as_deref(), Some(error_codes::TIMEOUT));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let report = services.retry_worker.run_once().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.sent, 1);

    let record = services.tracker.get(failed.id).await.unwrap();
    assert_eq!(record.status, DispatchStatus::Sent);
    assert_eq!(record.attempt_count, 2);

    // sent 是终态
    let again = services.postback.retry_record(record.id).await.unwrap_err();
    assert!(matches!(again, AttributorError::Validation(_)));
    let redispatched = services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();
    assert_eq!(redispatched.attempt_count, 2);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_retry_stops_at_max_attempts() {
    let (_dir, services, transport) = create_services().await;
    let (conversion, result) = setup_conversion(&services, facebook_channel(Some("tok"))).await;

    for _ in 0..5 {
        transport.push(TransportOutcome::Network("connection refused".to_string()));
    }
    services
        .postback
        .dispatch_conversion(&conversion, &result)
        .await
        .unwrap();

    for _ in 0..4 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        services.retry_worker.run_once().await.unwrap();
    }

    let record = services
        .tracker
        .find_for_conversion(&conversion.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DispatchStatus::Failed);
    assert_eq!(record.attempt_count, 3);
    assert_eq!(record.error_code.as_deref(), Some(error_codes::NETWORK_ERROR));
    assert_eq!(transport.calls(), 3);

    let failed = services
        .tracker
        .list(Some(DispatchStatus::Failed), 10)
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
}
