//! Outbound dispatcher
//!
//! One attempt per call. Builds the platform payload, persists a pending
//! record, posts it and stores the classified outcome. Platform failures end
//! up on the record. Configuration errors are stored on the record and also
//! returned; store errors are returned.

mod facebook;
mod google;
mod payload;
mod transport;

pub use facebook::{build_facebook_payload, facebook_url};
pub use google::{build_google_payload, google_url};
pub use payload::*;
pub use transport::{ConversionTransport, TransportOutcome, UreqTransport};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::DeliveryTracker;
use crate::config::DispatchConfig;
use crate::errors::{AttributorError, Result};
use crate::storage::models::{
    CampaignContext, Conversion, DispatchRecord, DispatchStatus, MatchResult, Platform,
    error_codes,
};

/// Build the payload for the channel configured on `context`
///
/// Absent context, absent channel and unknown platform types all yield
/// `PlatformPayload::None`.
pub fn build_payload(
    conversion: &Conversion,
    result: &MatchResult,
    context: Option<&CampaignContext>,
    now: DateTime<Utc>,
) -> Result<PlatformPayload> {
    let Some(channel) = context.and_then(|c| c.traffic_channel.as_ref()) else {
        return Ok(PlatformPayload::None);
    };

    let fields = ResolvedFields::resolve(conversion, result, Some(&channel.macro_mapping));
    match channel.platform() {
        Platform::Facebook => {
            build_facebook_payload(&channel.facebook, conversion, &fields, now)
                .map(PlatformPayload::Facebook)
        }
        Platform::Google => {
            build_google_payload(&channel.google, conversion, &fields).map(PlatformPayload::Google)
        }
        Platform::None => Ok(PlatformPayload::None),
    }
}

/// Map a transport outcome onto the record
///
/// 2xx sent; 4xx rejected (not retried); 5xx, timeout and network errors
/// failed but retryable.
pub fn apply_outcome(record: &mut DispatchRecord, outcome: TransportOutcome) {
    match outcome {
        TransportOutcome::Response { status, body } if (200..300).contains(&status) => {
            record.mark_sent(body);
        }
        TransportOutcome::Response { status, body } if (400..500).contains(&status) => {
            record.mark_failed(
                error_codes::PLATFORM_REJECTED,
                format!("HTTP {}: {}", status, body),
                false,
            );
        }
        TransportOutcome::Response { status, body } => {
            record.mark_failed(
                error_codes::PLATFORM_UNAVAILABLE,
                format!("HTTP {}: {}", status, body),
                true,
            );
        }
        TransportOutcome::Timeout => {
            record.mark_failed(error_codes::TIMEOUT, "request timed out".to_string(), true);
        }
        TransportOutcome::Network(message) => {
            record.mark_failed(error_codes::NETWORK_ERROR, message, true);
        }
    }
}

pub struct Dispatcher {
    transport: Arc<dyn ConversionTransport>,
    tracker: Arc<DeliveryTracker>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn ConversionTransport>,
        tracker: Arc<DeliveryTracker>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            transport,
            tracker,
            config,
        }
    }

    /// Dispatch a conversion
    ///
    /// A conversion has at most one record. Calling again for a conversion
    /// whose record failed makes the next attempt; terminal records are
    /// returned unchanged. Missing credentials leave a `failed` record with
    /// `configuration_error` that the scheduler skips; the error is returned.
    pub async fn dispatch(
        &self,
        conversion: &Conversion,
        result: &MatchResult,
        context: Option<&CampaignContext>,
    ) -> Result<DispatchRecord> {
        if let Some(existing) = self.tracker.find_for_conversion(&conversion.id).await? {
            return self.redeliver(existing, conversion, result, context).await;
        }

        let payload = match build_payload(conversion, result, context, Utc::now()) {
            Ok(payload) => payload,
            Err(e @ AttributorError::Configuration(_)) => {
                // 尚未生成 payload，人工重试时重新构建
                let record = DispatchRecord::pending(
                    &conversion.id,
                    channel_platform(context),
                    PlatformPayload::None.to_snapshot()?,
                );
                return self.fail_unconfigured(record, e).await;
            }
            Err(e) => return Err(e),
        };

        if matches!(payload, PlatformPayload::None) {
            let record = self
                .tracker
                .record(&DispatchRecord::skipped(&conversion.id))
                .await?;
            info!("Dispatch skipped for conversion {}: no platform", conversion.id);
            return Ok(record);
        }

        let pending = DispatchRecord::pending(&conversion.id, payload.platform(), payload.to_snapshot()?);
        let url = match self.endpoint(&payload, context) {
            Ok(url) => url,
            Err(e @ AttributorError::Configuration(_)) => {
                return self.fail_unconfigured(pending, e).await;
            }
            Err(e) => return Err(e),
        };
        let record = self.tracker.record(&pending).await?;
        self.attempt(record, &payload, &url).await
    }

    /// Re-send a stored record
    ///
    /// The payload snapshot is reused as stored. A record that never got a
    /// payload is built now from the conversion. Payload and endpoint are
    /// resolved before the record is requeued, so a configuration error
    /// leaves it `failed` with its attempt count unchanged.
    pub async fn redeliver(
        &self,
        mut record: DispatchRecord,
        conversion: &Conversion,
        result: &MatchResult,
        context: Option<&CampaignContext>,
    ) -> Result<DispatchRecord> {
        if record.status.is_terminal() {
            debug!(
                "Dispatch record {} already {}, nothing to do",
                record.id, record.status
            );
            return Ok(record);
        }

        let stored = PlatformPayload::from_snapshot(&record.payload)?;
        let unbuilt = matches!(stored, PlatformPayload::None);
        let payload = if unbuilt {
            match build_payload(conversion, result, context, Utc::now()) {
                Ok(payload) => payload,
                Err(e @ AttributorError::Configuration(_)) => {
                    return self.fail_unconfigured(record, e).await;
                }
                Err(e) => return Err(e),
            }
        } else {
            stored
        };

        if matches!(payload, PlatformPayload::None) {
            // 渠道已不再对接任何平台
            record.requeue();
            record.mark_skipped();
            info!(
                "Dispatch record {} skipped: channel has no platform",
                record.id
            );
            return self.tracker.record(&record).await;
        }

        let url = match self.endpoint(&payload, context) {
            Ok(url) => url,
            Err(e @ AttributorError::Configuration(_)) => {
                return self.fail_unconfigured(record, e).await;
            }
            Err(e) => return Err(e),
        };

        if unbuilt {
            record.platform = payload.platform();
            record.payload = payload.to_snapshot()?;
        }
        if record.requeue() {
            record = self.tracker.record(&record).await?;
        }
        self.attempt(record, &payload, &url).await
    }

    /// Store the record as a non-retryable configuration failure, then
    /// return the error; no attempt is counted
    async fn fail_unconfigured(
        &self,
        mut record: DispatchRecord,
        err: AttributorError,
    ) -> Result<DispatchRecord> {
        error!(
            "Dispatch for conversion {} not configured: {}",
            record.conversion_id, err
        );
        record.mark_failed(
            error_codes::CONFIGURATION_ERROR,
            err.message().to_string(),
            false,
        );
        self.tracker.record(&record).await?;
        Err(err)
    }

    async fn attempt(
        &self,
        mut record: DispatchRecord,
        payload: &PlatformPayload,
        url: &str,
    ) -> Result<DispatchRecord> {
        let body = payload.body()?;

        record.begin_attempt();
        let outcome = self.transport.post_json(url, &body).await;
        apply_outcome(&mut record, outcome);

        match record.status {
            DispatchStatus::Sent => info!(
                "Conversion {} sent to {} (attempt {})",
                record.conversion_id, record.platform, record.attempt_count
            ),
            _ => warn!(
                "Conversion {} dispatch to {} failed (attempt {}, {}): {}",
                record.conversion_id,
                record.platform,
                record.attempt_count,
                record.error_code.as_deref().unwrap_or("unknown"),
                record.response.as_deref().unwrap_or("")
            ),
        }

        self.tracker.record(&record).await
    }

    /// Resolve the URL; the Facebook token comes from the live channel config
    fn endpoint(&self, payload: &PlatformPayload, context: Option<&CampaignContext>) -> Result<String> {
        match payload {
            PlatformPayload::Facebook(p) => {
                let creds = context
                    .and_then(|c| c.traffic_channel.as_ref())
                    .map(|channel| &channel.facebook)
                    .ok_or_else(|| {
                        AttributorError::configuration("Facebook access token is not configured")
                    })?;
                let token = facebook::access_token(creds)?;
                Ok(facebook_url(&self.config, &p.pixel_id, token))
            }
            PlatformPayload::Google(p) => Ok(google_url(
                &self.config,
                &p.conversion_id,
                &p.conversion_label,
            )),
            PlatformPayload::None => Err(AttributorError::configuration(
                "Dispatch record has no platform payload",
            )),
        }
    }
}

fn channel_platform(context: Option<&CampaignContext>) -> Platform {
    context.map(CampaignContext::platform).unwrap_or(Platform::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> DispatchRecord {
        let mut record = DispatchRecord::pending("conv", Platform::Facebook, serde_json::json!({}));
        record.begin_attempt();
        record
    }

    #[test]
    fn test_apply_outcome_classification() {
        let mut record = pending();
        apply_outcome(
            &mut record,
            TransportOutcome::Response {
                status: 200,
                body: r#"{"events_received":1}"#.into(),
            },
        );
        assert_eq!(record.status, DispatchStatus::Sent);
        assert!(record.error_code.is_none());

        let mut record = pending();
        apply_outcome(
            &mut record,
            TransportOutcome::Response {
                status: 400,
                body: "bad pixel".into(),
            },
        );
        assert_eq!(record.status, DispatchStatus::Failed);
        assert_eq!(record.error_code.as_deref(), Some(error_codes::PLATFORM_REJECTED));
        assert!(!record.retryable);
        assert!(record.response.as_deref().unwrap().contains("bad pixel"));

        let mut record = pending();
        apply_outcome(
            &mut record,
            TransportOutcome::Response {
                status: 503,
                body: String::new(),
            },
        );
        assert_eq!(record.error_code.as_deref(), Some(error_codes::PLATFORM_UNAVAILABLE));
        assert!(record.retryable);

        let mut record = pending();
        apply_outcome(&mut record, TransportOutcome::Timeout);
        assert_eq!(record.error_code.as_deref(), Some(error_codes::TIMEOUT));
        assert!(record.retryable);

        let mut record = pending();
        apply_outcome(&mut record, TransportOutcome::Network("refused".into()));
        assert_eq!(record.error_code.as_deref(), Some(error_codes::NETWORK_ERROR));
        assert!(record.retryable);
    }

    #[test]
    fn test_build_payload_without_context_is_none() {
        let event = crate::storage::models::ConversionEvent::default();
        let conversion = Conversion::from_event("c".into(), &MatchResult::unmatched(), &event);
        let payload = build_payload(&conversion, &MatchResult::unmatched(), None, Utc::now()).unwrap();
        assert_eq!(payload, PlatformPayload::None);
    }
}
