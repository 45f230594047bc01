//! Postback pipeline: merge inbound macros, match, record, dispatch
//!
//! The conversion is durable before dispatch starts. Dispatch runs in a
//! spawned task so platform latency never delays the postback response.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, error, warn};

use super::{
    AttributionStore, CampaignContextProvider, ConversionMatcher, DeliveryTracker, Dispatcher,
    Ledger,
};
use crate::errors::{AttributorError, Result};
use crate::storage::models::{
    Conversion, ConversionEvent, DispatchRecord, DispatchStatus, MatchResult,
};

pub struct PostbackService {
    attribution: Arc<AttributionStore>,
    matcher: Arc<ConversionMatcher>,
    ledger: Arc<Ledger>,
    contexts: Arc<CampaignContextProvider>,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<DeliveryTracker>,
    /// 正在执行的异步回传任务数
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter when the task ends, even on panic
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PostbackService {
    pub fn new(
        attribution: Arc<AttributionStore>,
        matcher: Arc<ConversionMatcher>,
        ledger: Arc<Ledger>,
        contexts: Arc<CampaignContextProvider>,
        dispatcher: Arc<Dispatcher>,
        tracker: Arc<DeliveryTracker>,
    ) -> Self {
        Self {
            attribution,
            matcher,
            ledger,
            contexts,
            dispatcher,
            tracker,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Merge inbound subs, match and record; no dispatch
    pub async fn record_conversion(
        &self,
        event: &ConversionEvent,
    ) -> Result<(Conversion, MatchResult)> {
        if let Some(click_id) = event.lookup_key()
            && !event.macros.is_empty()
        {
            match self.attribution.merge_macros(click_id, &event.macros).await {
                Ok(_) => {}
                Err(AttributorError::UnknownClick(_)) => {
                    debug!("Postback subs for unknown click {} not merged", click_id);
                }
                Err(e) => warn!("Postback subs for {} not merged: {}", click_id, e),
            }
        }

        let result = self.matcher.match_conversion(event).await?;
        let conversion = self.ledger.record_conversion(&result, event).await?;
        Ok((conversion, result))
    }

    /// Record the conversion and dispatch it in the background
    pub async fn handle_conversion(&self, event: &ConversionEvent) -> Result<(Conversion, MatchResult)> {
        let (conversion, result) = self.record_conversion(event).await?;

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let contexts = Arc::clone(&self.contexts);
        let dispatcher = Arc::clone(&self.dispatcher);
        let spawned_conversion = conversion.clone();
        let spawned_result = result.clone();

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) =
                dispatch_with(&contexts, &dispatcher, &spawned_conversion, &spawned_result).await
            {
                error!("Dispatch of conversion {} failed: {}", spawned_conversion.id, e);
            }
        });

        Ok((conversion, result))
    }

    /// Dispatch inline, resolving the campaign context first
    pub async fn dispatch_conversion(
        &self,
        conversion: &Conversion,
        result: &MatchResult,
    ) -> Result<DispatchRecord> {
        dispatch_with(&self.contexts, &self.dispatcher, conversion, result).await
    }

    /// Re-send a stored record with the live campaign context
    pub async fn redeliver_record(&self, record: DispatchRecord) -> Result<DispatchRecord> {
        let conversion = self.ledger.get_conversion(&record.conversion_id).await?;
        let result = self.matcher.rematch(&conversion).await?;
        let context = match conversion.campaign_id {
            Some(id) => self.contexts.get(id).await?,
            None => None,
        };
        self.dispatcher
            .redeliver(record, &conversion, &result, context.as_deref())
            .await
    }

    /// Dispatch a stored conversion that has no dispatch record yet
    pub async fn redispatch_conversion(&self, conversion: &Conversion) -> Result<DispatchRecord> {
        let result = self.matcher.rematch(conversion).await?;
        self.dispatch_conversion(conversion, &result).await
    }

    /// Manual retry of a failed record
    pub async fn retry_record(&self, id: i64) -> Result<DispatchRecord> {
        let record = self.tracker.get(id).await?;
        if record.status != DispatchStatus::Failed {
            return Err(AttributorError::validation(format!(
                "Dispatch record {} is {}, only failed records can be retried",
                id, record.status
            )));
        }
        self.redeliver_record(record).await
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait for background dispatches; false if `timeout` elapsed first
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        true
    }
}

async fn dispatch_with(
    contexts: &CampaignContextProvider,
    dispatcher: &Dispatcher,
    conversion: &Conversion,
    result: &MatchResult,
) -> Result<DispatchRecord> {
    let context = match conversion.campaign_id {
        Some(id) => contexts.get(id).await?,
        None => None,
    };
    dispatcher
        .dispatch(conversion, result, context.as_deref())
        .await
}
