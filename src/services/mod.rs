//! Service layer
//!
//! Components share the storage handle and nothing else; the HTTP layer and
//! the CLI drive them through [`AppServices`].

mod attribution;
mod campaign_context;
mod delivery;
pub mod dispatch;
mod ledger;
mod matcher;
mod postback;
mod retry_worker;

pub use attribution::{AttributionStore, LandingEvent};
pub use campaign_context::CampaignContextProvider;
pub use delivery::DeliveryTracker;
pub use dispatch::{ConversionTransport, Dispatcher, PlatformPayload, TransportOutcome, UreqTransport};
pub use ledger::Ledger;
pub use matcher::ConversionMatcher;
pub use postback::PostbackService;
pub use retry_worker::{RetryReport, RetryWorker, backoff_delay};

use std::sync::Arc;
use std::time::Duration;

use crate::config::StaticConfig;
use crate::storage::SeaOrmStorage;

/// All services wired against one store
#[derive(Clone)]
pub struct AppServices {
    pub storage: Arc<SeaOrmStorage>,
    pub attribution: Arc<AttributionStore>,
    pub matcher: Arc<ConversionMatcher>,
    pub ledger: Arc<Ledger>,
    pub contexts: Arc<CampaignContextProvider>,
    pub tracker: Arc<DeliveryTracker>,
    pub dispatcher: Arc<Dispatcher>,
    pub postback: Arc<PostbackService>,
    pub retry_worker: Arc<RetryWorker>,
}

impl AppServices {
    /// Wire services with the HTTP transport built from `config.dispatch`
    pub fn new(storage: Arc<SeaOrmStorage>, config: &StaticConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(Duration::from_millis(
            config.dispatch.timeout_ms,
        )));
        Self::with_transport(storage, config, transport)
    }

    pub fn with_transport(
        storage: Arc<SeaOrmStorage>,
        config: &StaticConfig,
        transport: Arc<dyn ConversionTransport>,
    ) -> Self {
        let attribution = Arc::new(AttributionStore::new(
            Arc::clone(&storage),
            config.attribution.clone(),
        ));
        let matcher = Arc::new(ConversionMatcher::new(Arc::clone(&storage)));
        let ledger = Arc::new(Ledger::new(Arc::clone(&storage)));
        let contexts = Arc::new(CampaignContextProvider::new(
            Arc::clone(&storage),
            Duration::from_secs(config.dispatch.context_cache_ttl_secs),
        ));
        let tracker = Arc::new(DeliveryTracker::new(Arc::clone(&storage)));
        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            Arc::clone(&tracker),
            config.dispatch.clone(),
        ));
        let postback = Arc::new(PostbackService::new(
            Arc::clone(&attribution),
            Arc::clone(&matcher),
            Arc::clone(&ledger),
            Arc::clone(&contexts),
            Arc::clone(&dispatcher),
            Arc::clone(&tracker),
        ));
        let retry_worker = Arc::new(RetryWorker::new(
            Arc::clone(&postback),
            Arc::clone(&tracker),
            config.retry.clone(),
        ));

        Self {
            storage,
            attribution,
            matcher,
            ledger,
            contexts,
            tracker,
            dispatcher,
            postback,
            retry_worker,
        }
    }
}
