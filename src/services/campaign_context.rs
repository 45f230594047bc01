//! Read-only campaign context with a short TTL cache
//!
//! Entries expire after `dispatch.context_cache_ttl_secs` and are dropped
//! explicitly whenever the admin API writes catalog rows.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::trace;

use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::models::CampaignContext;

const CONTEXT_CACHE_MAX_CAPACITY: u64 = 10_000;

pub struct CampaignContextProvider {
    storage: Arc<SeaOrmStorage>,
    /// campaign id -> context (None caches a missing campaign)
    cache: Cache<i64, Option<Arc<CampaignContext>>>,
}

impl CampaignContextProvider {
    pub fn new(storage: Arc<SeaOrmStorage>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(CONTEXT_CACHE_MAX_CAPACITY)
            .build();
        Self { storage, cache }
    }

    pub async fn get(&self, campaign_id: i64) -> Result<Option<Arc<CampaignContext>>> {
        if let Some(hit) = self.cache.get(&campaign_id).await {
            trace!("Campaign context cache hit: {}", campaign_id);
            return Ok(hit);
        }

        let loaded = self
            .storage
            .load_campaign_context(campaign_id)
            .await?
            .map(Arc::new);
        self.cache.insert(campaign_id, loaded.clone()).await;
        Ok(loaded)
    }

    pub async fn invalidate(&self, campaign_id: i64) {
        self.cache.invalidate(&campaign_id).await;
    }

    /// Channel/offer changes can affect any campaign
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
