//! Delivery tracker: write-through persistence of dispatch records

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::Stream;

use crate::errors::{AttributorError, Result};
use crate::storage::models::{Conversion, DispatchRecord, DispatchStatus};
use crate::storage::{RetryFilter, SeaOrmStorage};

const RETRY_PAGE_SIZE: u64 = 100;

pub struct DeliveryTracker {
    storage: Arc<SeaOrmStorage>,
}

impl DeliveryTracker {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Persist the record as given; returns it with its id assigned
    pub async fn record(&self, record: &DispatchRecord) -> Result<DispatchRecord> {
        self.storage.save_dispatch_record(record).await
    }

    /// Failed (retryable) and pending records with fewer than `max_attempts`
    /// attempts whose last activity is older than `older_than`
    ///
    /// The stream is lazy and finite; calling again restarts the scan.
    pub fn list_for_retry(
        &self,
        older_than: DateTime<Utc>,
        max_attempts: u32,
    ) -> impl Stream<Item = Result<DispatchRecord>> + '_ {
        self.storage.retry_candidates(
            RetryFilter {
                older_than,
                max_attempts,
            },
            RETRY_PAGE_SIZE,
        )
    }

    /// Conversions with no record at all, created before `older_than`
    pub async fn conversions_without_record(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Conversion>> {
        self.storage.conversions_without_dispatch(older_than, limit).await
    }

    pub async fn find_for_conversion(&self, conversion_id: &str) -> Result<Option<DispatchRecord>> {
        self.storage.get_dispatch_for_conversion(conversion_id).await
    }

    pub async fn get(&self, id: i64) -> Result<DispatchRecord> {
        self.storage
            .get_dispatch_record(id)
            .await?
            .ok_or_else(|| AttributorError::not_found(format!("Dispatch record not found: {}", id)))
    }

    pub async fn list(
        &self,
        status: Option<DispatchStatus>,
        limit: u64,
    ) -> Result<Vec<DispatchRecord>> {
        self.storage.list_dispatch_records(status, limit).await
    }
}
