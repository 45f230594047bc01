//! Revenue / cost ledger
//!
//! Append-only: there is no update or delete. Corrections are recorded as
//! new entries with negative amounts.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::errors::{AttributorError, Result};
use crate::storage::SeaOrmStorage;
use crate::storage::models::{Conversion, ConversionEvent, CostEntry, Currency, MatchResult, Money};
use crate::utils::new_id;

pub struct Ledger {
    storage: Arc<SeaOrmStorage>,
}

impl Ledger {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// Record a conversion, matched or not
    ///
    /// Unmatched conversions are kept with a NULL click reference and the raw
    /// click id for later reconciliation. Store failures propagate.
    pub async fn record_conversion(
        &self,
        result: &MatchResult,
        event: &ConversionEvent,
    ) -> Result<Conversion> {
        if event.event_name.trim().is_empty() {
            return Err(AttributorError::validation("event_name must not be empty"));
        }

        let conversion = Conversion::from_event(new_id(), result, event);
        self.storage.insert_conversion(&conversion).await.inspect_err(|e| {
            error!("Failed to record conversion {}: {}", conversion.id, e);
        })?;

        info!(
            "Conversion {} recorded: {} {} {} (matched: {})",
            conversion.id,
            conversion.event_name,
            conversion.revenue,
            conversion.currency,
            conversion.matched
        );
        Ok(conversion)
    }

    /// Record ad spend for a click; the click need not be known
    pub async fn record_cost(
        &self,
        click_id: &str,
        amount: Money,
        currency: Currency,
    ) -> Result<CostEntry> {
        if click_id.trim().is_empty() {
            return Err(AttributorError::validation("click_id must not be empty"));
        }

        let campaign_id = self
            .storage
            .get_click(click_id)
            .await?
            .map(|c| c.campaign_id());

        let entry = CostEntry {
            id: new_id(),
            click_id: click_id.to_string(),
            campaign_id,
            amount,
            currency,
            created_at: Utc::now(),
        };
        self.storage.insert_cost_entry(&entry).await.inspect_err(|e| {
            error!("Failed to record cost entry for {}: {}", click_id, e);
        })?;

        info!("Cost recorded for {}: {} {}", click_id, entry.amount, entry.currency);
        Ok(entry)
    }

    pub async fn get_conversion(&self, id: &str) -> Result<Conversion> {
        self.storage
            .get_conversion(id)
            .await?
            .ok_or_else(|| AttributorError::not_found(format!("Conversion not found: {}", id)))
    }

    /// Conversions posted for this click id, matched or orphaned, oldest first
    pub async fn conversions_for_click(&self, click_id: &str) -> Result<Vec<Conversion>> {
        self.storage.conversions_by_raw_click_id(click_id).await
    }

    pub async fn costs_for_click(&self, click_id: &str) -> Result<Vec<CostEntry>> {
        self.storage.cost_entries_for_click(click_id).await
    }
}
