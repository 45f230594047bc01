//! Attribution store: clicks and their accumulated macro values

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AttributionConfig;
use crate::errors::{AttributorError, Result};
use crate::storage::backend::retry::is_unique_violation;
use crate::storage::models::{Click, ClickContext, MacroPatch, MacroSet, MetricsDelta};
use crate::storage::{MergeOutcome, SeaOrmStorage};
use crate::utils::new_id;

/// Landing-page engagement signals keyed by click id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingEvent {
    View,
    Click,
}

impl LandingEvent {
    fn metrics_delta(&self) -> MetricsDelta {
        match self {
            LandingEvent::View => MetricsDelta::lp_view(),
            LandingEvent::Click => MetricsDelta::lp_click(),
        }
    }
}

pub struct AttributionStore {
    storage: Arc<SeaOrmStorage>,
    config: AttributionConfig,
}

impl AttributionStore {
    pub fn new(storage: Arc<SeaOrmStorage>, config: AttributionConfig) -> Self {
        Self { storage, config }
    }

    /// Record a click with its initial macros
    ///
    /// - absent id: a fresh one is generated
    /// - same id, same context: returns the stored click unchanged
    /// - same id, different context: `DuplicateClick`, unless overwrite is allowed
    pub async fn record_click(
        &self,
        click_id: Option<String>,
        context: ClickContext,
        macros: MacroPatch,
    ) -> Result<Click> {
        // 点击 ID 原样保存，空白视为未提供
        let click_id = match click_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => new_id(),
        };

        if let Some(existing) = self.storage.get_click(&click_id).await? {
            return self.resolve_existing(existing, context, &macros).await;
        }

        let click = Click::new(click_id, context.clone());
        let macro_set = MacroSet::from_patch(&click.click_id, &macros);

        match self.storage.insert_click(&click, &macro_set).await {
            Ok(()) => {
                info!(
                    "Click recorded: {} (campaign {}, {} macros)",
                    click.click_id,
                    click.campaign_id(),
                    macros.len()
                );
                Ok(click)
            }
            Err(e) if is_unique_violation(&e) => {
                // lost an insert race for the same id
                debug!("Concurrent insert for click {}", click.click_id);
                let existing = self.storage.get_click(&click.click_id).await?.ok_or_else(|| {
                    AttributorError::database_operation(format!(
                        "Click {} vanished after conflict",
                        click.click_id
                    ))
                })?;
                self.resolve_existing(existing, context, &macros).await
            }
            Err(e) => Err(AttributorError::database_operation(format!(
                "记录点击 '{}' 失败: {}",
                click.click_id, e
            ))),
        }
    }

    async fn resolve_existing(
        &self,
        existing: Click,
        context: ClickContext,
        macros: &MacroPatch,
    ) -> Result<Click> {
        if existing.context == context {
            debug!("Click {} re-recorded with identical context", existing.click_id);
            return Ok(existing);
        }

        if !self.config.allow_click_overwrite {
            return Err(AttributorError::duplicate_click(format!(
                "Click {} already exists with a different context",
                existing.click_id
            )));
        }

        let replaced = Click {
            context,
            clicked_at: chrono::Utc::now(),
            ..existing
        };
        self.storage.replace_click(&replaced).await?;
        if !macros.is_empty() {
            self.merge_macros(&replaced.click_id, macros).await?;
        }
        warn!("Click {} overwritten", replaced.click_id);
        Ok(replaced)
    }

    /// Merge non-empty values into the click's macro set
    ///
    /// Runs as a conditional update on the stored version, retried on
    /// conflict, so concurrent merges for one click serialize per field.
    pub async fn merge_macros(&self, click_id: &str, patch: &MacroPatch) -> Result<MacroSet> {
        let max_attempts = self.config.macro_merge_max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.storage.try_merge_macros(click_id, patch).await? {
                MergeOutcome::Applied(set) => {
                    debug!(
                        "Macros merged for {} ({} keys, version {})",
                        click_id,
                        patch.len(),
                        set.version
                    );
                    return Ok(set);
                }
                MergeOutcome::Unchanged(set) => return Ok(set),
                MergeOutcome::Conflict => {
                    debug!(
                        "Macro merge conflict for {} (attempt {}/{})",
                        click_id, attempt, max_attempts
                    );
                    tokio::task::yield_now().await;
                }
            }
        }

        Err(AttributorError::database_operation(format!(
            "Macro merge for {} did not settle after {} attempts",
            click_id, max_attempts
        )))
    }

    pub async fn get_context(&self, click_id: &str) -> Result<Click> {
        self.storage
            .get_click(click_id)
            .await?
            .ok_or_else(|| AttributorError::not_found(format!("Click not found: {}", click_id)))
    }

    pub async fn get_macros(&self, click_id: &str) -> Result<MacroSet> {
        self.storage
            .get_macro_set(click_id)
            .await?
            .ok_or_else(|| AttributorError::not_found(format!("Click not found: {}", click_id)))
    }

    /// Landing-page view/click: merge macros and bump the campaign counter
    pub async fn record_landing_event(
        &self,
        click_id: &str,
        event: LandingEvent,
        patch: &MacroPatch,
    ) -> Result<MacroSet> {
        let click = self.storage.get_click(click_id).await?.ok_or_else(|| {
            AttributorError::unknown_click(format!("Click not found: {}", click_id))
        })?;

        let set = if patch.is_empty() {
            self.get_macros(click_id).await?
        } else {
            self.merge_macros(click_id, patch).await?
        };

        self.storage
            .increment_metrics(click.campaign_id(), chrono::Utc::now(), event.metrics_delta())
            .await?;
        Ok(set)
    }
}
