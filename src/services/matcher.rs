//! Conversion matcher
//!
//! Resolves a postback to its click by exact click-id equality. Read-only:
//! never writes and never calls out of process.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::models::{Conversion, ConversionEvent, MacroSet, MatchResult};

pub struct ConversionMatcher {
    storage: Arc<SeaOrmStorage>,
}

impl ConversionMatcher {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn match_conversion(&self, event: &ConversionEvent) -> Result<MatchResult> {
        let Some(click_id) = event.lookup_key() else {
            debug!("Conversion without click id, unmatched");
            return Ok(MatchResult::unmatched());
        };

        self.lookup(click_id).await
    }

    /// Re-resolve a stored conversion; one recorded unmatched stays unmatched
    pub async fn rematch(&self, conversion: &Conversion) -> Result<MatchResult> {
        match conversion.click_id.as_deref().filter(|_| conversion.matched) {
            Some(click_id) => self.lookup(click_id).await,
            None => Ok(MatchResult::unmatched()),
        }
    }

    async fn lookup(&self, click_id: &str) -> Result<MatchResult> {
        let Some(click) = self.storage.get_click(click_id).await? else {
            debug!("No click for {}, unmatched", click_id);
            return Ok(MatchResult::unmatched());
        };

        // The macro row is read in one statement, so a concurrent merge is
        // either entirely visible here or not at all.
        let macros = match self.storage.get_macro_set(click_id).await? {
            Some(set) => set,
            None => {
                warn!("Click {} has no macro row", click_id);
                MacroSet::empty(click_id)
            }
        };

        Ok(MatchResult::matched(click, macros))
    }
}
