use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing and client metadata captured for a click
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClickContext {
    pub campaign_id: i64,
    pub traffic_channel_id: i64,
    pub lander_id: Option<i64>,
    pub offer_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub click_id: String,
    #[serde(flatten)]
    pub context: ClickContext,
    pub clicked_at: DateTime<Utc>,
    /// Set once a matched conversion has been recorded
    pub converted: bool,
}

impl Click {
    pub fn new(click_id: impl Into<String>, context: ClickContext) -> Self {
        Self {
            click_id: click_id.into(),
            context,
            clicked_at: Utc::now(),
            converted: false,
        }
    }

    pub fn campaign_id(&self) -> i64 {
        self.context.campaign_id
    }
}
