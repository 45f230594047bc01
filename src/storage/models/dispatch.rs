//! Dispatch records: one per conversion, updated on every attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Target ad platform of a traffic channel
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Facebook,
    Google,
    None,
}

impl Platform {
    /// Unknown or absent platform types route to `None`
    pub fn from_channel(platform_type: Option<&str>) -> Self {
        platform_type
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(Platform::None)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DispatchStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchStatus::Sent | DispatchStatus::Skipped)
    }

    /// pending -> {sent, failed, skipped}; failed -> pending
    pub fn can_transition_to(&self, next: DispatchStatus) -> bool {
        matches!(
            (self, next),
            (DispatchStatus::Pending, DispatchStatus::Sent)
                | (DispatchStatus::Pending, DispatchStatus::Failed)
                | (DispatchStatus::Pending, DispatchStatus::Skipped)
                | (DispatchStatus::Failed, DispatchStatus::Pending)
        )
    }
}

/// Error codes stored on failed records
pub mod error_codes {
    pub const PLATFORM_REJECTED: &str = "platform_rejected";
    pub const PLATFORM_UNAVAILABLE: &str = "platform_unavailable";
    pub const TIMEOUT: &str = "timeout";
    pub const NETWORK_ERROR: &str = "network_error";
    /// Missing credentials; only a manual retry re-attempts
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// 0 until first persisted
    pub id: i64,
    pub conversion_id: String,
    pub platform: Platform,
    /// Serialized `PlatformPayload`
    pub payload: serde_json::Value,
    pub status: DispatchStatus,
    /// Platform response body or transport error text
    pub response: Option<String>,
    pub error_code: Option<String>,
    pub retryable: bool,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DispatchRecord {
    pub fn pending(
        conversion_id: impl Into<String>,
        platform: Platform,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: 0,
            conversion_id: conversion_id.into(),
            platform,
            payload,
            status: DispatchStatus::Pending,
            response: None,
            error_code: None,
            retryable: false,
            attempt_count: 0,
            last_attempt_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn skipped(conversion_id: impl Into<String>) -> Self {
        let mut record = Self::pending(conversion_id, Platform::None, serde_json::json!({ "platform": "none" }));
        record.status = DispatchStatus::Skipped;
        record
    }

    /// Count one attempt; called right before the outbound call
    pub fn begin_attempt(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.last_attempt_at = Some(Utc::now());
    }

    pub fn mark_sent(&mut self, response: String) {
        self.status = DispatchStatus::Sent;
        self.response = Some(response);
        self.error_code = None;
        self.retryable = false;
    }

    pub fn mark_failed(&mut self, error_code: &str, response: String, retryable: bool) {
        self.status = DispatchStatus::Failed;
        self.response = Some(response);
        self.error_code = Some(error_code.to_string());
        self.retryable = retryable;
    }

    pub fn mark_skipped(&mut self) {
        self.status = DispatchStatus::Skipped;
        self.error_code = None;
        self.retryable = false;
    }

    /// failed -> pending; returns false for any other source state
    pub fn requeue(&mut self) -> bool {
        if !self.status.can_transition_to(DispatchStatus::Pending) {
            return false;
        }
        self.status = DispatchStatus::Pending;
        true
    }
}
