//! Outbound HTTP transport for platform calls

use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};
use ureq::Agent;

/// Stored responses are cut to this many bytes
const MAX_RESPONSE_LEN: usize = 4096;

/// Raw result of one POST, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    Response { status: u16, body: String },
    Timeout,
    Network(String),
}

#[async_trait]
pub trait ConversionTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> TransportOutcome;
}

/// Blocking ureq agent driven from the blocking pool
pub struct UreqTransport {
    agent: Agent,
    timeout: Duration,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent, timeout }
    }

    fn post_sync(agent: Agent, url: String, body: serde_json::Value) -> TransportOutcome {
        let mut resp = match agent.post(&url).send_json(&body) {
            Ok(r) => r,
            Err(ureq::Error::Timeout(_)) => return TransportOutcome::Timeout,
            Err(e) => return TransportOutcome::Network(e.to_string()),
        };

        let status = resp.status().as_u16();
        let body = resp.body_mut().read_to_string().unwrap_or_else(|e| {
            warn!("Failed to read platform response body: {}", e);
            String::new()
        });
        trace!("Platform responded {} ({} bytes)", status, body.len());

        TransportOutcome::Response {
            status,
            body: truncate(body),
        }
    }
}

#[async_trait]
impl ConversionTransport for UreqTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> TransportOutcome {
        let agent = self.agent.clone();
        let url = url.to_string();
        let body = body.clone();

        // ureq 的超时之外再加一层，防止阻塞线程池排队
        let guard = self.timeout + Duration::from_secs(1);
        let task = tokio::task::spawn_blocking(move || Self::post_sync(agent, url, body));

        match tokio::time::timeout(guard, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => TransportOutcome::Network(format!("dispatch task failed: {}", e)),
            Err(_) => TransportOutcome::Timeout,
        }
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_RESPONSE_LEN {
        let mut end = MAX_RESPONSE_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        let long = "é".repeat(MAX_RESPONSE_LEN);
        let cut = truncate(long);
        assert!(cut.len() <= MAX_RESPONSE_LEN);
        assert!(cut.chars().all(|c| c == 'é'));

        assert_eq!(truncate("ok".into()), "ok");
    }
}
