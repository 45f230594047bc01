//! Transient-failure retry for storage calls
//!
//! Lost connections, pool timeouts, deadlocks and SQLite BUSY/LOCKED are
//! retried with jittered exponential backoff. Anything else, constraint
//! violations included, goes straight back to the caller.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use sea_orm::DbErr;
use sea_orm::error::RuntimeErr;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;

/// MySQL 1213/1205, PostgreSQL 40001/40P01, SQLite 5/6
const TRANSIENT_SQL_CODES: &[&str] = &["1213", "1205", "40001", "40P01", "5", "6"];

/// 驱动没有给出错误码时按消息匹配
const TRANSIENT_MESSAGES: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "serialization failure",
];

fn transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MESSAGES.iter().any(|m| message.contains(m))
}

fn transient_runtime(err: &RuntimeErr) -> bool {
    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            let code = sqlx_err
                .as_database_error()
                .and_then(|db_err| db_err.code().map(|c| c.to_string()));
            match code {
                Some(code) => TRANSIENT_SQL_CODES.contains(&code.as_str()),
                None => transient_message(&sqlx_err.to_string()),
            }
        }
        RuntimeErr::Internal(msg) => transient_message(msg),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

pub fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime) | DbErr::Query(runtime) => transient_runtime(runtime),
        _ => false,
    }
}

/// Unique/primary key violation; click inserts use it to detect races
pub fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    ["unique constraint", "duplicate entry", "duplicate key"]
        .iter()
        .any(|m| msg.contains(m))
}

/// Store-call retry policy, from `[database]`
#[derive(Debug, Clone, Copy)]
pub struct DbRetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DbRetryPolicy {
    fn default() -> Self {
        Self::from(&DatabaseConfig::default())
    }
}

impl From<&DatabaseConfig> for DbRetryPolicy {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

impl DbRetryPolicy {
    /// `base * 2^(retry-1)` capped at `max`, plus up to 25% jitter
    fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = (capped.as_millis() / 4) as u64;
        capped + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Run `operation`, retrying transient failures per `policy`
///
/// The closure is called once per attempt, so statements must be built
/// inside it.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: DbRetryPolicy,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut retries = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    debug!("{} succeeded after {} retries", operation_name, retries);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if retries >= policy.max_retries || !is_retryable_error(&err) {
            return Err(err);
        }

        retries += 1;
        let delay = policy.delay_for(retries);
        warn!(
            "{} hit a transient error ({}/{}): {}; retrying in {:?}",
            operation_name, retries, policy.max_retries, err, delay
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::error::ConnAcquireErr;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> DbRetryPolicy {
        DbRetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_retryable_error(&DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)));
        assert!(is_retryable_error(&DbErr::Query(RuntimeErr::Internal(
            "database is locked".to_string()
        ))));
        assert!(is_retryable_error(&DbErr::Exec(RuntimeErr::Internal(
            "Deadlock found when trying to get lock".to_string()
        ))));
        assert!(!is_retryable_error(&DbErr::Exec(RuntimeErr::Internal(
            "UNIQUE constraint failed: clicks.click_id".to_string()
        ))));
        assert!(!is_retryable_error(&DbErr::RecordNotFound("x".to_string())));
    }

    #[test]
    fn test_unique_violation_by_message() {
        let err = DbErr::Exec(RuntimeErr::Internal(
            "UNIQUE constraint failed: clicks.click_id".to_string(),
        ));
        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&DbErr::RecordNotFound("x".to_string())));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = DbRetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2000),
        };
        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let third = policy.delay_for(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        let late = policy.delay_for(12);
        assert!(late >= Duration::from_millis(2000) && late <= Duration::from_millis(2500));
    }

    #[test]
    fn test_policy_from_database_config() {
        let db = DatabaseConfig {
            retry_count: 7,
            ..Default::default()
        };
        let policy = DbRetryPolicy::from(&db);
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.base_delay, Duration::from_millis(db.retry_base_delay_ms));
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", fast_policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let result = with_retry("op", fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(DbErr::RecordNotFound("gone".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
