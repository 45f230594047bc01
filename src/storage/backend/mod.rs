//! SeaORM storage backend
//!
//! Supports SQLite, MySQL/MariaDB and PostgreSQL. All attribution state
//! (clicks, macros, ledger, dispatch log, catalog, metrics) lives here.

mod catalog;
mod clicks;
mod connection;
mod converters;
mod dispatch;
mod ledger;
pub mod metrics;
pub mod retry;

use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::{info, warn};

use crate::errors::{AttributorError, Result};

pub use clicks::MergeOutcome;
pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use dispatch::RetryFilter;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(AttributorError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    db_retry: retry::DbRetryPolicy,
}

impl SeaOrmStorage {
    pub async fn new(database_url: &str, backend_name: &str) -> Result<Self> {
        if database_url.is_empty() {
            return Err(AttributorError::database_config("database_url 未设置"));
        }

        let config = crate::config::get_config();
        let db_retry = retry::DbRetryPolicy::from(&config.database);

        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            // mariadb 走 mysql 驱动
            let url = database_url.replacen("mariadb://", "mysql://", 1);
            connect_generic(&url, backend_name).await?
        };

        let storage = SeaOrmStorage {
            db,
            backend_name: backend_name.to_string(),
            db_retry,
        };

        run_migrations(&storage.db).await?;

        info!("{} storage initialized", storage.backend_name.to_uppercase());
        Ok(storage)
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Cheap round trip used by readiness checks
    pub async fn ping(&self) -> bool {
        let backend = self.db.get_database_backend();
        match self
            .db
            .execute_raw(sea_orm::Statement::from_string(backend, "SELECT 1"))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Storage ping failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_backend_from_url() {
        assert_eq!(infer_backend_from_url("attributor.db").unwrap(), "sqlite");
        assert_eq!(infer_backend_from_url("sqlite://data/a.db").unwrap(), "sqlite");
        assert_eq!(infer_backend_from_url("sqlite::memory:").unwrap(), "sqlite");
        assert_eq!(infer_backend_from_url("mariadb://u:p@h/db").unwrap(), "mysql");
        assert_eq!(infer_backend_from_url("postgresql://h/db").unwrap(), "postgres");
        assert!(infer_backend_from_url("redis://localhost").is_err());
    }
}
