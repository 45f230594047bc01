use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::get_config;
use crate::services::AppServices;
use crate::storage::StorageFactory;

pub struct StartupContext {
    pub services: AppServices,
    /// 置为 true 通知后台任务退出
    pub shutdown_tx: watch::Sender<bool>,
    pub retry_task: Option<JoinHandle<()>>,
}

/// rustls 需要进程级 crypto provider（ureq 与 sqlx 共用）
fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}

/// Open storage and wire services; shared by every mode
pub async fn prepare_services() -> Result<AppServices> {
    install_crypto_provider();

    let storage = StorageFactory::create()
        .await
        .context("Failed to create storage backend")?;
    info!("Using storage backend: {}", storage.backend_name());

    let config = get_config();
    Ok(AppServices::new(storage, &config))
}

/// 准备服务器启动的上下文：存储、服务与后台重试任务
pub async fn prepare_server_startup() -> Result<StartupContext> {
    let start_time = std::time::Instant::now();
    debug!("Starting pre-startup processing...");

    let services = prepare_services().await?;
    let config = get_config();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let retry_task = if config.retry.enabled {
        Some(Arc::clone(&services.retry_worker).spawn_background_task(shutdown_rx))
    } else {
        warn!("Dispatch retry task disabled (retry.enabled = false)");
        None
    };

    if config.api.admin_token.is_empty() {
        info!("Admin API is disabled (api.admin_token not set)");
    }

    info!("Pre-startup completed in {:?}", start_time.elapsed());
    Ok(StartupContext {
        services,
        shutdown_tx,
        retry_task,
    })
}
