use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::services::AppServices;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 单个任务超时时间（秒）
const TASK_TIMEOUT_SECS: u64 = 10;

pub async fn listen_for_shutdown(
    services: AppServices,
    shutdown_tx: watch::Sender<bool>,
    retry_task: Option<JoinHandle<()>>,
) {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining dispatches..."),
        Err(e) => warn!(
            "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
            e
        ),
    }

    let shutdown_result = timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        perform_shutdown_tasks(&services, &shutdown_tx, retry_task),
    )
    .await;

    match shutdown_result {
        Ok(()) => info!("All shutdown tasks completed successfully"),
        Err(_) => {
            error!(
                "Shutdown tasks timed out after {} seconds! Forcing exit.",
                SHUTDOWN_TIMEOUT_SECS
            );
            std::process::exit(1);
        }
    }
}

/// 执行所有关闭任务（在超时内调用）
async fn perform_shutdown_tasks(
    services: &AppServices,
    shutdown_tx: &watch::Sender<bool>,
    retry_task: Option<JoinHandle<()>>,
) {
    // 停止重试调度，当前批次允许跑完
    let _ = shutdown_tx.send(true);
    if let Some(handle) = retry_task {
        match timeout(Duration::from_secs(TASK_TIMEOUT_SECS), handle).await {
            Ok(Ok(())) => info!("Retry task stopped"),
            Ok(Err(e)) => error!("Retry task ended abnormally: {}", e),
            Err(_) => error!(
                "Retry task did not stop within {} seconds",
                TASK_TIMEOUT_SECS
            ),
        }
    }

    // 等待进行中的回传落库
    let pending = services.postback.in_flight();
    if pending > 0 {
        info!("Waiting for {} in-flight dispatches", pending);
    }
    if !services
        .postback
        .wait_idle(Duration::from_secs(TASK_TIMEOUT_SECS))
        .await
    {
        error!(
            "{} dispatches still in flight after {} seconds; they will be retried on next start",
            services.postback.in_flight(),
            TASK_TIMEOUT_SECS
        );
    }
}
