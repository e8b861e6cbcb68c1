//! 过期通知清理 Worker
//!
//! 以固定间隔删除超过保留期的通知。与消费循环共享同一个关闭信号。

use std::sync::Arc;
use std::time::Duration;

use blog_notification::NotificationService;
use blog_shared::shutdown;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct CleanupWorker {
    service: Arc<NotificationService>,
    /// 清理间隔（默认 1 小时）
    interval: Duration,
}

impl CleanupWorker {
    pub fn new(service: Arc<NotificationService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// 主循环：先等待一个间隔再清理，直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_days = self.service.retention().num_days(),
            "清理 Worker 已启动"
        );

        while !shutdown::sleep_or_shutdown(&mut shutdown, self.interval).await {
            self.run_once().await;
        }

        info!("清理 Worker 已停止");
    }

    /// 执行一次清理，失败只记录日志
    pub async fn run_once(&self) -> u64 {
        match self.service.cleanup_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "已清理过期通知");
                }
                removed
            }
            Err(e) => {
                error!(error = %e, "清理过期通知出错");
                0
            }
        }
    }
}
