//! 统一可观测性模块
//!
//! 日志与指标的统一初始化入口，所有进程通过 [`init`] 完成配置，
//! 保证日志格式和指标命名一致。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有指标服务器任务；守卫被 drop 时停止指标端点。
pub struct ObservabilityGuard {
    metrics_handle: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 创建一个空的 Guard（用于测试或禁用指标时）
    pub fn empty() -> Self {
        Self {
            metrics_handle: None,
        }
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_handle.is_some()
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.metrics_handle.take() {
            handle.abort();
            info!("指标端点已停止");
        }
    }
}

/// 统一初始化可观测性
///
/// 先初始化日志，保证指标初始化过程中的日志可见；
/// `metrics_enabled = false` 时只初始化日志。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        json_logs = config.json_logs,
        "可观测性已初始化"
    );

    if !config.metrics_enabled {
        return Ok(ObservabilityGuard::empty());
    }

    let metrics_handle = metrics::init(service_name, config.metrics_port).await?;

    Ok(ObservabilityGuard {
        metrics_handle: Some(metrics_handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_guard() {
        let guard = ObservabilityGuard::empty();
        assert!(!guard.metrics_enabled());
    }
}
