//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时所有 `record_*` 调用都是空操作，测试中可以放心调用。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标服务器任务句柄
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    pub fn abort(&self) {
        self.server_handle.abort();
    }
}

/// 安装 recorder 并在指定端口暴露 `/metrics`
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    describe_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

fn describe_metrics(service_name: &str) {
    metrics::describe_counter!(
        "notifications_created_total",
        "Total number of persisted notifications"
    );
    metrics::describe_counter!(
        "notifications_read_total",
        "Total number of notifications transitioned to read"
    );
    metrics::describe_counter!(
        "notifications_cleaned_total",
        "Total number of notifications removed by the retention sweep"
    );
    metrics::describe_counter!(
        "realtime_dispatch_total",
        "Real-time deliveries by result"
    );
    metrics::describe_gauge!("realtime_connections", "Currently open real-time connections");
    metrics::describe_counter!(
        "integration_messages_published_total",
        "Integration messages handed to the broker"
    );
    metrics::describe_counter!(
        "consumer_messages_total",
        "Messages processed by background consumers"
    );
    metrics::describe_counter!("emails_sent_total", "Email send attempts by status");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "指标端点已监听");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "指标服务器异常退出");
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 指标记录函数
// ============================================================================

#[inline]
pub fn record_notifications_created(count: u64) {
    metrics::counter!("notifications_created_total").increment(count);
}

#[inline]
pub fn record_notifications_read(count: u64) {
    metrics::counter!("notifications_read_total").increment(count);
}

#[inline]
pub fn record_notifications_cleaned(count: u64) {
    metrics::counter!("notifications_cleaned_total").increment(count);
}

/// 记录实时投递结果（`delivered` / `dropped`）
#[inline]
pub fn record_realtime_dispatch(result: &'static str, count: u64) {
    metrics::counter!("realtime_dispatch_total", "result" => result).increment(count);
}

#[inline]
pub fn set_realtime_connections(count: usize) {
    metrics::gauge!("realtime_connections").set(count as f64);
}

#[inline]
pub fn record_message_published(class: &'static str, status: &'static str) {
    metrics::counter!(
        "integration_messages_published_total",
        "class" => class,
        "status" => status
    )
    .increment(1);
}

/// 记录消费结果（`processed` / `skipped` / `failed`）
#[inline]
pub fn record_consumer_message(consumer: &'static str, status: &'static str) {
    metrics::counter!(
        "consumer_messages_total",
        "consumer" => consumer,
        "status" => status
    )
    .increment(1);
}

#[inline]
pub fn record_email_sent(status: &'static str) {
    metrics::counter!("emails_sent_total", "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        record_notifications_created(3);
        record_notifications_read(1);
        record_notifications_cleaned(0);
        record_realtime_dispatch("delivered", 2);
        set_realtime_connections(5);
        record_message_published("notification", "ok");
        record_consumer_message("email", "failed");
        record_email_sent("ok");
    }

    #[test]
    fn test_handle_absent_before_init() {
        // 单元测试进程不会安装全局 recorder
        assert!(get_handle().is_none());
    }
}
