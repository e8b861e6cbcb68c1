//! 通知后台 Worker
//!
//! 消费通知与邮件集成消息、定期清理过期通知，并提供实时推送的 WebSocket 入口。

use std::sync::Arc;

use blog_notification::realtime::ws;
use blog_notification::{
    BrokerMessagePublisher, NotificationRepository, NotificationService, PgPostLookup,
    PgUserDirectory, RealtimeGateway, SubscriptionRegistry,
};
use blog_shared::broker::BrokerProducer;
use blog_shared::config::AppConfig;
use blog_shared::database::Database;
use blog_shared::dlq::DeadLetterSink;
use blog_shared::kafka::{KafkaConsumer, KafkaProducer, topics};
use blog_shared::observability;
use blog_shared::retry::RetryPolicy;
use blog_shared::shutdown;
use notification_worker::{
    CleanupWorker, ConsumerLoop, EmailHandler, LogEmailSender, NotificationHandler,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const SERVICE_NAME: &str = "notification-worker";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;
    let _guard = observability::init(SERVICE_NAME, &config.observability).await?;
    let settings = &config.notification;

    info!(addr = %config.server_addr(), "Starting {SERVICE_NAME}");

    // 基础设施
    let db = Database::connect(&config.database).await?;
    let producer: Arc<dyn BrokerProducer> = Arc::new(KafkaProducer::new(&config.kafka)?);

    // 通知服务与实时推送
    let registry = Arc::new(SubscriptionRegistry::new(settings.realtime_buffer));
    let service = Arc::new(
        NotificationService::new(
            Arc::new(NotificationRepository::new(db.pool().clone())),
            Arc::new(PgUserDirectory::new(db.pool().clone())),
            Arc::new(PgPostLookup::new(db.pool().clone())),
            registry.clone(),
            Arc::new(BrokerMessagePublisher::new(producer.clone())),
        )
        .with_retention(settings.retention()),
    );
    let gateway = Arc::new(RealtimeGateway::new(registry.clone(), service.clone()));

    // 后台循环
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let dead_letters = DeadLetterSink::new(producer.clone(), SERVICE_NAME);
    let backoff = RetryPolicy::with_initial_delay(settings.error_backoff());

    let notification_source = KafkaConsumer::new(&config.kafka, Some("notifications"))?;
    notification_source.subscribe(&[topics::NOTIFICATIONS])?;
    let notification_loop = ConsumerLoop::new(
        notification_source,
        NotificationHandler::new(service.clone(), settings.dedupe_capacity),
        dead_letters.clone(),
        settings.idle_interval(),
    )
    .with_max_batch(settings.consumer_max_batch)
    .with_backoff(backoff.clone())
    .spawn(shutdown_rx.clone());

    let email_source = KafkaConsumer::new(&config.kafka, Some("emails"))?;
    email_source.subscribe(&[topics::EMAILS])?;
    let email_handler = EmailHandler::new(Arc::new(LogEmailSender), settings.dedupe_capacity)
        .with_chunking(settings.email_chunk_size, settings.email_chunk_pause());
    let email_loop = ConsumerLoop::new(
        email_source,
        email_handler,
        dead_letters,
        settings.idle_interval(),
    )
    .with_max_batch(settings.consumer_max_batch)
    .with_backoff(backoff)
    .spawn(shutdown_rx.clone());

    let cleanup_loop =
        CleanupWorker::new(service.clone(), settings.cleanup_interval()).spawn(shutdown_rx.clone());

    // WebSocket 入口
    let app = ws::router(gateway).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(config.server_addr()).await?;
    info!(addr = %config.server_addr(), "实时推送入口已启动");

    let mut server_shutdown = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    // 断开全部实时连接，WebSocket 任务随之结束
    registry.shutdown();

    if let Err(e) = notification_loop.await {
        error!(error = %e, "通知消费者异常退出");
    }
    if let Err(e) = email_loop.await {
        error!(error = %e, "邮件消费者异常退出");
    }
    if let Err(e) = cleanup_loop.await {
        error!(error = %e, "清理 Worker 异常退出");
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP 服务异常退出"),
        Err(e) => error!(error = %e, "HTTP 服务任务异常退出"),
    }

    db.close().await;
    info!("{SERVICE_NAME} 已停止");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "安装 Ctrl+C 信号处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "安装 SIGTERM 信号处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C，开始优雅关闭"),
        _ = terminate => info!("收到 SIGTERM，开始优雅关闭"),
    }
}
