//! 集成消息发布
//!
//! 发布器不缓冲任何消息，每次调用都是一次独立的发送。
//! 批量发布不具备原子性：成员按顺序逐条发送，某条失败时立即返回错误，之前的成员可能已经送达。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, instrument};

use blog_shared::broker::BrokerProducer;
use blog_shared::error::BlogError;
use blog_shared::events::{EmailMessage, IntegrationMessage, NotificationMessage};
use blog_shared::observability::metrics;

use crate::error::{NotificationError, Result};

/// 消息发布接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &IntegrationMessage) -> Result<()>;

    async fn publish_notification(&self, message: NotificationMessage) -> Result<()> {
        self.publish(&IntegrationMessage::Notification(message)).await
    }

    async fn publish_email(&self, message: EmailMessage) -> Result<()> {
        self.publish(&IntegrationMessage::Email(message)).await
    }

    async fn publish_batch(&self, messages: &[IntegrationMessage]) -> Result<()> {
        for (index, message) in messages.iter().enumerate() {
            if let Err(e) = self.publish(message).await {
                error!(
                    index,
                    total = messages.len(),
                    message_id = %message.id(),
                    error = %e,
                    "批量发布中断，之前的成员可能已送达"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

/// 基于消息代理的发布器
///
/// 按消息大类选择 topic，以消息 ID 作为 record key。
#[derive(Clone)]
pub struct BrokerMessagePublisher {
    producer: Arc<dyn BrokerProducer>,
}

impl BrokerMessagePublisher {
    pub fn new(producer: Arc<dyn BrokerProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl MessagePublisher for BrokerMessagePublisher {
    #[instrument(skip(self, message), fields(message_id = %message.id(), kind = message.kind()))]
    async fn publish(&self, message: &IntegrationMessage) -> Result<()> {
        let class = message.class().as_str();
        let message_id = message.id().to_string();

        let payload = serde_json::to_vec(message).map_err(|e| NotificationError::Publish {
            message_id: message_id.clone(),
            source: BlogError::from(e),
        })?;

        match self
            .producer
            .send(message.topic(), &message_id, &payload)
            .await
        {
            Ok(()) => {
                metrics::record_message_published(class, "ok");
                debug!(topic = message.topic(), "集成消息已发布");
                Ok(())
            }
            Err(source) => {
                metrics::record_message_published(class, "error");
                Err(NotificationError::Publish { message_id, source })
            }
        }
    }
}
