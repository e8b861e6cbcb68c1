//! 消息处理器
//!
//! - `notification`: 通知类集成消息 → 站内通知
//! - `email`: 邮件类集成消息 → 邮件发送

pub mod email;
pub mod notification;

pub use email::EmailHandler;
pub use notification::NotificationHandler;

use blog_shared::broker::ConsumerMessage;
use blog_shared::events::IntegrationMessage;

use crate::error::{Result, WorkerError};

/// 解码集成消息信封
pub(crate) fn decode(message: &ConsumerMessage) -> Result<IntegrationMessage> {
    serde_json::from_slice(&message.payload)
        .map_err(|e| WorkerError::DeserializationFailed(e.to_string()))
}
