//! 通知 Worker 错误类型
//!
//! 消费循环只关心"这条消息是否处理成功"，具体错误类型用于日志与死信原因。

use blog_notification::NotificationError;
use blog_shared::error::BlogError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("消息反序列化失败: {0}")]
    DeserializationFailed(String),

    #[error("消息类型不匹配: 期望={expected}, 实际={actual}")]
    UnexpectedMessage {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("邮件发送失败: message_id={message_id}, 原因={reason}")]
    EmailSendFailed { message_id: Uuid, reason: String },

    #[error("消息处理过程中发生 panic: {0}")]
    HandlerPanicked(String),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Shared(#[from] BlogError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
