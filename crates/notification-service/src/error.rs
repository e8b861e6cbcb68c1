//! 通知服务错误类型

use blog_shared::error::BlogError;
use thiserror::Error;

/// 通知服务错误类型
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("参数无效: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    /// 实时投递失败，服务内部只记录日志，不向调用方传播
    #[error("实时投递失败: group={group}, {message}")]
    Dispatch { group: String, message: String },

    #[error("集成消息发布失败: message_id={message_id}, {source}")]
    Publish {
        message_id: String,
        #[source]
        source: BlogError,
    },

    #[error(transparent)]
    Shared(#[from] BlogError),
}

/// 通知服务 Result 类型别名
pub type Result<T> = std::result::Result<T, NotificationError>;

impl NotificationError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 获取错误码（用于 API 响应）
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Dispatch { .. } => "DISPATCH_FAILED",
            Self::Publish { .. } => "PUBLISH_FAILED",
            Self::Shared(e) => e.code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Publish { source, .. } => source.is_retryable(),
            Self::Shared(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for NotificationError {
    fn from(e: sqlx::Error) -> Self {
        Self::Shared(BlogError::Database(e))
    }
}
