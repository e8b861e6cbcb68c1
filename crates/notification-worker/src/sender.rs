//! 邮件发送器
//!
//! 通过 `EmailSender` trait 抽象发送行为。当前提供的 `LogEmailSender` 只记录日志，
//! 接入真实的 SMTP 或邮件服务商时实现同一 trait 即可。

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;

/// 邮件发送接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to_email: &str, to_name: &str, subject: &str, body: &str) -> Result<()>;
}

/// 只记录日志的邮件发送器
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to_email: &str, to_name: &str, subject: &str, body: &str) -> Result<()> {
        info!(
            to_email,
            to_name,
            subject,
            body_len = body.chars().count(),
            "模拟发送邮件"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let sender = LogEmailSender;
        assert!(sender.send("a@example.com", "A", "hi", "body").await.is_ok());
    }
}
