//! 通知后台 Worker
//!
//! 运行三个受控的后台循环，并托管实时推送的 WebSocket 入口：
//!
//! - **通知消费者**：消费 `blog.notifications`，为接收者创建站内通知
//! - **邮件消费者**：消费 `blog.emails`，按优先级分块发送邮件
//! - **清理 Worker**：定期删除超过保留期的通知
//!
//! 处理失败的消息写入死信队列 `blog.dlq`，循环本身只在收到关闭信号时退出。

pub mod cleanup;
pub mod consumer;
pub mod dedupe;
pub mod error;
pub mod handlers;
pub mod sender;

pub use cleanup::CleanupWorker;
pub use consumer::{ConsumerLoop, HandleOutcome, MessageHandler};
pub use error::{Result, WorkerError};
pub use handlers::{EmailHandler, NotificationHandler};
pub use sender::{EmailSender, LogEmailSender};
