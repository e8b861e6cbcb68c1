//! 邮件消息处理器
//!
//! 一批邮件按优先级排序（紧急优先，同一优先级保持到达顺序），
//! 按固定大小分块并发发送，块与块之间短暂停顿，避免瞬时压垮邮件服务。
//! 邮件发送不是幂等的：只有发送成功后才记录消息 ID，重复投递的 ID 直接跳过。

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blog_shared::broker::ConsumerMessage;
use blog_shared::events::{EmailMessage, IntegrationMessage};
use blog_shared::observability::metrics;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::decode;
use crate::consumer::{HandleOutcome, MessageHandler, guarded};
use crate::dedupe::ProcessedIds;
use crate::error::{Result, WorkerError};
use crate::sender::EmailSender;

/// 默认分块大小
pub const DEFAULT_CHUNK_SIZE: usize = 10;
/// 默认块间停顿
pub const DEFAULT_CHUNK_PAUSE: Duration = Duration::from_millis(100);

pub struct EmailHandler {
    sender: Arc<dyn EmailSender>,
    processed: ProcessedIds,
    chunk_size: usize,
    chunk_pause: Duration,
}

impl EmailHandler {
    pub fn new(sender: Arc<dyn EmailSender>, dedupe_capacity: usize) -> Self {
        Self {
            sender,
            processed: ProcessedIds::new(dedupe_capacity),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_pause: DEFAULT_CHUNK_PAUSE,
        }
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_pause: Duration) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.chunk_pause = chunk_pause;
        self
    }

    fn decode_email(message: &ConsumerMessage) -> Result<EmailMessage> {
        match decode(message)? {
            IntegrationMessage::Email(email) => Ok(email),
            other => Err(WorkerError::UnexpectedMessage {
                expected: "email",
                actual: other.class().as_str(),
            }),
        }
    }

    async fn send_one(&self, email: &EmailMessage) -> Result<HandleOutcome> {
        if self.processed.contains(&email.id) {
            debug!(message_id = %email.id, "重复投递的邮件消息，跳过");
            return Ok(HandleOutcome::Skipped);
        }

        if email.priority.is_elevated() {
            warn!(
                message_id = %email.id,
                priority = ?email.priority,
                to_email = %email.to_email,
                "处理高优先级邮件"
            );
        }

        match self
            .sender
            .send(&email.to_email, &email.to_name, &email.subject, &email.body)
            .await
        {
            Ok(()) => {
                self.processed.insert(email.id);
                metrics::record_email_sent("sent");
                info!(message_id = %email.id, to_email = %email.to_email, "邮件已发送");
                Ok(HandleOutcome::Processed)
            }
            Err(e) => {
                metrics::record_email_sent("failed");
                Err(WorkerError::EmailSendFailed {
                    message_id: email.id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl MessageHandler for EmailHandler {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn handle(&self, message: &ConsumerMessage) -> Result<HandleOutcome> {
        let email = Self::decode_email(message)?;
        self.send_one(&email).await
    }

    async fn handle_batch(&self, messages: &[ConsumerMessage]) -> Vec<Result<HandleOutcome>> {
        let mut results: Vec<Option<Result<HandleOutcome>>> =
            messages.iter().map(|_| None).collect();
        let mut pending: Vec<(usize, EmailMessage)> = Vec::with_capacity(messages.len());
        let mut batch_ids = HashSet::new();

        for (index, message) in messages.iter().enumerate() {
            match Self::decode_email(message) {
                Ok(email) => {
                    // 同一批内的重复 ID 只发送一次
                    if !batch_ids.insert(email.id) {
                        debug!(message_id = %email.id, "批内重复的邮件消息，跳过");
                        results[index] = Some(Ok(HandleOutcome::Skipped));
                        continue;
                    }
                    pending.push((index, email));
                }
                Err(e) => results[index] = Some(Err(e)),
            }
        }

        // sort_by_key 是稳定排序
        pending.sort_by_key(|(_, email)| Reverse(email.priority));

        for (chunk_index, chunk) in pending.chunks(self.chunk_size).enumerate() {
            if chunk_index > 0 {
                tokio::time::sleep(self.chunk_pause).await;
            }

            let outcomes = join_all(chunk.iter().map(|(_, email)| guarded(self.send_one(email)))).await;
            for ((index, _), outcome) in chunk.iter().zip(outcomes) {
                results[*index] = Some(outcome);
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| {
                    Err(WorkerError::HandlerPanicked("邮件处理结果缺失".to_string()))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use blog_shared::events::{EmailPriority, NotificationMessage, NewFollowerMessage};
    use blog_shared::kafka::topics;
    use chrono::Utc;
    use mockall::Sequence;
    use uuid::Uuid;

    use crate::sender::MockEmailSender;

    fn consumed(message: &IntegrationMessage) -> ConsumerMessage {
        ConsumerMessage {
            topic: topics::EMAILS.to_string(),
            partition: 0,
            offset: 0,
            key: Some(message.id().to_string()),
            payload: serde_json::to_vec(message).unwrap(),
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    fn email(to: &str, priority: EmailPriority) -> EmailMessage {
        EmailMessage::new(to, "收件人", "主题", "正文").with_priority(priority)
    }

    #[tokio::test]
    async fn test_batch_sends_by_priority_stable() {
        let sent = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = sent.clone();
        let mut sender = MockEmailSender::new();
        sender.expect_send().times(4).returning(move |to, _, _, _| {
            recorder.lock().push(to.to_string());
            Ok(())
        });

        // 分块大小为 1，保证发送顺序可观察
        let handler = EmailHandler::new(Arc::new(sender), 100).with_chunking(1, Duration::ZERO);
        let batch: Vec<ConsumerMessage> = [
            email("n1@x.com", EmailPriority::Normal),
            email("h@x.com", EmailPriority::High),
            email("n2@x.com", EmailPriority::Normal),
            email("c@x.com", EmailPriority::Critical),
        ]
        .into_iter()
        .map(|e| consumed(&e.into()))
        .collect();

        let results = handler.handle_batch(&batch).await;
        assert!(results.iter().all(|r| matches!(r, Ok(HandleOutcome::Processed))));
        assert_eq!(
            *sent.lock(),
            vec!["c@x.com", "h@x.com", "n1@x.com", "n2@x.com"]
        );
    }

    #[tokio::test]
    async fn test_failed_send_is_not_recorded() {
        let mut sender = MockEmailSender::new();
        let mut seq = Sequence::new();
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| {
                Err(WorkerError::Shared(
                    blog_shared::error::BlogError::ExternalService {
                        service: "smtp".to_string(),
                        message: "超时".to_string(),
                    },
                ))
            });
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));

        let handler = EmailHandler::new(Arc::new(sender), 100);
        let message = consumed(&email("a@x.com", EmailPriority::Normal).into());

        assert!(matches!(
            handler.handle(&message).await,
            Err(WorkerError::EmailSendFailed { .. })
        ));
        // 失败后重投可以再次发送，成功后的重投被跳过
        assert_eq!(handler.handle(&message).await.unwrap(), HandleOutcome::Processed);
        assert_eq!(handler.handle(&message).await.unwrap(), HandleOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_notification_class_is_unexpected() {
        let sender = MockEmailSender::new();
        let handler = EmailHandler::new(Arc::new(sender), 100);
        let message = consumed(&IntegrationMessage::Notification(
            NotificationMessage::NewFollower(NewFollowerMessage {
                id: Uuid::now_v7(),
                timestamp: Utc::now(),
                user_id: "x".to_string(),
                title: "t".to_string(),
                message: "m".to_string(),
                follower_id: "y".to_string(),
                follower_name: "Y".to_string(),
                followed_user_id: "x".to_string(),
            }),
        ));

        assert!(matches!(
            handler.handle(&message).await,
            Err(WorkerError::UnexpectedMessage { expected: "email", .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_priority_is_sent_as_normal() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().times(1).returning(|_, _, _, _| Ok(()));
        let handler = EmailHandler::new(Arc::new(sender), 100);

        let envelope: IntegrationMessage = email("a@x.com", EmailPriority::Normal).into();
        let mut raw = serde_json::to_value(&envelope).unwrap();
        raw["body"]["priority"] = serde_json::json!(4);
        let mut message = consumed(&envelope);
        message.payload = serde_json::to_vec(&raw).unwrap();

        assert_eq!(handler.handle(&message).await.unwrap(), HandleOutcome::Processed);
    }

    #[tokio::test]
    async fn test_duplicate_in_batch_sent_once() {
        let mut sender = MockEmailSender::new();
        sender.expect_send().times(1).returning(|_, _, _, _| Ok(()));

        let handler = EmailHandler::new(Arc::new(sender), 100);
        let message = consumed(&email("a@x.com", EmailPriority::High).into());
        let results = handler.handle_batch(&[message.clone(), message]).await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Ok(HandleOutcome::Processed)));
        assert!(matches!(results[1], Ok(HandleOutcome::Skipped)));
    }
}
