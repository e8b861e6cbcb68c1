//! 通知消息处理器
//!
//! 对每条通知类集成消息，按消息种类为接收者创建站内通知。
//! 同步路径通常已经创建过一次，这里允许重复创建；同一消息 ID 的重复投递会被跳过。

use std::sync::Arc;

use async_trait::async_trait;
use blog_notification::service::action_urls;
use blog_notification::{NewNotification, NotificationService, NotificationType};
use blog_shared::broker::ConsumerMessage;
use blog_shared::events::{IntegrationMessage, NotificationMessage};
use tracing::{debug, info};

use super::decode;
use crate::consumer::{HandleOutcome, MessageHandler};
use crate::dedupe::ProcessedIds;
use crate::error::Result;

pub struct NotificationHandler {
    service: Arc<NotificationService>,
    processed: ProcessedIds,
}

impl NotificationHandler {
    pub fn new(service: Arc<NotificationService>, dedupe_capacity: usize) -> Self {
        Self {
            service,
            processed: ProcessedIds::new(dedupe_capacity),
        }
    }

    /// 根据消息种类生成待创建的通知
    fn recipients(message: &NotificationMessage) -> Vec<NewNotification> {
        match message {
            NotificationMessage::PostLiked(m) => vec![
                NewNotification::new(&m.user_id, &m.title, &m.message, NotificationType::PostLiked)
                    .with_actor(&m.liker_user_id)
                    .with_post(m.post_id)
                    .with_action_url(action_urls::post(&m.post_slug)),
            ],
            NotificationMessage::NewComment(m) => vec![
                NewNotification::new(&m.user_id, &m.title, &m.message, NotificationType::NewComment)
                    .with_actor(&m.commenter_user_id)
                    .with_post(m.post_id)
                    .with_comment(m.comment_id)
                    .with_action_url(action_urls::comment(&m.post_slug, m.comment_id)),
            ],
            NotificationMessage::NewFollower(m) => vec![
                NewNotification::new(&m.user_id, &m.title, &m.message, NotificationType::NewFollower)
                    .with_actor(&m.follower_id),
            ],
            NotificationMessage::PostPublished(m) => m
                .follower_ids
                .iter()
                .filter(|follower_id| **follower_id != m.author_id)
                .map(|follower_id| {
                    NewNotification::new(
                        follower_id,
                        &m.title,
                        &m.message,
                        NotificationType::PostPublished,
                    )
                    .with_actor(&m.author_id)
                    .with_post(m.post_id)
                    .with_action_url(action_urls::post(&m.post_slug))
                })
                .collect(),
        }
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, message: &ConsumerMessage) -> Result<HandleOutcome> {
        let notification = match decode(message)? {
            IntegrationMessage::Notification(notification) => notification,
            IntegrationMessage::Email(email) => {
                info!(message_id = %email.id, "通知 topic 上收到邮件消息，跳过");
                return Ok(HandleOutcome::Skipped);
            }
        };

        let message_id = notification.id();
        if self.processed.contains(&message_id) {
            debug!(%message_id, "重复投递的通知消息，跳过");
            return Ok(HandleOutcome::Skipped);
        }

        let pending = Self::recipients(&notification);
        let count = pending.len();
        for input in pending {
            self.service.create(input).await?;
        }

        self.processed.insert(message_id);
        info!(
            %message_id,
            kind = notification.kind(),
            created = count,
            "通知消息处理完成"
        );
        Ok(HandleOutcome::Processed)
    }
}
