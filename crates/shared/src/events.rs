//! 集成消息模型
//!
//! 发布到消息代理、供下游消费者处理的消息信封。与持久化的通知记录不同，
//! 这些消息是瞬时的：发布方构造后交给代理，消费方拿到的是一份副本。
//!
//! 消息是一个封闭的集合，JSON 形如
//! `{"class": "notification", "body": {"kind": "post_liked", ...}}`，
//! 消费方通过一次 match 完成分发，不依赖运行时类型识别。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::kafka::topics;

// ---------------------------------------------------------------------------
// 通知类消息
// ---------------------------------------------------------------------------

/// 文章被点赞
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostLikedMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub post_id: Uuid,
    pub post_title: String,
    pub post_slug: String,
    pub post_author_id: String,
    pub liker_user_id: String,
    pub liker_user_name: String,
}

/// 文章收到新评论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommentMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub post_id: Uuid,
    pub comment_id: Uuid,
    pub post_title: String,
    pub post_slug: String,
    pub post_author_id: String,
    pub commenter_user_id: String,
    pub commenter_user_name: String,
    pub comment_content: String,
}

/// 新的关注者
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFollowerMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub follower_id: String,
    pub follower_name: String,
    pub followed_user_id: String,
}

/// 关注的作者发布了新文章
///
/// 一条消息携带全部关注者 ID，而不是每个关注者一条，方便下游批量处理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPublishedMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// 作者本人；接收方列表见 `follower_ids`
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub post_id: Uuid,
    pub post_title: String,
    pub post_slug: String,
    pub author_id: String,
    pub author_name: String,
    pub post_excerpt: String,
    pub follower_ids: Vec<String>,
}

/// 通知类消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationMessage {
    PostLiked(PostLikedMessage),
    NewComment(NewCommentMessage),
    NewFollower(NewFollowerMessage),
    PostPublished(PostPublishedMessage),
}

impl NotificationMessage {
    pub fn id(&self) -> Uuid {
        match self {
            Self::PostLiked(m) => m.id,
            Self::NewComment(m) => m.id,
            Self::NewFollower(m) => m.id,
            Self::PostPublished(m) => m.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::PostLiked(m) => &m.user_id,
            Self::NewComment(m) => &m.user_id,
            Self::NewFollower(m) => &m.user_id,
            Self::PostPublished(m) => &m.user_id,
        }
    }

    /// 消息种类，与序列化后的 `kind` 字段一致
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PostLiked(_) => "post_liked",
            Self::NewComment(_) => "new_comment",
            Self::NewFollower(_) => "new_follower",
            Self::PostPublished(_) => "post_published",
        }
    }
}

// ---------------------------------------------------------------------------
// 邮件类消息
// ---------------------------------------------------------------------------

/// 邮件优先级
///
/// 仅作为消费方的处理提示，发布方不做任何强制。
/// 无法识别的取值按 `Normal` 处理，不会让整条邮件解码失败。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", from = "i64")]
pub enum EmailPriority {
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl EmailPriority {
    /// 高优先级邮件需要优先处理
    pub fn is_elevated(&self) -> bool {
        *self >= Self::High
    }
}

impl From<EmailPriority> for u8 {
    fn from(priority: EmailPriority) -> Self {
        priority as u8
    }
}

impl From<i64> for EmailPriority {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::Normal,
            2 => Self::High,
            3 => Self::Critical,
            other => {
                warn!(priority = other, "无法识别的邮件优先级，按普通优先级处理");
                Self::Normal
            }
        }
    }
}

/// 邮件消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_data: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: EmailPriority,
}

impl EmailMessage {
    /// 构造一封普通优先级的邮件，ID 与时间戳在此生成
    pub fn new(
        to_email: impl Into<String>,
        to_name: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            to_email: to_email.into(),
            to_name: to_name.into(),
            subject: subject.into(),
            body: body.into(),
            template_name: None,
            template_data: None,
            priority: EmailPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: EmailPriority) -> Self {
        self.priority = priority;
        self
    }
}

// ---------------------------------------------------------------------------
// IntegrationMessage: 统一信封
// ---------------------------------------------------------------------------

/// 消息大类，决定投递的 topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Notification,
    Email,
}

impl MessageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Email => "email",
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            Self::Notification => topics::NOTIFICATIONS,
            Self::Email => topics::EMAILS,
        }
    }
}

/// 集成消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", content = "body", rename_all = "snake_case")]
pub enum IntegrationMessage {
    Notification(NotificationMessage),
    Email(EmailMessage),
}

impl IntegrationMessage {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Notification(m) => m.id(),
            Self::Email(m) => m.id,
        }
    }

    pub fn class(&self) -> MessageClass {
        match self {
            Self::Notification(_) => MessageClass::Notification,
            Self::Email(_) => MessageClass::Email,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.class().topic()
    }

    /// 便于日志输出的种类名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Notification(m) => m.kind(),
            Self::Email(_) => "email",
        }
    }
}

impl From<NotificationMessage> for IntegrationMessage {
    fn from(message: NotificationMessage) -> Self {
        Self::Notification(message)
    }
}

impl From<EmailMessage> for IntegrationMessage {
    fn from(message: EmailMessage) -> Self {
        Self::Email(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_post_liked() -> PostLikedMessage {
        PostLikedMessage {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            user_id: "author-1".to_string(),
            title: "文章收到点赞".to_string(),
            message: "bob 赞了你的文章：Rust 入门".to_string(),
            post_id: Uuid::new_v4(),
            post_title: "Rust 入门".to_string(),
            post_slug: "rust-intro".to_string(),
            post_author_id: "author-1".to_string(),
            liker_user_id: "user-2".to_string(),
            liker_user_name: "bob".to_string(),
        }
    }

    #[test]
    fn test_notification_message_wire_shape() {
        let message = IntegrationMessage::from(NotificationMessage::PostLiked(make_post_liked()));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["class"], "notification");
        assert_eq!(json["body"]["kind"], "post_liked");
        assert_eq!(json["body"]["post_author_id"], "author-1");
        assert_eq!(json["body"]["liker_user_id"], "user-2");
    }

    #[test]
    fn test_decode_dispatches_on_discriminator() {
        let original = IntegrationMessage::from(NotificationMessage::PostLiked(make_post_liked()));
        let bytes = serde_json::to_vec(&original).unwrap();

        let decoded: IntegrationMessage = serde_json::from_slice(&bytes).unwrap();
        match &decoded {
            IntegrationMessage::Notification(NotificationMessage::PostLiked(m)) => {
                assert_eq!(m.liker_user_name, "bob");
            }
            other => panic!("解码得到了错误的消息种类: {other:?}"),
        }
        assert_eq!(decoded.id(), original.id());
        assert_eq!(decoded.topic(), topics::NOTIFICATIONS);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"class":"notification","body":{"kind":"post_archived","id":"x"}}"#;
        assert!(serde_json::from_str::<IntegrationMessage>(json).is_err());
    }

    #[test]
    fn test_email_priority_serializes_as_number() {
        let email = EmailMessage::new("a@example.com", "Alice", "Hi", "Body")
            .with_priority(EmailPriority::Critical);
        let json = serde_json::to_value(IntegrationMessage::from(email)).unwrap();

        assert_eq!(json["class"], "email");
        assert_eq!(json["body"]["priority"], 3);
        assert!(json["body"].get("template_name").is_none());
    }

    #[test]
    fn test_email_priority_defaults_to_normal() {
        let json = r#"{
            "id": "0190b0a0-0000-7000-8000-000000000000",
            "timestamp": "2026-01-01T00:00:00Z",
            "to_email": "a@example.com",
            "to_name": "Alice",
            "subject": "Hi",
            "body": "Body"
        }"#;
        let email: EmailMessage = serde_json::from_str(json).unwrap();
        assert_eq!(email.priority, EmailPriority::Normal);
    }

    #[test]
    fn test_unknown_email_priority_falls_back_to_normal() {
        for raw in ["0", "4", "-1", "300"] {
            let json = format!(
                r#"{{"class":"email","body":{{"id":"0190b0a0-0000-7000-8000-000000000000",
                "timestamp":"2026-01-01T00:00:00Z","to_email":"a@example.com","to_name":"Alice",
                "subject":"Hi","body":"Body","priority":{raw}}}}}"#
            );
            let message: IntegrationMessage = serde_json::from_str(&json).unwrap();
            match message {
                IntegrationMessage::Email(email) => assert_eq!(email.priority, EmailPriority::Normal),
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert_eq!(EmailPriority::from(2), EmailPriority::High);
        assert!(EmailPriority::High.is_elevated());
        assert!(!EmailPriority::Normal.is_elevated());
    }
}
