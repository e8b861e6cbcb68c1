//! 通知实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NotificationError, Result};

/// 标题最大字符数
pub const MAX_TITLE_CHARS: usize = 100;
/// 正文最大字符数
pub const MAX_MESSAGE_CHARS: usize = 500;
/// 跳转链接最大字符数
pub const MAX_ACTION_URL_CHARS: usize = 500;
/// 接收者与触发者 ID 的最大字符数
pub const MAX_USER_ID_CHARS: usize = 128;

/// 每页条数上限
pub const MAX_PAGE_SIZE: i64 = 100;

/// 通知类型
///
/// 数据库中以 snake_case 字符串存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum NotificationType {
    /// 文章收到新评论
    NewComment,
    NewLike,
    /// 文章被点赞（与 NewLike 含义相同，保留两者以兼容历史数据）
    PostLiked,
    NewFollower,
    CommentLike,
    CommentReply,
    /// 关注的作者发布了新文章
    PostPublished,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewComment => "new_comment",
            Self::NewLike => "new_like",
            Self::PostLiked => "post_liked",
            Self::NewFollower => "new_follower",
            Self::CommentLike => "comment_like",
            Self::CommentReply => "comment_reply",
            Self::PostPublished => "post_published",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知记录
///
/// 除已读状态外全部字段在创建后不可变；`is_read == false` 当且仅当 `read_at` 为空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    /// 接收者
    pub user_id: String,
    /// 触发者（点赞人、评论人等）
    pub actor_id: Option<String>,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub action_url: Option<String>,
    /// 附加数据（JSON 文本），由客户端自行解释
    pub action_data: Option<String>,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// 标记为已读
    ///
    /// 只有首次调用会修改状态并返回 `true`，已读通知的 `read_at` 保持不变。
    pub fn mark_read(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(now);
        true
    }

    /// 推送给实时客户端的精简负载
    pub fn to_payload(&self) -> NotificationPayload {
        NotificationPayload {
            id: self.id,
            title: self.title.clone(),
            message: self.message.clone(),
            notification_type: self.notification_type,
            action_url: self.action_url.clone(),
            created_at: self.created_at,
            is_read: self.is_read,
        }
    }
}

/// 实时推送的通知负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// 创建通知的输入
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub action_url: Option<String>,
    pub action_data: Option<String>,
    pub actor_id: Option<String>,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        notification_type: NotificationType,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            notification_type,
            action_url: None,
            action_data: None,
            actor_id: None,
            post_id: None,
            comment_id: None,
        }
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_action_data(mut self, data: impl Into<String>) -> Self {
        self.action_data = Some(data.into());
        self
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_post(mut self, post_id: Uuid) -> Self {
        self.post_id = Some(post_id);
        self
    }

    pub fn with_comment(mut self, comment_id: Uuid) -> Self {
        self.comment_id = Some(comment_id);
        self
    }

    /// 校验并生成待持久化的通知
    ///
    /// 超长文本按字符截断到存储上限；超长的用户 ID 不截断，直接拒绝。
    pub fn into_notification(self, now: DateTime<Utc>) -> Result<Notification> {
        if self.user_id.trim().is_empty() {
            return Err(NotificationError::invalid_argument(
                "user_id",
                "接收者不能为空",
            ));
        }
        check_user_id_len("user_id", &self.user_id)?;
        if let Some(actor_id) = &self.actor_id {
            check_user_id_len("actor_id", actor_id)?;
        }

        Ok(Notification {
            id: Uuid::now_v7(),
            user_id: self.user_id,
            actor_id: self.actor_id,
            title: truncate_chars(self.title, MAX_TITLE_CHARS),
            message: truncate_chars(self.message, MAX_MESSAGE_CHARS),
            notification_type: self.notification_type,
            action_url: self
                .action_url
                .map(|url| truncate_chars(url, MAX_ACTION_URL_CHARS)),
            action_data: self.action_data,
            post_id: self.post_id,
            comment_id: self.comment_id,
            is_read: false,
            read_at: None,
            created_at: now,
        })
    }
}

fn check_user_id_len(field: &str, value: &str) -> Result<()> {
    if value.chars().count() > MAX_USER_ID_CHARS {
        return Err(NotificationError::invalid_argument(
            field,
            format!("长度不能超过 {MAX_USER_ID_CHARS} 个字符"),
        ));
    }
    Ok(())
}

fn truncate_chars(mut value: String, max_chars: usize) -> String {
    if let Some((idx, _)) = value.char_indices().nth(max_chars) {
        value.truncate(idx);
    }
    value
}

// ---------------------------------------------------------------------------
// 分页
// ---------------------------------------------------------------------------

/// 分页参数（页码从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    /// 规范化：页码小于 1 视为 1，每页条数限制在 1..=100
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl NotificationPage {
    pub fn new(items: Vec<Notification>, total_count: i64, request: PageRequest) -> Self {
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + request.page_size - 1) / request.page_size
        };
        Self {
            items,
            total_count,
            page: request.page,
            page_size: request.page_size,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_notification() -> Notification {
        NewNotification::new("user-1", "新评论", "bob 评论了你的文章", NotificationType::NewComment)
            .into_notification(Utc::now())
            .unwrap()
    }

    #[test]
    fn test_new_notification_starts_unread() {
        let n = make_notification();
        assert!(!n.is_read);
        assert!(n.read_at.is_none());
        assert!(n.is_owned_by("user-1"));
        assert!(!n.is_owned_by("user-2"));
    }

    #[test]
    fn test_empty_user_is_rejected() {
        let result = NewNotification::new("  ", "t", "m", NotificationType::NewLike)
            .into_notification(Utc::now());
        assert!(matches!(
            result,
            Err(NotificationError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_user_ids_longer_than_column_are_rejected() {
        let at_limit = "u".repeat(MAX_USER_ID_CHARS);
        assert!(
            NewNotification::new(at_limit.as_str(), "t", "m", NotificationType::NewLike)
                .with_actor(at_limit.as_str())
                .into_notification(Utc::now())
                .is_ok()
        );

        let too_long = "u".repeat(MAX_USER_ID_CHARS + 1);
        let recipient = NewNotification::new(too_long.as_str(), "t", "m", NotificationType::NewLike)
            .into_notification(Utc::now());
        assert!(matches!(
            recipient,
            Err(NotificationError::InvalidArgument { ref field, .. }) if field == "user_id"
        ));

        let actor = NewNotification::new("u", "t", "m", NotificationType::NewLike)
            .with_actor(too_long.as_str())
            .into_notification(Utc::now());
        assert!(matches!(
            actor,
            Err(NotificationError::InvalidArgument { ref field, .. }) if field == "actor_id"
        ));
    }

    #[test]
    fn test_mark_read_sets_read_at_once() {
        let mut n = make_notification();
        let first = Utc::now();
        assert!(n.mark_read(first));
        assert_eq!(n.read_at, Some(first));

        let later = first + chrono::Duration::seconds(10);
        assert!(!n.mark_read(later));
        assert_eq!(n.read_at, Some(first));
    }

    #[test]
    fn test_long_text_is_truncated_on_char_boundary() {
        let title = "标".repeat(MAX_TITLE_CHARS + 20);
        let message = "x".repeat(MAX_MESSAGE_CHARS + 1);
        let n = NewNotification::new("user-1", title, message, NotificationType::NewLike)
            .with_action_url("/".repeat(600))
            .into_notification(Utc::now())
            .unwrap();

        assert_eq!(n.title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(n.message.chars().count(), MAX_MESSAGE_CHARS);
        assert_eq!(
            n.action_url.as_deref().map(|u| u.chars().count()),
            Some(MAX_ACTION_URL_CHARS)
        );
    }

    #[test]
    fn test_payload_shape() {
        let n = make_notification();
        let json = serde_json::to_value(n.to_payload()).unwrap();
        assert_eq!(json["type"], "new_comment");
        assert_eq!(json["isRead"], false);
        assert!(json.get("actionUrl").is_some());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_page_request_normalization() {
        assert_eq!(PageRequest::new(0, 20), PageRequest { page: 1, page_size: 20 });
        assert_eq!(PageRequest::new(3, 0).page_size, 1);
        assert_eq!(PageRequest::new(1, 1000).page_size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_total_pages() {
        let request = PageRequest::new(1, 20);
        assert_eq!(NotificationPage::new(vec![], 0, request).total_pages, 0);
        assert_eq!(NotificationPage::new(vec![], 20, request).total_pages, 1);
        assert_eq!(NotificationPage::new(vec![], 41, request).total_pages, 3);
    }
}
