//! 通知服务
//!
//! 通知的创建、查询、已读、删除与过期清理，以及各业务事件的通知辅助方法。
//!
//! ## 创建流程
//!
//! 1. 持久化通知 -> 2. 推送到接收者的 `user:<id>` 分组（失败只记日志）
//!
//! ## 事件辅助方法
//!
//! 1. 自我通知检查 -> 2. 解析触发者与文章 -> 3. 创建通知
//!    -> 4. 发布集成消息（失败只记日志并体现在返回结果中，已创建的通知不回滚）

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use blog_shared::events::{
    IntegrationMessage, NewCommentMessage, NewFollowerMessage, NotificationMessage,
    PostLikedMessage, PostPublishedMessage,
};
use blog_shared::observability::metrics;

use crate::error::Result;
use crate::models::{
    NewNotification, Notification, NotificationPage, NotificationType, PageRequest, PostSummary,
    UserProfile,
};
use crate::publisher::MessagePublisher;
use crate::realtime::{DispatchReport, GroupKey, RealtimeDispatcher, ServerEvent};
use crate::repository::{NotificationRepositoryTrait, PostLookupTrait, UserDirectoryTrait};

/// 默认保留天数
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// 展示文案
mod texts {
    pub const POST_LIKED_TITLE: &str = "文章收到点赞";
    pub const NEW_COMMENT_TITLE: &str = "新评论";
    pub const NEW_FOLLOWER_TITLE: &str = "新关注者";
    pub const POST_PUBLISHED_TITLE: &str = "新文章";

    pub fn post_liked(liker: &str, post_title: &str) -> String {
        format!("{liker} 赞了你的文章：{post_title}")
    }

    pub fn new_comment(commenter: &str, post_title: &str) -> String {
        format!("{commenter} 评论了你的文章：{post_title}")
    }

    pub fn new_follower(follower: &str) -> String {
        format!("{follower} 关注了你")
    }

    pub fn post_published(author: &str, post_title: &str) -> String {
        format!("{author} 发布了新文章：{post_title}")
    }
}

/// 跳转链接
pub mod action_urls {
    use uuid::Uuid;

    pub fn post(slug: &str) -> String {
        format!("/posts/{slug}")
    }

    pub fn comment(slug: &str, comment_id: Uuid) -> String {
        format!("/posts/{slug}#comment-{comment_id}")
    }

    pub fn user(username: &str) -> String {
        format!("/users/{username}")
    }
}

/// 事件辅助方法的执行结果
#[derive(Debug, Clone, Default)]
pub struct NotificationOutcome {
    /// 本次创建的通知
    pub notifications: Vec<Notification>,
    /// 集成消息是否已成功交给消息代理
    pub message_published: bool,
}

impl NotificationOutcome {
    /// 未产生任何通知（自我通知、对象不存在等）
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn is_skipped(&self) -> bool {
        self.notifications.is_empty() && !self.message_published
    }
}

/// 通知服务
pub struct NotificationService {
    repo: Arc<dyn NotificationRepositoryTrait>,
    users: Arc<dyn UserDirectoryTrait>,
    posts: Arc<dyn PostLookupTrait>,
    dispatcher: Arc<dyn RealtimeDispatcher>,
    publisher: Arc<dyn MessagePublisher>,
    retention: Duration,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepositoryTrait>,
        users: Arc<dyn UserDirectoryTrait>,
        posts: Arc<dyn PostLookupTrait>,
        dispatcher: Arc<dyn RealtimeDispatcher>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            repo,
            users,
            posts,
            dispatcher,
            publisher,
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    // -----------------------------------------------------------------------
    // 基础操作
    // -----------------------------------------------------------------------

    /// 创建通知并推送给接收者
    ///
    /// 持久化是权威结果：实时推送失败只记录日志，不影响返回值。
    #[instrument(skip(self, input), fields(user_id = %input.user_id, notification_type = %input.notification_type))]
    pub async fn create(&self, input: NewNotification) -> Result<Notification> {
        let notification = input.into_notification(Utc::now())?;
        self.repo.insert(&notification).await?;
        metrics::record_notifications_created(1);

        match serde_json::to_value(notification.to_payload()) {
            Ok(payload) => self.dispatch_to_user(
                &notification.user_id,
                ServerEvent::new(ServerEvent::NEW_NOTIFICATION, payload),
            ),
            Err(e) => warn!(
                notification_id = %notification.id,
                error = %e,
                "通知负载序列化失败，跳过实时推送"
            ),
        }

        debug!(notification_id = %notification.id, "通知已创建");
        Ok(notification)
    }

    /// 标记单条通知为已读
    ///
    /// 通知不存在、不属于该用户或已读时静默返回。
    #[instrument(skip(self))]
    pub async fn mark_read(&self, id: Uuid, user_id: &str) -> Result<()> {
        let Some(mut notification) = self.repo.find_by_id(id).await? else {
            debug!("通知不存在，忽略已读请求");
            return Ok(());
        };

        if !notification.is_owned_by(user_id) {
            debug!(owner = %notification.user_id, "通知不属于当前用户，忽略已读请求");
            return Ok(());
        }

        if !notification.mark_read(Utc::now()) {
            return Ok(());
        }

        if !self.repo.update(&notification).await? {
            debug!("通知已被其他请求标记为已读");
            return Ok(());
        }
        metrics::record_notifications_read(1);

        self.dispatch_to_user(
            user_id,
            ServerEvent::new(ServerEvent::NOTIFICATION_READ, Value::String(id.to_string())),
        );
        Ok(())
    }

    /// 将用户全部未读通知标记为已读，返回实际变更的条数
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let changed = self.repo.mark_all_read(user_id, Utc::now()).await?;
        metrics::record_notifications_read(changed);

        self.dispatch_to_user(
            user_id,
            ServerEvent::new(ServerEvent::ALL_NOTIFICATIONS_READ, Value::Null),
        );

        info!(changed, "全部通知已标记为已读");
        Ok(changed)
    }

    /// 分页查询用户通知（按创建时间倒序，页码从 1 开始）
    #[instrument(skip(self))]
    pub async fn list_by_user(
        &self,
        user_id: &str,
        page: i64,
        page_size: i64,
    ) -> Result<NotificationPage> {
        let request = PageRequest::new(page, page_size);
        let (items, total) = self.repo.find_paged_by_user(user_id, request).await?;
        Ok(NotificationPage::new(items, total, request))
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        self.repo.count_unread(user_id).await
    }

    /// 删除通知；不存在或不属于该用户时返回 `false` 且不做任何修改
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, user_id: &str) -> Result<bool> {
        match self.repo.find_by_id(id).await? {
            Some(notification) if notification.is_owned_by(user_id) => self.repo.delete(id).await,
            _ => Ok(false),
        }
    }

    /// 删除创建时间早于 `now - age` 的全部通知，不做归属检查
    #[instrument(skip(self))]
    pub async fn cleanup_older_than(&self, age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - age;
        let ids = self.repo.find_older_than(cutoff).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self.repo.bulk_delete(&ids).await?;
        metrics::record_notifications_cleaned(removed);
        info!(removed, %cutoff, "过期通知已清理");
        Ok(removed)
    }

    /// 按配置的保留期清理
    pub async fn cleanup_expired(&self) -> Result<u64> {
        self.cleanup_older_than(self.retention).await
    }

    /// 向文章房间广播事件
    pub fn broadcast_to_post(
        &self,
        post_id: Uuid,
        event_name: &str,
        payload: Value,
    ) -> DispatchReport {
        let group = GroupKey::post(post_id);
        match self
            .dispatcher
            .dispatch(&group, ServerEvent::new(event_name, payload))
        {
            Ok(report) => report,
            Err(e) => {
                warn!(group = %group, event = event_name, error = %e, "房间广播失败");
                DispatchReport::default()
            }
        }
    }

    // -----------------------------------------------------------------------
    // 事件辅助方法
    // -----------------------------------------------------------------------

    /// 文章被点赞
    #[instrument(skip(self))]
    pub async fn notify_post_liked(
        &self,
        post_id: Uuid,
        liker_id: &str,
        post_author_id: &str,
    ) -> Result<NotificationOutcome> {
        if liker_id == post_author_id {
            debug!("自己点赞自己的文章，不发送通知");
            return Ok(NotificationOutcome::skipped());
        }

        let Some((post, liker)) = self.resolve_post_and_actor(post_id, liker_id).await? else {
            return Ok(NotificationOutcome::skipped());
        };

        let title = texts::POST_LIKED_TITLE;
        let message = texts::post_liked(liker.name(), &post.title);

        let notification = self
            .create(
                NewNotification::new(post_author_id, title, &message, NotificationType::PostLiked)
                    .with_action_url(action_urls::post(&post.slug))
                    .with_actor(liker_id)
                    .with_post(post_id),
            )
            .await?;

        let integration = NotificationMessage::PostLiked(PostLikedMessage {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            user_id: post_author_id.to_string(),
            title: title.to_string(),
            message,
            post_id,
            post_title: post.title.clone(),
            post_slug: post.slug.clone(),
            post_author_id: post_author_id.to_string(),
            liker_user_id: liker_id.to_string(),
            liker_user_name: liker.name().to_string(),
        });

        Ok(NotificationOutcome {
            notifications: vec![notification],
            message_published: self.publish_quietly(integration).await,
        })
    }

    /// 文章收到新评论
    #[instrument(skip(self, comment_content))]
    pub async fn notify_new_comment(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
        commenter_id: &str,
        post_author_id: &str,
        comment_content: &str,
    ) -> Result<NotificationOutcome> {
        if commenter_id == post_author_id {
            debug!("评论自己的文章，不发送通知");
            return Ok(NotificationOutcome::skipped());
        }

        let Some((post, commenter)) = self.resolve_post_and_actor(post_id, commenter_id).await?
        else {
            return Ok(NotificationOutcome::skipped());
        };

        let title = texts::NEW_COMMENT_TITLE;
        let message = texts::new_comment(commenter.name(), &post.title);

        let notification = self
            .create(
                NewNotification::new(post_author_id, title, &message, NotificationType::NewComment)
                    .with_action_url(action_urls::comment(&post.slug, comment_id))
                    .with_actor(commenter_id)
                    .with_post(post_id)
                    .with_comment(comment_id),
            )
            .await?;

        let integration = NotificationMessage::NewComment(NewCommentMessage {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            user_id: post_author_id.to_string(),
            title: title.to_string(),
            message,
            post_id,
            comment_id,
            post_title: post.title.clone(),
            post_slug: post.slug.clone(),
            post_author_id: post_author_id.to_string(),
            commenter_user_id: commenter_id.to_string(),
            commenter_user_name: commenter.name().to_string(),
            comment_content: comment_content.to_string(),
        });

        Ok(NotificationOutcome {
            notifications: vec![notification],
            message_published: self.publish_quietly(integration).await,
        })
    }

    /// 新的关注者
    #[instrument(skip(self))]
    pub async fn notify_new_follower(
        &self,
        follower_id: &str,
        followed_user_id: &str,
    ) -> Result<NotificationOutcome> {
        if follower_id == followed_user_id {
            debug!("关注自己，不发送通知");
            return Ok(NotificationOutcome::skipped());
        }

        let Some(follower) = self.users.find_user(follower_id).await? else {
            warn!("关注者不存在，不发送通知");
            return Ok(NotificationOutcome::skipped());
        };

        let title = texts::NEW_FOLLOWER_TITLE;
        let message = texts::new_follower(follower.name());

        let notification = self
            .create(
                NewNotification::new(
                    followed_user_id,
                    title,
                    &message,
                    NotificationType::NewFollower,
                )
                .with_action_url(action_urls::user(&follower.username))
                .with_actor(follower_id),
            )
            .await?;

        let integration = NotificationMessage::NewFollower(NewFollowerMessage {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            user_id: followed_user_id.to_string(),
            title: title.to_string(),
            message,
            follower_id: follower_id.to_string(),
            follower_name: follower.name().to_string(),
            followed_user_id: followed_user_id.to_string(),
        });

        Ok(NotificationOutcome {
            notifications: vec![notification],
            message_published: self.publish_quietly(integration).await,
        })
    }

    /// 作者发布新文章，通知全部关注者
    ///
    /// 每个关注者一条通知，但只发布一条携带完整关注者列表的集成消息。
    #[instrument(skip(self))]
    pub async fn notify_post_published(
        &self,
        post_id: Uuid,
        author_id: &str,
    ) -> Result<NotificationOutcome> {
        let Some((post, author)) = self.resolve_post_and_actor(post_id, author_id).await? else {
            return Ok(NotificationOutcome::skipped());
        };

        let follower_ids: Vec<String> = self
            .users
            .follower_ids(author_id)
            .await?
            .into_iter()
            .filter(|id| id != author_id)
            .collect();

        if follower_ids.is_empty() {
            debug!("作者没有关注者，不发送通知");
            return Ok(NotificationOutcome::skipped());
        }

        let title = texts::POST_PUBLISHED_TITLE;
        let message = texts::post_published(author.name(), &post.title);
        let action_url = action_urls::post(&post.slug);

        let mut notifications = Vec::with_capacity(follower_ids.len());
        for follower_id in &follower_ids {
            let notification = self
                .create(
                    NewNotification::new(
                        follower_id.as_str(),
                        title,
                        &message,
                        NotificationType::PostPublished,
                    )
                    .with_action_url(&action_url)
                    .with_actor(author_id)
                    .with_post(post_id),
                )
                .await?;
            notifications.push(notification);
        }

        info!(followers = follower_ids.len(), "新文章通知已发送给关注者");

        let integration = NotificationMessage::PostPublished(PostPublishedMessage {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            user_id: author_id.to_string(),
            title: title.to_string(),
            message,
            post_id,
            post_title: post.title.clone(),
            post_slug: post.slug.clone(),
            author_id: author_id.to_string(),
            author_name: author.name().to_string(),
            post_excerpt: post.excerpt.clone(),
            follower_ids,
        });

        Ok(NotificationOutcome {
            notifications,
            message_published: self.publish_quietly(integration).await,
        })
    }

    // -----------------------------------------------------------------------
    // 内部方法
    // -----------------------------------------------------------------------

    async fn resolve_post_and_actor(
        &self,
        post_id: Uuid,
        actor_id: &str,
    ) -> Result<Option<(PostSummary, UserProfile)>> {
        let Some(post) = self.posts.find_post(post_id).await? else {
            warn!(%post_id, "文章不存在，不发送通知");
            return Ok(None);
        };

        let Some(actor) = self.users.find_user(actor_id).await? else {
            warn!(actor_id, "触发用户不存在，不发送通知");
            return Ok(None);
        };

        Ok(Some((post, actor)))
    }

    fn dispatch_to_user(&self, user_id: &str, event: ServerEvent) {
        let group = GroupKey::user(user_id);
        let event_name = event.event.clone();
        if let Err(e) = self.dispatcher.dispatch(&group, event) {
            warn!(group = %group, event = %event_name, error = %e, "实时推送失败");
        }
    }

    /// 发布集成消息，失败只记录日志
    async fn publish_quietly(&self, message: NotificationMessage) -> bool {
        let message = IntegrationMessage::Notification(message);
        match self.publisher.publish(&message).await {
            Ok(()) => {
                info!(message_id = %message.id(), kind = message.kind(), "集成消息已发布");
                true
            }
            Err(e) => {
                warn!(
                    message_id = %message.id(),
                    kind = message.kind(),
                    error = %e,
                    "集成消息发布失败，已创建的通知保留"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::publisher::MockMessagePublisher;
    use crate::realtime::MockRealtimeDispatcher;
    use crate::repository::{
        InMemoryNotificationRepository, MockNotificationRepositoryTrait, MockPostLookupTrait,
        MockUserDirectoryTrait,
    };
    use blog_shared::error::BlogError;

    fn quiet_dispatcher() -> MockRealtimeDispatcher {
        let mut dispatcher = MockRealtimeDispatcher::new();
        dispatcher
            .expect_dispatch()
            .returning(|_, _| Ok(DispatchReport::default()));
        dispatcher
    }

    fn service_with(
        repo: Arc<dyn NotificationRepositoryTrait>,
        users: MockUserDirectoryTrait,
        posts: MockPostLookupTrait,
        dispatcher: MockRealtimeDispatcher,
        publisher: MockMessagePublisher,
    ) -> NotificationService {
        NotificationService::new(
            repo,
            Arc::new(users),
            Arc::new(posts),
            Arc::new(dispatcher),
            Arc::new(publisher),
        )
    }

    fn profile(id: &str, name: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            username: name.to_string(),
            display_name: String::new(),
            email: format!("{name}@example.com"),
        }
    }

    #[tokio::test]
    async fn test_create_survives_dispatch_failure() {
        let mut dispatcher = MockRealtimeDispatcher::new();
        dispatcher.expect_dispatch().times(1).returning(|group, _| {
            Err(NotificationError::Dispatch {
                group: group.to_string(),
                message: "closed".into(),
            })
        });

        let repo = Arc::new(InMemoryNotificationRepository::new());
        let service = service_with(
            repo.clone(),
            MockUserDirectoryTrait::new(),
            MockPostLookupTrait::new(),
            dispatcher,
            MockMessagePublisher::new(),
        );

        let created = service
            .create(NewNotification::new("u1", "t", "m", NotificationType::NewLike))
            .await
            .unwrap();

        assert_eq!(repo.count(), 1);
        assert!(!created.is_read);
    }

    #[tokio::test]
    async fn test_create_propagates_store_failure_without_dispatch() {
        let mut repo = MockNotificationRepositoryTrait::new();
        repo.expect_insert()
            .returning(|_| Err(BlogError::Internal("disk full".into()).into()));

        let mut dispatcher = MockRealtimeDispatcher::new();
        dispatcher.expect_dispatch().never();

        let service = service_with(
            Arc::new(repo),
            MockUserDirectoryTrait::new(),
            MockPostLookupTrait::new(),
            dispatcher,
            MockMessagePublisher::new(),
        );

        let result = service
            .create(NewNotification::new("u1", "t", "m", NotificationType::NewLike))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_self_like_touches_no_collaborator() {
        let mut posts = MockPostLookupTrait::new();
        posts.expect_find_post().never();
        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().never();

        let repo = Arc::new(InMemoryNotificationRepository::new());
        let service = service_with(
            repo.clone(),
            MockUserDirectoryTrait::new(),
            posts,
            quiet_dispatcher(),
            publisher,
        );

        let outcome = service
            .notify_post_liked(Uuid::new_v4(), "x", "x")
            .await
            .unwrap();
        assert!(outcome.is_skipped());
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn test_missing_post_produces_nothing() {
        let mut posts = MockPostLookupTrait::new();
        posts.expect_find_post().returning(|_| Ok(None));
        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().never();

        let repo = Arc::new(InMemoryNotificationRepository::new());
        let service = service_with(
            repo.clone(),
            MockUserDirectoryTrait::new(),
            posts,
            quiet_dispatcher(),
            publisher,
        );

        let outcome = service
            .notify_new_comment(Uuid::new_v4(), Uuid::new_v4(), "y", "x", "nice")
            .await
            .unwrap();
        assert!(outcome.is_skipped());
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_notification() {
        let post_id = Uuid::new_v4();
        let mut posts = MockPostLookupTrait::new();
        posts.expect_find_post().returning(move |id| {
            Ok(Some(PostSummary {
                id,
                title: "Rust 入门".into(),
                slug: "rust-intro".into(),
                author_id: "x".into(),
                excerpt: String::new(),
            }))
        });
        let mut users = MockUserDirectoryTrait::new();
        users
            .expect_find_user()
            .returning(|id| Ok(Some(profile(id, "bob"))));

        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().times(1).returning(|m| {
            Err(NotificationError::Publish {
                message_id: m.id().to_string(),
                source: BlogError::Kafka("down".into()),
            })
        });

        let repo = Arc::new(InMemoryNotificationRepository::new());
        let service = service_with(repo.clone(), users, posts, quiet_dispatcher(), publisher);

        let outcome = service.notify_post_liked(post_id, "y", "x").await.unwrap();

        assert_eq!(outcome.notifications.len(), 1);
        assert!(!outcome.message_published);
        assert_eq!(repo.count(), 1);
        let stored = &repo.all()[0];
        assert_eq!(stored.message, "bob 赞了你的文章：Rust 入门");
        assert_eq!(stored.action_url.as_deref(), Some("/posts/rust-intro"));
    }

    #[tokio::test]
    async fn test_new_follower_builds_profile_link() {
        let mut users = MockUserDirectoryTrait::new();
        users
            .expect_find_user()
            .withf(|id| id == "f1")
            .returning(|id| Ok(Some(profile(id, "carol"))));

        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .withf(|m| m.kind() == "new_follower")
            .times(1)
            .returning(|_| Ok(()));

        let repo = Arc::new(InMemoryNotificationRepository::new());
        let service = service_with(
            repo.clone(),
            users,
            MockPostLookupTrait::new(),
            quiet_dispatcher(),
            publisher,
        );

        let outcome = service.notify_new_follower("f1", "u1").await.unwrap();
        assert!(outcome.message_published);

        let n = &outcome.notifications[0];
        assert_eq!(n.user_id, "u1");
        assert_eq!(n.notification_type, NotificationType::NewFollower);
        assert_eq!(n.action_url.as_deref(), Some("/users/carol"));
        assert_eq!(n.message, "carol 关注了你");
    }

    #[tokio::test]
    async fn test_self_follow_is_ignored() {
        let mut users = MockUserDirectoryTrait::new();
        users.expect_find_user().never();

        let service = service_with(
            Arc::new(InMemoryNotificationRepository::new()),
            users,
            MockPostLookupTrait::new(),
            quiet_dispatcher(),
            MockMessagePublisher::new(),
        );

        assert!(
            service
                .notify_new_follower("u1", "u1")
                .await
                .unwrap()
                .is_skipped()
        );
    }

    #[tokio::test]
    async fn test_mark_read_on_missing_notification_is_silent() {
        let mut dispatcher = MockRealtimeDispatcher::new();
        dispatcher.expect_dispatch().never();

        let service = service_with(
            Arc::new(InMemoryNotificationRepository::new()),
            MockUserDirectoryTrait::new(),
            MockPostLookupTrait::new(),
            dispatcher,
            MockMessagePublisher::new(),
        );

        service.mark_read(Uuid::new_v4(), "u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_read_lost_race_sends_no_event() {
        let existing = NewNotification::new("U", "t", "m", NotificationType::NewLike)
            .into_notification(Utc::now())
            .unwrap();
        let id = existing.id;

        let mut repo = MockNotificationRepositoryTrait::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(existing.clone())));
        // 另一请求已先完成状态转换
        repo.expect_update().times(1).returning(|_| Ok(false));
        let mut dispatcher = MockRealtimeDispatcher::new();
        dispatcher.expect_dispatch().never();

        let service = service_with(
            Arc::new(repo),
            MockUserDirectoryTrait::new(),
            MockPostLookupTrait::new(),
            dispatcher,
            MockMessagePublisher::new(),
        );

        service.mark_read(id, "U").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_checks_ownership() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let service = service_with(
            repo.clone(),
            MockUserDirectoryTrait::new(),
            MockPostLookupTrait::new(),
            quiet_dispatcher(),
            MockMessagePublisher::new(),
        );

        let n = service
            .create(NewNotification::new("owner", "t", "m", NotificationType::NewLike))
            .await
            .unwrap();

        assert!(!service.delete(n.id, "intruder").await.unwrap());
        assert_eq!(repo.count(), 1);
        assert!(service.delete(n.id, "owner").await.unwrap());
        assert!(!service.delete(n.id, "owner").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_user_clamps_page_size() {
        let service = service_with(
            Arc::new(InMemoryNotificationRepository::new()),
            MockUserDirectoryTrait::new(),
            MockPostLookupTrait::new(),
            quiet_dispatcher(),
            MockMessagePublisher::new(),
        );

        let page = service.list_by_user("u1", 0, 1000).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 100);
        assert_eq!(page.total_pages, 0);
    }
}
