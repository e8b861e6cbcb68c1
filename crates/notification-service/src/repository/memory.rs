//! 内存仓储
//!
//! 使用 DashMap 实现的仓储，用于测试和本地运行（无数据库时）。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::traits::{NotificationRepositoryTrait, PostLookupTrait, UserDirectoryTrait};
use crate::error::Result;
use crate::models::{Notification, PageRequest, PostSummary, UserProfile};

// ---------------------------------------------------------------------------
// 通知
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationRepository {
    data: Arc<DashMap<Uuid, Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一条记录，测试中用于构造任意创建时间的数据
    pub fn seed(&self, notification: Notification) {
        self.data.insert(notification.id, notification);
    }

    /// 全部记录的快照
    pub fn all(&self) -> Vec<Notification> {
        self.data.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }
}

#[async_trait]
impl NotificationRepositoryTrait for InMemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.data.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.data.get(&id).map(|v| v.clone()))
    }

    async fn find_paged_by_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<Notification>, i64)> {
        let mut items: Vec<Notification> = self
            .data
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = items.len() as i64;
        let page_items = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok((page_items, total))
    }

    async fn count_unread(&self, user_id: &str) -> Result<i64> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.user_id == user_id && !entry.is_read)
            .count() as i64)
    }

    async fn update(&self, notification: &Notification) -> Result<bool> {
        // get_mut 持有分片写锁，检查与写入不会交错
        let Some(mut stored) = self.data.get_mut(&notification.id) else {
            return Ok(false);
        };
        if stored.user_id != notification.user_id || stored.is_read || !notification.is_read {
            return Ok(false);
        }
        stored.is_read = true;
        stored.read_at = notification.read_at;
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.data.remove(&id).is_some())
    }

    async fn find_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.created_at < cutoff)
            .map(|entry| *entry.key())
            .collect())
    }

    async fn bulk_delete(&self, ids: &[Uuid]) -> Result<u64> {
        let mut removed = 0;
        for id in ids {
            if self.data.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn mark_all_read(&self, user_id: &str, read_at: DateTime<Utc>) -> Result<u64> {
        let mut changed = 0;
        for mut entry in self.data.iter_mut() {
            if entry.user_id == user_id && entry.mark_read(read_at) {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// 用户目录 / 文章
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<DashMap<String, UserProfile>>,
    /// 被关注者 -> 关注者列表（按关注顺序）
    followers: Arc<DashMap<String, Vec<String>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, profile: UserProfile) {
        self.users.insert(profile.id.clone(), profile);
    }

    pub fn add_follower(&self, user_id: &str, follower_id: &str) {
        let mut followers = self.followers.entry(user_id.to_string()).or_default();
        if !followers.iter().any(|f| f == follower_id) {
            followers.push(follower_id.to_string());
        }
    }
}

#[async_trait]
impl UserDirectoryTrait for InMemoryUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|v| v.clone()))
    }

    async fn follower_ids(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .followers
            .get(user_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPostLookup {
    posts: Arc<DashMap<Uuid, PostSummary>>,
}

impl InMemoryPostLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&self, post: PostSummary) {
        self.posts.insert(post.id, post);
    }
}

#[async_trait]
impl PostLookupTrait for InMemoryPostLookup {
    async fn find_post(&self, post_id: Uuid) -> Result<Option<PostSummary>> {
        Ok(self.posts.get(&post_id).map(|v| v.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewNotification, NotificationType};

    fn notification_at(user_id: &str, created_at: DateTime<Utc>) -> Notification {
        let mut n = NewNotification::new(user_id, "t", "m", NotificationType::NewLike)
            .into_notification(created_at)
            .unwrap();
        n.created_at = created_at;
        n
    }

    #[tokio::test]
    async fn test_paged_query_is_newest_first_and_user_scoped() {
        let repo = InMemoryNotificationRepository::new();
        let now = Utc::now();
        for minutes in [30, 10, 20] {
            repo.seed(notification_at("u1", now - chrono::Duration::minutes(minutes)));
        }
        repo.seed(notification_at("u2", now));

        let (items, total) = repo
            .find_paged_by_user("u1", PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 2);
        assert!(items[0].created_at > items[1].created_at);
        assert!(items.iter().all(|n| n.user_id == "u1"));

        let (second, _) = repo
            .find_paged_by_user("u1", PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_update_only_moves_unread_to_read() {
        let repo = InMemoryNotificationRepository::new();
        let mut n = notification_at("u1", Utc::now());
        repo.seed(n.clone());

        n.mark_read(Utc::now());
        let mut foreign = n.clone();
        foreign.user_id = "u2".to_string();
        assert!(!repo.update(&foreign).await.unwrap());

        assert!(repo.update(&n).await.unwrap());
        let first_read_at = repo.find_by_id(n.id).await.unwrap().unwrap().read_at;

        n.read_at = Some(Utc::now() + chrono::Duration::minutes(1));
        assert!(!repo.update(&n).await.unwrap());
        assert_eq!(repo.find_by_id(n.id).await.unwrap().unwrap().read_at, first_read_at);
    }

    #[tokio::test]
    async fn test_bulk_delete_counts_only_existing() {
        let repo = InMemoryNotificationRepository::new();
        let n = notification_at("u1", Utc::now());
        let id = n.id;
        repo.seed(n);

        let removed = repo.bulk_delete(&[id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.count(), 0);
    }

    #[tokio::test]
    async fn test_follower_list_keeps_order_and_ignores_duplicates() {
        let directory = InMemoryUserDirectory::new();
        directory.add_follower("a", "f1");
        directory.add_follower("a", "f2");
        directory.add_follower("a", "f1");

        assert_eq!(directory.follower_ids("a").await.unwrap(), vec!["f1", "f2"]);
        assert!(directory.follower_ids("nobody").await.unwrap().is_empty());
    }
}
