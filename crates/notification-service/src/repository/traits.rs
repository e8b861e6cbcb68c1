//! 仓储 Trait 定义
//!
//! 服务层依赖这些抽象而非具体实现，生产环境使用 PostgreSQL，测试使用内存实现或 mock

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Notification, PageRequest, PostSummary, UserProfile};

/// 通知仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepositoryTrait: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>>;

    /// 按创建时间倒序分页查询，返回当前页数据与总数
    async fn find_paged_by_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<Notification>, i64)>;

    async fn count_unread(&self, user_id: &str) -> Result<i64>;

    /// 写入已读状态，只对仍属于同一用户且未读的记录生效
    ///
    /// 返回是否发生了变更；同一条通知的并发已读请求只有一个得到 `true`。
    async fn update(&self, notification: &Notification) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// 查询创建时间早于 `cutoff` 的通知 ID
    async fn find_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>>;
    async fn bulk_delete(&self, ids: &[Uuid]) -> Result<u64>;

    /// 将用户全部未读通知置为已读，返回实际变更的行数
    async fn mark_all_read(&self, user_id: &str, read_at: DateTime<Utc>) -> Result<u64>;
}

/// 用户目录接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectoryTrait: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>>;
    async fn follower_ids(&self, user_id: &str) -> Result<Vec<String>>;
}

/// 文章查询接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostLookupTrait: Send + Sync {
    async fn find_post(&self, post_id: Uuid) -> Result<Option<PostSummary>>;
}
