//! 通知仓储（PostgreSQL）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::NotificationRepositoryTrait;
use crate::error::Result;
use crate::models::{Notification, PageRequest};

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, actor_id, title, message, notification_type, action_url,
           action_data, post_id, comment_id, is_read, read_at, created_at
    FROM notifications
"#;

/// 通知仓储
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepositoryTrait for NotificationRepository {
    async fn insert(&self, n: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, actor_id, title, message, notification_type,
                                       action_url, action_data, post_id, comment_id, is_read,
                                       read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(n.id)
        .bind(&n.user_id)
        .bind(&n.actor_id)
        .bind(&n.title)
        .bind(&n.message)
        .bind(n.notification_type)
        .bind(&n.action_url)
        .bind(&n.action_data)
        .bind(n.post_id)
        .bind(n.comment_id)
        .bind(n.is_read)
        .bind(n.read_at)
        .bind(n.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        let notification = sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(notification)
    }

    async fn find_paged_by_user(
        &self,
        user_id: &str,
        page: PageRequest,
    ) -> Result<(Vec<Notification>, i64)> {
        // id 作为次级排序键，保证同一时刻创建的通知分页稳定
        let sql = format!(
            "{SELECT_COLUMNS} WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let items = sqlx::query_as::<_, Notification>(&sql)
            .bind(user_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((items, total))
    }

    async fn count_unread(&self, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// 仅已读状态允许修改，且只能由未读变为已读
    async fn update(&self, n: &Notification) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET is_read = $2, read_at = $3
            WHERE id = $1 AND user_id = $4 AND is_read = FALSE AND $2 = TRUE
            "#,
        )
        .bind(n.id)
        .bind(n.is_read)
        .bind(n.read_at)
        .bind(&n.user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM notifications WHERE created_at < $1")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    async fn bulk_delete(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM notifications WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn mark_all_read(&self, user_id: &str, read_at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
