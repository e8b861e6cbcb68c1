//! 用户目录与文章查询（PostgreSQL）
//!
//! 只读访问用户、关注关系与文章表，这些表由各自的业务域维护。

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::traits::{PostLookupTrait, UserDirectoryTrait};
use crate::error::Result;
use crate::models::{PostSummary, UserProfile};

/// 用户目录
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectoryTrait for PgUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, COALESCE(display_name, '') AS display_name, email
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserProfile {
            id: r.get("id"),
            username: r.get("username"),
            display_name: r.get("display_name"),
            email: r.get("email"),
        }))
    }

    async fn follower_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT follower_id
            FROM user_follows
            WHERE following_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

/// 文章查询
pub struct PgPostLookup {
    pool: PgPool,
}

impl PgPostLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostLookupTrait for PgPostLookup {
    async fn find_post(&self, post_id: Uuid) -> Result<Option<PostSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, slug, author_id, COALESCE(excerpt, '') AS excerpt
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PostSummary {
            id: r.get("id"),
            title: r.get("title"),
            slug: r.get("slug"),
            author_id: r.get("author_id"),
            excerpt: r.get("excerpt"),
        }))
    }
}
