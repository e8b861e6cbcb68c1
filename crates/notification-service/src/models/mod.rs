//! 领域模型

mod notification;

pub use notification::*;

/// 用户的展示信息，由用户目录提供
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: String,
}

impl UserProfile {
    /// 优先使用展示名，为空时退化为用户名
    pub fn name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

/// 文章的摘要信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub id: uuid::Uuid,
    pub title: String,
    pub slug: String,
    pub author_id: String,
    pub excerpt: String,
}
