//! 数据访问层
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - PostgreSQL 实现使用 SQLx；内存实现用于测试与本地运行
//! - 定义 trait 接口以支持 mock 测试

mod memory;
mod notification_repo;
mod traits;
mod user_directory;

pub use memory::{InMemoryNotificationRepository, InMemoryPostLookup, InMemoryUserDirectory};
pub use notification_repo::NotificationRepository;
pub use traits::*;
pub use user_directory::{PgPostLookup, PgUserDirectory};
