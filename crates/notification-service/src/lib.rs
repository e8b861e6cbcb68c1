//! 博客通知服务
//!
//! 从业务事件（点赞、评论、关注、发布）到用户通知的完整链路。
//!
//! ## 核心功能
//!
//! - **通知持久化**：创建、分页查询、未读计数、已读、删除、过期清理
//! - **实时推送**：按 `user:<id>` / `post:<id>` 分组向在线连接推送事件
//! - **集成消息**：将业务事件发布到消息代理，由后台消费者处理邮件等副作用
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `repository`: 数据访问层
//! - `realtime`: 订阅注册表、实时投递与 WebSocket 网关
//! - `publisher`: 集成消息发布
//! - `service`: 通知业务服务

pub mod error;
pub mod models;
pub mod publisher;
pub mod realtime;
pub mod repository;
pub mod service;

pub use error::{NotificationError, Result};
pub use models::*;
pub use publisher::{BrokerMessagePublisher, MessagePublisher};
pub use realtime::{RealtimeDispatcher, RealtimeGateway, SubscriptionRegistry};
pub use repository::{
    InMemoryNotificationRepository, InMemoryPostLookup, InMemoryUserDirectory,
    NotificationRepository, NotificationRepositoryTrait, PgPostLookup, PgUserDirectory,
    PostLookupTrait, UserDirectoryTrait,
};
pub use service::{NotificationOutcome, NotificationService};
