//! 共享库
//!
//! 包含所有服务共用的配置、错误处理、数据库连接、消息代理、集成消息模型与可观测性等基础设施代码。

pub mod broker;
pub mod config;
pub mod database;
pub mod dlq;
pub mod error;
pub mod events;
pub mod kafka;
pub mod observability;
pub mod retry;
pub mod shutdown;
