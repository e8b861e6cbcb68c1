//! 实时推送层
//!
//! - `registry`: 连接与分组的订阅关系
//! - `dispatcher`: 按分组投递事件
//! - `gateway`: 与传输无关的客户端会话
//! - `ws`: axum WebSocket 传输

mod dispatcher;
mod gateway;
mod registry;
pub mod ws;

pub use dispatcher::RealtimeDispatcher;
#[cfg(test)]
pub use dispatcher::MockRealtimeDispatcher;
pub use gateway::{ClientCommand, ClientSession, RealtimeGateway};
pub use registry::{
    ConnectionGuard, ConnectionId, DEFAULT_BUFFER, DispatchReport, GroupKey, ServerEvent,
    SubscriptionRegistry,
};
