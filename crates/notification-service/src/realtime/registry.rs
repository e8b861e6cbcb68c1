//! 订阅注册表
//!
//! 记录每个实时连接加入了哪些分组，并为每个连接持有一个有界的出站队列。
//! 注册表在进程启动时创建并以 `Arc` 注入各组件，进程退出时调用 [`SubscriptionRegistry::shutdown`]
//! 断开全部连接。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use blog_shared::observability::metrics;

/// 连接 ID
pub type ConnectionId = Uuid;

/// 默认的出站队列容量
pub const DEFAULT_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// 分组与事件
// ---------------------------------------------------------------------------

/// 分组键：`user:<id>` 或 `post:<id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn user(user_id: &str) -> Self {
        Self(format!("user:{user_id}"))
    }

    pub fn post(post_id: impl fmt::Display) -> Self {
        Self(format!("post:{post_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 推送给客户端的事件帧：`{"event": <名称>, "payload": <数据>}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

impl ServerEvent {
    pub const NEW_NOTIFICATION: &'static str = "NewNotification";
    pub const NOTIFICATION_READ: &'static str = "NotificationRead";
    pub const ALL_NOTIFICATIONS_READ: &'static str = "AllNotificationsRead";

    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// 一次分组投递的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// 队列已满或连接已关闭而被丢弃的投递
    pub dropped: usize,
}

// ---------------------------------------------------------------------------
// SubscriptionRegistry
// ---------------------------------------------------------------------------

struct ConnectionEntry {
    user_id: Option<String>,
    groups: HashSet<GroupKey>,
    sender: mpsc::Sender<ServerEvent>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    groups: HashMap<GroupKey, HashSet<ConnectionId>>,
    closed: bool,
}

impl RegistryState {
    fn add_member(&mut self, id: ConnectionId, group: GroupKey) -> bool {
        let Some(entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if entry.groups.insert(group.clone()) {
            self.groups.entry(group).or_default().insert(id);
        }
        true
    }

    fn remove_member(&mut self, id: ConnectionId, group: &GroupKey) {
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&id);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
    }
}

/// 订阅注册表
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    buffer: usize,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl SubscriptionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            buffer: buffer.max(1),
        }
    }

    /// 注册新连接
    ///
    /// 已认证的连接自动加入 `user:<id>` 分组。返回的 [`ConnectionGuard`] 被丢弃时连接即被移除，
    /// 无论连接任务是正常结束、panic 还是被取消。注册表关闭后返回 `None`。
    pub fn register(
        self: &Arc<Self>,
        user_id: Option<String>,
    ) -> Option<(ConnectionGuard, mpsc::Receiver<ServerEvent>)> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        let total = {
            let mut state = self.state.write();
            if state.closed {
                return None;
            }
            state.connections.insert(
                id,
                ConnectionEntry {
                    user_id: user_id.clone(),
                    groups: HashSet::new(),
                    sender,
                },
            );
            if let Some(uid) = &user_id {
                state.add_member(id, GroupKey::user(uid));
            }
            state.connections.len()
        };

        metrics::set_realtime_connections(total);
        info!(connection_id = %id, user_id = ?user_id, "实时连接已建立");

        let guard = ConnectionGuard {
            registry: Arc::clone(self),
            id,
            user_id,
        };
        Some((guard, receiver))
    }

    /// 加入分组（幂等）；连接不存在时返回 `false`
    pub fn join(&self, id: ConnectionId, group: GroupKey) -> bool {
        let joined = self.state.write().add_member(id, group.clone());
        if joined {
            debug!(connection_id = %id, group = %group, "加入分组");
        }
        joined
    }

    /// 离开分组（幂等）
    pub fn leave(&self, id: ConnectionId, group: &GroupKey) {
        let mut state = self.state.write();
        let removed = state
            .connections
            .get_mut(&id)
            .is_some_and(|entry| entry.groups.remove(group));
        if removed {
            state.remove_member(id, group);
            debug!(connection_id = %id, group = %group, "离开分组");
        }
    }

    /// 移除连接并退出其所在的全部分组
    pub fn disconnect(&self, id: ConnectionId) {
        let total = {
            let mut state = self.state.write();
            let Some(entry) = state.connections.remove(&id) else {
                return;
            };
            for group in &entry.groups {
                state.remove_member(id, group);
            }
            state.connections.len()
        };

        metrics::set_realtime_connections(total);
        info!(connection_id = %id, "实时连接已断开");
    }

    /// 向分组内的每个连接投递事件
    ///
    /// 使用 `try_send`，不会因慢连接阻塞调用方；空分组直接返回。
    /// 注册表已关闭时返回 `None`。
    pub fn send_to_group(&self, group: &GroupKey, event: &ServerEvent) -> Option<DispatchReport> {
        let state = self.state.read();
        if state.closed {
            return None;
        }

        let mut report = DispatchReport::default();
        let Some(members) = state.groups.get(group) else {
            return Some(report);
        };

        for id in members {
            let Some(entry) = state.connections.get(id) else {
                continue;
            };
            match entry.sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.dropped += 1,
            }
        }
        Some(report)
    }

    /// 分组内的连接数
    pub fn member_count(&self, group: &GroupKey) -> usize {
        self.state.read().groups.get(group).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    /// 连接所属用户
    pub fn user_of(&self, id: ConnectionId) -> Option<String> {
        self.state
            .read()
            .connections
            .get(&id)
            .and_then(|entry| entry.user_id.clone())
    }

    /// 关闭注册表：丢弃全部连接的发送端，客户端的出站流随之结束
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.state.write();
            state.closed = true;
            state.groups.clear();
            let count = state.connections.len();
            state.connections.clear();
            count
        };

        metrics::set_realtime_connections(0);
        info!(connections = dropped, "订阅注册表已关闭");
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }
}

// ---------------------------------------------------------------------------
// ConnectionGuard
// ---------------------------------------------------------------------------

/// 连接守卫，Drop 时从注册表中移除连接
pub struct ConnectionGuard {
    registry: Arc<SubscriptionRegistry>,
    id: ConnectionId,
    user_id: Option<String>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn join(&self, group: GroupKey) -> bool {
        self.registry.join(self.id, group)
    }

    pub fn leave(&self, group: &GroupKey) {
        self.registry.leave(self.id, group)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}
