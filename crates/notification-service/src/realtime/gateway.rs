//! 实时网关
//!
//! 与传输层无关的会话逻辑：连接时自动加入用户分组，处理客户端的加入/离开房间与已读命令。
//! 传输层（WebSocket）只负责收发帧。

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use blog_shared::error::BlogError;

use super::registry::{ConnectionGuard, GroupKey, ServerEvent, SubscriptionRegistry};
use crate::error::{NotificationError, Result};
use crate::service::NotificationService;

/// 客户端命令帧
///
/// 文章 ID 必须是 UUID，解析后统一为小写连字符形式，与服务端广播使用的分组名一致。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    JoinRoom { post_id: Uuid },
    LeaveRoom { post_id: Uuid },
    MarkRead { notification_id: Uuid },
}

/// 实时网关
pub struct RealtimeGateway {
    registry: Arc<SubscriptionRegistry>,
    service: Arc<NotificationService>,
}

impl RealtimeGateway {
    pub fn new(registry: Arc<SubscriptionRegistry>, service: Arc<NotificationService>) -> Self {
        Self { registry, service }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// 建立会话；注册表已关闭时返回 `None`
    pub fn connect(
        &self,
        user_id: Option<String>,
    ) -> Option<(ClientSession, mpsc::Receiver<ServerEvent>)> {
        let (guard, receiver) = self.registry.register(user_id)?;
        let session = ClientSession {
            guard,
            service: Arc::clone(&self.service),
        };
        Some((session, receiver))
    }
}

/// 单个客户端会话
///
/// 会话被丢弃时连接自动退出所有分组。
pub struct ClientSession {
    guard: ConnectionGuard,
    service: Arc<NotificationService>,
}

impl ClientSession {
    pub fn connection_id(&self) -> Uuid {
        self.guard.id()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.guard.user_id()
    }

    /// 处理一条文本帧；无法解析的帧记录日志后忽略
    pub async fn handle_text(&self, text: &str) {
        let command = match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => command,
            Err(e) => {
                warn!(connection_id = %self.connection_id(), error = %e, "无法解析的客户端帧，已忽略");
                return;
            }
        };

        if let Err(e) = self.handle(command).await {
            warn!(connection_id = %self.connection_id(), error = %e, "客户端命令处理失败");
        }
    }

    pub async fn handle(&self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::JoinRoom { post_id } => {
                self.guard.join(GroupKey::post(post_id));
                debug!(connection_id = %self.connection_id(), %post_id, "加入文章房间");
                Ok(())
            }
            ClientCommand::LeaveRoom { post_id } => {
                self.guard.leave(&GroupKey::post(post_id));
                debug!(connection_id = %self.connection_id(), %post_id, "离开文章房间");
                Ok(())
            }
            ClientCommand::MarkRead { notification_id } => {
                let Some(user_id) = self.user_id() else {
                    return Err(NotificationError::Shared(BlogError::Unauthorized));
                };
                self.service.mark_read(notification_id, user_id).await
            }
        }
    }
}
