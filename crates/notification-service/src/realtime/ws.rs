//! WebSocket 传输
//!
//! 路由 `/ws/notifications`。调用方身份由上游认证层通过 `x-user-id` 请求头提供，
//! 缺失时连接仍可加入房间，但不能执行已读操作。

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::gateway::RealtimeGateway;

/// 身份请求头
pub const USER_ID_HEADER: &str = "x-user-id";

/// 实时推送路由（含 `/health`）
pub fn router(gateway: Arc<RealtimeGateway>) -> Router {
    Router::new()
        .route("/ws/notifications", get(ws_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(gateway)
}

fn user_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(gateway): State<Arc<RealtimeGateway>>,
    headers: HeaderMap,
) -> Response {
    let user_id = user_id_from_headers(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, user_id))
}

async fn handle_socket(socket: WebSocket, gateway: Arc<RealtimeGateway>, user_id: Option<String>) {
    let Some((session, mut outbound)) = gateway.connect(user_id) else {
        debug!("注册表已关闭，拒绝新连接");
        return;
    };
    let connection_id = session.connection_id();
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "事件序列化失败");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        // 注册表关闭或连接移除后出站队列结束，主动关闭 socket
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => session.handle_text(text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%connection_id, error = %e, "WebSocket 读取出错");
                        break;
                    }
                }
            }
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    // session 在此处被丢弃，连接退出所有分组
    drop(session);
}
