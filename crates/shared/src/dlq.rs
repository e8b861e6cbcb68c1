//! 死信队列
//!
//! 消费者处理某条消息失败后，原始负载连同失败原因一起写入死信队列（DLQ），
//! 写入成功后原消息才会被确认。死信留待人工排查或离线重放，不会阻塞消费循环。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::broker::{BrokerProducer, ConsumerMessage};
use crate::error::{BlogError, Result};
use crate::kafka::topics;
use crate::retry::{RetryPolicy, retry_transient};

// ---------------------------------------------------------------------------
// DeadLetterMessage: 死信消息信封
// ---------------------------------------------------------------------------

/// 死信消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// 原始消息 ID（即 record key）
    pub message_id: String,
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    /// 原始负载；非 UTF-8 内容按有损方式转换
    pub payload: String,
    pub error: String,
    pub source_service: String,
    pub failed_at: DateTime<Utc>,
    /// 原始消息进入代理的时间（毫秒时间戳）
    pub original_timestamp: Option<i64>,
}

impl DeadLetterMessage {
    pub fn from_consumed(
        message: &ConsumerMessage,
        error: impl Into<String>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message.log_id(),
            source_topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
            error: error.into(),
            source_service: source_service.into(),
            failed_at: Utc::now(),
            original_timestamp: message.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// DeadLetterSink: 将失败消息写入死信队列
// ---------------------------------------------------------------------------

/// 死信写入端
///
/// 代理的瞬时故障按短退避重试几次；仍然失败时把错误交还给调用方，
/// 调用方不得确认原消息。
#[derive(Clone)]
pub struct DeadLetterSink {
    producer: Arc<dyn BrokerProducer>,
    source_service: String,
    retry_policy: RetryPolicy,
}

impl DeadLetterSink {
    pub fn new(producer: Arc<dyn BrokerProducer>, source_service: impl Into<String>) -> Self {
        Self {
            producer,
            source_service: source_service.into(),
            retry_policy: RetryPolicy::new(
                2,
                std::time::Duration::from_millis(200),
                std::time::Duration::from_secs(2),
            ),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// 将处理失败的消息写入死信队列
    pub async fn send(&self, message: &ConsumerMessage, error: &str) -> Result<()> {
        let letter = DeadLetterMessage::from_consumed(message, error, &self.source_service);
        let payload = serde_json::to_vec(&letter)
            .map_err(|e| BlogError::Serialization(format!("序列化死信失败: {e}")))?;

        retry_transient(&self.retry_policy, "dead_letter_send", || {
            self.producer
                .send(topics::DEAD_LETTER_QUEUE, &letter.message_id, &payload)
        })
        .await?;

        warn!(
            message_id = %letter.message_id,
            source_topic = %letter.source_topic,
            error,
            "消息已发送到死信队列"
        );
        Ok(())
    }
}
