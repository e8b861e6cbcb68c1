//! 消息代理抽象
//!
//! 将"发送一条消息"与"拉取一批消息"抽象为两个 trait，
//! 业务代码只依赖这两个接缝，生产环境由 Kafka 实现，测试与本地运行使用内存代理。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::error::{BlogError, Result};

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的消息的统一表示
///
/// 拥有全部字段的所有权，可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| BlogError::Serialization(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| BlogError::Serialization(format!("负载反序列化失败: {e}")))
    }

    /// 用于日志的消息标识：优先使用 key（即业务消息 ID），否则退化为位置信息
    pub fn log_id(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("{}/{}/{}", self.topic, self.partition, self.offset),
        }
    }
}

// ---------------------------------------------------------------------------
// 发送与拉取接缝
// ---------------------------------------------------------------------------

/// 原始消息发送接口
///
/// 每次调用都是一次独立的发送尝试，实现方不得在内部缓冲消息。
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()>;
}

/// 消息拉取接口
///
/// 消费循环按固定间隔调用 `poll` 取走当前可用的消息，处理完成后逐条 `ack`。
/// 无法安全确认的消息通过 `rewind` 交还，下一次 `poll` 重新取到。
#[async_trait]
pub trait MessageSource: Send {
    /// 拉取当前可用的消息，最多 `max_messages` 条；没有消息时返回空列表
    async fn poll(&mut self, max_messages: usize) -> Result<Vec<ConsumerMessage>>;

    /// 确认消息已处理完毕
    fn ack(&mut self, message: &ConsumerMessage) -> Result<()>;

    /// 放弃本批中尚未确认的消息，使其从最早的一条开始重新投递
    fn rewind(&mut self, unacked: &[ConsumerMessage]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// InMemoryBroker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TopicState {
    pending: VecDeque<ConsumerMessage>,
    history: Vec<ConsumerMessage>,
    next_offset: i64,
}

/// 进程内消息代理
///
/// 每个 topic 一条队列，`source` 返回的拉取端从队列头部取走消息。
/// 同时保留完整的发送历史，便于测试断言发布了哪些消息。
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建指定 topic 的拉取端
    pub fn source(&self, topic: &str) -> InMemorySource {
        InMemorySource {
            broker: self.clone(),
            topic: topic.to_string(),
            acked: Vec::new(),
        }
    }

    /// 指定 topic 上曾经发送过的全部消息
    pub fn history(&self, topic: &str) -> Vec<ConsumerMessage> {
        self.topics
            .lock()
            .get(topic)
            .map(|state| state.history.clone())
            .unwrap_or_default()
    }

    /// 指定 topic 上尚未被拉取的消息数
    pub fn pending(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|state| state.pending.len())
            .unwrap_or(0)
    }

    /// 将消息重新放回队列，模拟代理的重复投递
    pub fn redeliver(&self, message: ConsumerMessage) {
        let mut topics = self.topics.lock();
        let state = topics.entry(message.topic.clone()).or_default();
        state.pending.push_back(message);
    }

    fn requeue_front(&self, topic: &str, messages: &[ConsumerMessage]) {
        let mut topics = self.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();
        for message in messages.iter().rev() {
            state.pending.push_front(message.clone());
        }
    }

    fn take(&self, topic: &str, max_messages: usize) -> Vec<ConsumerMessage> {
        let mut topics = self.topics.lock();
        let Some(state) = topics.get_mut(topic) else {
            return Vec::new();
        };
        let count = max_messages.min(state.pending.len());
        state.pending.drain(..count).collect()
    }
}

#[async_trait]
impl BrokerProducer for InMemoryBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let mut topics = self.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();

        let message = ConsumerMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: state.next_offset,
            key: Some(key.to_string()),
            payload: payload.to_vec(),
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            headers: HashMap::new(),
        };
        state.next_offset += 1;
        state.history.push(message.clone());
        state.pending.push_back(message);
        Ok(())
    }
}

/// 内存代理的拉取端
pub struct InMemorySource {
    broker: InMemoryBroker,
    topic: String,
    acked: Vec<i64>,
}

impl InMemorySource {
    /// 已确认的 offset 列表（按确认顺序）
    pub fn acked_offsets(&self) -> &[i64] {
        &self.acked
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn poll(&mut self, max_messages: usize) -> Result<Vec<ConsumerMessage>> {
        Ok(self.broker.take(&self.topic, max_messages))
    }

    fn ack(&mut self, message: &ConsumerMessage) -> Result<()> {
        self.acked.push(message.offset);
        Ok(())
    }

    fn rewind(&mut self, unacked: &[ConsumerMessage]) -> Result<()> {
        self.broker.requeue_front(&self.topic, unacked);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &[u8], key: Option<&str>) -> ConsumerMessage {
        ConsumerMessage {
            topic: "events".to_string(),
            partition: 1,
            offset: 100,
            key: key.map(String::from),
            payload: payload.to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    #[test]
    fn test_consumer_message_deserialize() {
        #[derive(Debug, serde::Deserialize, PartialEq)]
        struct Event {
            user_id: String,
            action: String,
        }

        let msg = message(br#"{"user_id":"u-001","action":"like"}"#, None);
        let event: Event = msg.deserialize_payload().unwrap();
        assert_eq!(
            event,
            Event {
                user_id: "u-001".to_string(),
                action: "like".to_string(),
            }
        );
    }

    #[test]
    fn test_consumer_message_deserialize_invalid_json() {
        let msg = message(b"not json", None);
        let result: Result<serde_json::Value> = msg.deserialize_payload();
        assert!(result.is_err());
    }

    #[test]
    fn test_consumer_message_payload_str() {
        assert_eq!(message(b"hello world", None).payload_str().unwrap(), "hello world");
        assert!(message(&[0xFF, 0xFE], None).payload_str().is_err());
    }

    #[test]
    fn test_log_id_prefers_key() {
        assert_eq!(message(b"", Some("msg-1")).log_id(), "msg-1");
        assert_eq!(message(b"", None).log_id(), "events/1/100");
    }

    #[tokio::test]
    async fn test_in_memory_broker_send_and_poll() {
        let broker = InMemoryBroker::new();
        broker.send("topic-a", "k1", b"one").await.unwrap();
        broker.send("topic-a", "k2", b"two").await.unwrap();
        broker.send("topic-b", "k3", b"three").await.unwrap();

        let mut source = broker.source("topic-a");
        let first = source.poll(1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].key.as_deref(), Some("k1"));
        assert_eq!(first[0].offset, 0);

        let rest = source.poll(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].offset, 1);

        assert!(source.poll(10).await.unwrap().is_empty());
        assert_eq!(broker.pending("topic-b"), 1);
        assert_eq!(broker.history("topic-a").len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_source_records_acks() {
        let broker = InMemoryBroker::new();
        broker.send("topic-a", "k1", b"one").await.unwrap();

        let mut source = broker.source("topic-a");
        let batch = source.poll(10).await.unwrap();
        source.ack(&batch[0]).unwrap();
        assert_eq!(source.acked_offsets(), &[0]);
    }

    #[tokio::test]
    async fn test_rewind_returns_messages_ahead_of_newer_ones() {
        let broker = InMemoryBroker::new();
        for key in ["k0", "k1", "k2"] {
            broker.send("topic-a", key, b"x").await.unwrap();
        }

        let mut source = broker.source("topic-a");
        let batch = source.poll(2).await.unwrap();
        source.ack(&batch[0]).unwrap();
        source.rewind(&batch[1..]).unwrap();

        let offsets: Vec<i64> = source
            .poll(10)
            .await
            .unwrap()
            .iter()
            .map(|m| m.offset)
            .collect();
        assert_eq!(offsets, vec![1, 2]);
        assert_eq!(source.acked_offsets(), &[0]);
    }

    #[tokio::test]
    async fn test_redeliver_puts_message_back() {
        let broker = InMemoryBroker::new();
        broker.send("topic-a", "k1", b"one").await.unwrap();

        let mut source = broker.source("topic-a");
        let batch = source.poll(10).await.unwrap();
        broker.redeliver(batch[0].clone());

        let again = source.poll(10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].key.as_deref(), Some("k1"));
        // 重复投递不计入发送历史
        assert_eq!(broker.history("topic-a").len(), 1);
    }
}
