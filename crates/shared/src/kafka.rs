//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为 `BrokerProducer` / `MessageSource` 两个接缝的实现，
//! 统一消息序列化、错误映射和 offset 确认语义，避免各服务重复编写样板代码。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Offset;
use serde::Serialize;
use tracing::{debug, info};

use crate::broker::{BrokerProducer, ConsumerMessage, MessageSource};
use crate::config::KafkaConfig;
use crate::error::{BlogError, Result};

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理所有 topic 名称，防止字符串散落在各服务中导致拼写不一致
pub mod topics {
    pub const NOTIFICATIONS: &str = "blog.notifications";
    pub const EMAILS: &str = "blog.emails";
    pub const DEAD_LETTER_QUEUE: &str = "blog.dlq";
}

/// 拉取时等待单条消息的时长；超时即认为当前没有更多可用消息
const POLL_WAIT: Duration = Duration::from_millis(50);

/// 回退消费位置的超时
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// 从 rdkafka 的借用消息构造，提取并拥有所有字段
fn from_borrowed(msg: &BorrowedMessage<'_>) -> ConsumerMessage {
    let key = msg
        .key()
        .and_then(|k| std::str::from_utf8(k).ok())
        .map(String::from);

    let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

    let mut headers = HashMap::new();
    if let Some(h) = msg.headers() {
        for idx in 0..h.count() {
            let header = h.get(idx);
            if let Some(raw) = header.value
                && let Ok(value) = std::str::from_utf8(raw)
            {
                headers.insert(header.key.to_string(), value.to_string());
            }
        }
    }

    ConsumerMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key,
        payload,
        timestamp: msg.timestamp().to_millis(),
        headers,
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的）。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// 5 秒内仍无法投递即视为失败，由调用方决定是否重试，而非无限等待。
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BlogError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 将值序列化为 JSON 后发送
    pub async fn send_json<T: Serialize>(&self, topic: &str, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, key, &payload).await
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| BlogError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 关闭 offset 自动存储，只有在消息处理完成并 `ack` 之后才存储 offset，
/// 由自动提交把已存储的 offset 提交出去。进程在处理中途崩溃时，
/// 未确认的消息会在重新平衡后再次投递（at-least-once）。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组，
    /// 例如 "blog-notification.notifications" 和 "blog-notification.emails"。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Result<Self> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| BlogError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| BlogError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    async fn poll(&mut self, max_messages: usize) -> Result<Vec<ConsumerMessage>> {
        let mut batch = Vec::new();

        while batch.len() < max_messages {
            match tokio::time::timeout(POLL_WAIT, self.consumer.recv()).await {
                // 等待超时说明当前没有更多可用消息
                Err(_) => break,
                Ok(Ok(borrowed)) => batch.push(from_borrowed(&borrowed)),
                Ok(Err(e)) => {
                    // 已取到的消息仍然交给调用方处理，错误留待下一轮暴露
                    if batch.is_empty() {
                        return Err(BlogError::Kafka(format!("接收消息出错: {e}")));
                    }
                    break;
                }
            }
        }

        Ok(batch)
    }

    fn ack(&mut self, message: &ConsumerMessage) -> Result<()> {
        // librdkafka 存储的是"下一条要读取的 offset"
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
            .map_err(|e| BlogError::Kafka(format!("存储 offset 失败: {e}")))
    }

    /// 每个分区回退到未确认消息中最小的 offset
    fn rewind(&mut self, unacked: &[ConsumerMessage]) -> Result<()> {
        let mut earliest: HashMap<(&str, i32), i64> = HashMap::new();
        for message in unacked {
            earliest
                .entry((message.topic.as_str(), message.partition))
                .and_modify(|offset| *offset = (*offset).min(message.offset))
                .or_insert(message.offset);
        }

        for ((topic, partition), offset) in earliest {
            self.consumer
                .seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
                .map_err(|e| BlogError::Kafka(format!("回退消费位置失败: {e}")))?;
            debug!(topic, partition, offset, "消费位置已回退");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
