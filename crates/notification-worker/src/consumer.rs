//! 后台消费循环
//!
//! 每个消费者是一个独立的受控任务：
//! 1. 等待空闲间隔（期间可被关闭信号打断）
//! 2. 从消息源拉取当前可用的一批消息
//! 3. 交给 `MessageHandler` 处理，失败的消息写入死信队列
//! 4. 处理完成后逐条确认
//!
//! 单条消息的失败（包括 panic）不会终止循环，只有关闭信号能让循环退出。
//! 失败消息写入死信队列之后才确认；死信写入也失败时，该消息及本批其后的消息都不确认，
//! 消费位置回退到该消息，退避后重新处理。
//! 收到关闭信号时已拉取的批次会处理完毕，但不会再拉取新消息。

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use blog_shared::broker::{ConsumerMessage, MessageSource};
use blog_shared::dlq::DeadLetterSink;
use blog_shared::observability::metrics;
use blog_shared::retry::RetryPolicy;
use blog_shared::shutdown;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WorkerError};

/// 单次拉取的默认上限
pub const DEFAULT_MAX_BATCH: usize = 100;

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// 已执行副作用
    Processed,
    /// 重复投递或不属于本消费者，未执行副作用
    Skipped,
}

impl HandleOutcome {
    pub fn as_status(&self) -> &'static str {
        match self {
            HandleOutcome::Processed => "processed",
            HandleOutcome::Skipped => "skipped",
        }
    }
}

/// 消息处理器
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 消费者名称，用于日志与指标
    fn name(&self) -> &'static str;

    async fn handle(&self, message: &ConsumerMessage) -> Result<HandleOutcome>;

    /// 处理一批消息，返回值与输入一一对应
    ///
    /// 默认逐条顺序处理；需要排序或并发的处理器可以覆盖。
    async fn handle_batch(&self, messages: &[ConsumerMessage]) -> Vec<Result<HandleOutcome>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.push(guarded(self.handle(message)).await);
        }
        results
    }
}

/// 执行处理 future，把其中的 panic 转换为 `HandlerPanicked`
pub async fn guarded<F>(future: F) -> Result<HandleOutcome>
where
    F: Future<Output = Result<HandleOutcome>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(WorkerError::HandlerPanicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 消费循环
pub struct ConsumerLoop<S, H> {
    source: S,
    handler: H,
    dead_letters: DeadLetterSink,
    idle_interval: Duration,
    max_batch: usize,
    backoff: RetryPolicy,
}

impl<S, H> ConsumerLoop<S, H>
where
    S: MessageSource + 'static,
    H: MessageHandler + 'static,
{
    pub fn new(source: S, handler: H, dead_letters: DeadLetterSink, idle_interval: Duration) -> Self {
        Self {
            source,
            handler,
            dead_letters,
            idle_interval,
            max_batch: DEFAULT_MAX_BATCH,
            backoff: RetryPolicy::default(),
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// 拉取失败后的退避策略，成功拉取一次后重新从初始等待开始
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// 在独立任务中运行，返回的 handle 即循环的汇合点
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<S> {
        tokio::spawn(self.run(shutdown))
    }

    /// 运行直到收到关闭信号，结束后归还消息源
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> S {
        let consumer = self.handler.name();
        info!(
            consumer,
            idle_interval_ms = self.idle_interval.as_millis() as u64,
            max_batch = self.max_batch,
            "消费循环已启动"
        );

        let mut poll_failures: u32 = 0;
        let mut dead_letter_failures: u32 = 0;
        // 上一批拉满时说明还有积压，跳过空闲等待
        let mut backlog = false;

        loop {
            if backlog {
                if shutdown::is_requested(&shutdown) {
                    break;
                }
            } else if shutdown::sleep_or_shutdown(&mut shutdown, self.idle_interval).await {
                break;
            }

            let batch = match self.source.poll(self.max_batch).await {
                Ok(batch) => {
                    poll_failures = 0;
                    batch
                }
                Err(e) => {
                    let delay = self.backoff.delay_for_attempt(poll_failures);
                    poll_failures = poll_failures.saturating_add(1);
                    backlog = false;
                    warn!(
                        consumer,
                        error = %e,
                        failures = poll_failures,
                        delay_ms = delay.as_millis() as u64,
                        "拉取消息失败，退避后重试"
                    );
                    if shutdown::sleep_or_shutdown(&mut shutdown, delay).await {
                        break;
                    }
                    continue;
                }
            };

            backlog = batch.len() >= self.max_batch;
            if batch.is_empty() {
                continue;
            }

            debug!(consumer, count = batch.len(), "拉取到一批消息");
            if self.process_batch(&batch).await {
                dead_letter_failures = 0;
                continue;
            }

            let delay = self.backoff.delay_for_attempt(dead_letter_failures);
            dead_letter_failures = dead_letter_failures.saturating_add(1);
            backlog = false;
            warn!(
                consumer,
                failures = dead_letter_failures,
                delay_ms = delay.as_millis() as u64,
                "死信队列不可用，退避后重新处理未确认的消息"
            );
            if shutdown::sleep_or_shutdown(&mut shutdown, delay).await {
                break;
            }
        }

        info!(consumer, "消费循环已停止");
        self.source
    }

    /// 处理并确认一批消息
    ///
    /// 某条失败消息写不进死信队列时停在该消息处，回退消费位置并返回 `false`。
    async fn process_batch(&mut self, batch: &[ConsumerMessage]) -> bool {
        let consumer = self.handler.name();
        let results = guarded_batch(&self.handler, batch).await;

        for (index, (message, result)) in batch.iter().zip(results).enumerate() {
            match result {
                Ok(outcome) => {
                    metrics::record_consumer_message(consumer, outcome.as_status());
                }
                Err(e) => {
                    metrics::record_consumer_message(consumer, "failed");
                    error!(
                        consumer,
                        message_id = %message.log_id(),
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "处理消息失败，转入死信队列"
                    );
                    if let Err(dlq_err) = self.dead_letters.send(message, &e.to_string()).await {
                        let unacked = &batch[index..];
                        error!(
                            consumer,
                            message_id = %message.log_id(),
                            unacked = unacked.len(),
                            error = %dlq_err,
                            "发送到死信队列失败，本批剩余消息不确认"
                        );
                        if let Err(e) = self.source.rewind(unacked) {
                            error!(consumer, error = %e, "回退消费位置失败");
                        }
                        return false;
                    }
                }
            }

            if let Err(e) = self.source.ack(message) {
                warn!(consumer, message_id = %message.log_id(), error = %e, "确认消息失败");
            }
        }
        true
    }
}

/// 处理整批消息；处理器返回的结果数量不符时，缺失的部分按失败处理
async fn guarded_batch<H: MessageHandler>(
    handler: &H,
    batch: &[ConsumerMessage],
) -> Vec<Result<HandleOutcome>> {
    let mut results = match AssertUnwindSafe(handler.handle_batch(batch))
        .catch_unwind()
        .await
    {
        Ok(results) => results,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            return batch
                .iter()
                .map(|_| Err(WorkerError::HandlerPanicked(reason.clone())))
                .collect();
        }
    };

    while results.len() < batch.len() {
        results.push(Err(WorkerError::HandlerPanicked(
            "批处理结果缺失".to_string(),
        )));
    }
    results.truncate(batch.len());
    results
}
