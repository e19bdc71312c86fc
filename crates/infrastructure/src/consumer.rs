use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use analyzer_core::{
    codec, headers, AnalysisResultMessage, AnalyzerError, ConsumerConfig, Delivery, MessageQueue,
    MessageQueueConfig, Result, ResultHandler, RetryPolicy,
};

/// 单条消息的处置决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    /// 处理成功，确认消息
    Ack,
    /// 延迟后以递增的重试计数重新发布到同一队列
    Retry {
        delay: Duration,
        next_retry_count: u32,
    },
    /// 重试耗尽，转入死信队列
    DeadLetter,
}

/// 依据重试策略决定消息处置
///
/// 纯函数：处理成功即确认；失败时以 `retry_count + 1` 为本次尝试
/// 序号查询退避表，有延迟则重试，否则死信。
pub fn decide(
    policy: &RetryPolicy,
    retry_count: u32,
    outcome: &Result<()>,
) -> MessageDisposition {
    if outcome.is_ok() {
        return MessageDisposition::Ack;
    }
    match policy.delay_for(retry_count + 1) {
        Some(delay) => MessageDisposition::Retry {
            delay,
            next_retry_count: retry_count + 1,
        },
        None => MessageDisposition::DeadLetter,
    }
}

/// 结果消费者
///
/// 每条消息走 `Received -> Processing -> {Acked, Retrying, DeadLettered}`
/// 状态机。解码失败与处理器失败同等对待；重试延迟通过调度的延迟
/// 重发实现，不阻塞其他消息的处理。收到关闭信号后停止拉取新消息，
/// 完成在途消息并等待全部延迟重发落地后才退出。
pub struct ResultConsumer {
    queue: Arc<dyn MessageQueue>,
    handler: Arc<dyn ResultHandler>,
    policy: RetryPolicy,
    result_queue: String,
    dead_letter_queue: String,
    poll_interval: Duration,
}

impl ResultConsumer {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn ResultHandler>,
        policy: RetryPolicy,
        mq_config: &MessageQueueConfig,
        consumer_config: &ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            policy,
            result_queue: mq_config.result_queue.clone(),
            dead_letter_queue: mq_config.dead_letter_queue.clone(),
            poll_interval: Duration::from_millis(consumer_config.poll_interval_ms),
        }
    }

    /// 运行消费循环直至收到关闭信号
    ///
    /// 解码/处理错误被状态机完全消化；队列操作错误记录日志后循环
    /// 继续，绝不使循环崩溃。
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut pending_retries: JoinSet<()> = JoinSet::new();
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(result_queue = %self.result_queue, "结果消费者已启动");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("结果消费者收到关闭信号，停止拉取新消息");
                    break;
                }
                _ = poll.tick() => {
                    match self.drain_ready(&mut shutdown, &mut pending_retries).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => error!("消费结果队列失败: {e}"),
                    }
                }
                Some(joined) = pending_retries.join_next(), if !pending_retries.is_empty() => {
                    if let Err(e) = joined {
                        error!("延迟重发任务异常退出: {e}");
                    }
                }
            }
        }

        // 优雅排空：已调度的延迟重发必须全部落地，消息不得丢失
        if !pending_retries.is_empty() {
            info!("等待 {} 个延迟重发完成", pending_retries.len());
        }
        while let Some(joined) = pending_retries.join_next().await {
            if let Err(e) = joined {
                error!("延迟重发任务异常退出: {e}");
            }
        }

        info!("结果消费者已退出");
        Ok(())
    }

    /// 处理当前就绪的所有消息，返回是否收到了关闭请求
    async fn drain_ready(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
        pending_retries: &mut JoinSet<()>,
    ) -> Result<bool> {
        while let Some(delivery) = self.queue.fetch_message(&self.result_queue).await? {
            self.process_delivery(delivery, pending_retries).await?;

            // 在途消息处理完后及时响应关闭请求
            match shutdown.try_recv() {
                Err(broadcast::error::TryRecvError::Empty) => {}
                _ => return Ok(true),
            }
        }
        Ok(false)
    }

    /// 单条消息的状态机：Received -> Processing -> 终态
    async fn process_delivery(
        &self,
        delivery: Delivery,
        pending_retries: &mut JoinSet<()>,
    ) -> Result<()> {
        let retry_count = headers::read_retry_count(&delivery.metadata);
        let outcome = self.process_payload(&delivery.payload).await;

        if let Err(e) = &outcome {
            debug!(retry_count, "结果消息处理失败: {e}");
        }

        match decide(&self.policy, retry_count, &outcome) {
            MessageDisposition::Ack => {
                self.queue
                    .ack_message(&self.result_queue, delivery.delivery_tag)
                    .await?;
                debug!("结果消息处理成功并已确认");
            }
            MessageDisposition::Retry {
                delay,
                next_retry_count,
            } => {
                self.schedule_retry(&delivery, delay, next_retry_count, pending_retries);
                self.queue
                    .nack_message(&self.result_queue, delivery.delivery_tag, false)
                    .await?;
                warn!(
                    request_id = delivery.metadata.request_id.as_deref().unwrap_or("未知"),
                    "处理失败，{delay:?} 后进行第 {next_retry_count} 次重试"
                );
            }
            MessageDisposition::DeadLetter => {
                // 死信先落地，确认在后：二者之间失败时消息仍在队列中
                self.queue
                    .publish_message(
                        &self.dead_letter_queue,
                        &delivery.payload,
                        &delivery.metadata,
                    )
                    .await?;
                self.queue
                    .ack_message(&self.result_queue, delivery.delivery_tag)
                    .await?;
                error!(
                    request_id = delivery.metadata.request_id.as_deref().unwrap_or("未知"),
                    retry_count, "重试次数耗尽，消息已转入死信队列"
                );
                if let Some(request_id) = &delivery.metadata.request_id {
                    self.handler.on_permanent_failure(request_id).await;
                }
            }
        }
        Ok(())
    }

    /// 调度一次延迟重发，不阻塞当前循环
    fn schedule_retry(
        &self,
        delivery: &Delivery,
        delay: Duration,
        next_retry_count: u32,
        pending_retries: &mut JoinSet<()>,
    ) {
        let queue = Arc::clone(&self.queue);
        let result_queue = self.result_queue.clone();
        let payload = delivery.payload.clone();
        let mut metadata = delivery.metadata.clone();
        headers::write_retry_count(&mut metadata, next_retry_count);

        pending_retries.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.publish_message(&result_queue, &payload, &metadata).await {
                error!("延迟重发失败，消息可能丢失: {e}");
            }
        });
    }

    /// 解码并交给结果处理器；空载荷与解码失败均视为处理失败
    async fn process_payload(&self, payload: &[u8]) -> Result<()> {
        let message: AnalysisResultMessage = codec::decode(payload)?
            .ok_or_else(|| AnalyzerError::Decode("空消息体".to_string()))?;
        self.handler.handle_result(message).await
    }
}
