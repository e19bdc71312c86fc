use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use analyzer_core::{AnalyzerError, Delivery, MessageMetadata, MessageQueue, Result};

#[derive(Debug, Clone)]
struct StoredMessage {
    delivery_tag: u64,
    payload: Vec<u8>,
    metadata: MessageMetadata,
}

/// 内存消息队列实现
///
/// 用于嵌入式部署与无代理测试。队列按需创建；取出的消息进入
/// 未确认表，确认后移除，拒绝且要求重新入队时放回队首。
#[derive(Debug, Default)]
pub struct InMemoryMessageQueue {
    /// 就绪消息：队列名 -> FIFO
    ready: RwLock<HashMap<String, VecDeque<StoredMessage>>>,
    /// 未确认消息：(队列名, 投递标签) -> 消息
    unacked: RwLock<HashMap<(String, u64), StoredMessage>>,
    next_tag: AtomicU64,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(
        &self,
        queue: &str,
        payload: &[u8],
        metadata: &MessageMetadata,
    ) -> Result<()> {
        let mut ready = self.ready.write().await;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
        ready
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                delivery_tag: tag,
                payload: payload.to_vec(),
                metadata: metadata.clone(),
            });
        debug!("消息已发布到内存队列: {}", queue);
        Ok(())
    }

    async fn fetch_message(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut ready = self.ready.write().await;
        let Some(message) = ready.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        drop(ready);

        let delivery = Delivery {
            delivery_tag: message.delivery_tag,
            payload: message.payload.clone(),
            metadata: message.metadata.clone(),
        };

        let mut unacked = self.unacked.write().await;
        unacked.insert((queue.to_string(), message.delivery_tag), message);
        Ok(Some(delivery))
    }

    async fn ack_message(&self, queue: &str, delivery_tag: u64) -> Result<()> {
        let mut unacked = self.unacked.write().await;
        unacked
            .remove(&(queue.to_string(), delivery_tag))
            .map(|_| ())
            .ok_or_else(|| {
                AnalyzerError::MessageQueue(format!(
                    "确认失败: 队列 {queue} 中不存在投递标签 {delivery_tag}"
                ))
            })
    }

    async fn nack_message(&self, queue: &str, delivery_tag: u64, requeue: bool) -> Result<()> {
        let mut unacked = self.unacked.write().await;
        let Some(message) = unacked.remove(&(queue.to_string(), delivery_tag)) else {
            return Err(AnalyzerError::MessageQueue(format!(
                "拒绝失败: 队列 {queue} 中不存在投递标签 {delivery_tag}"
            )));
        };
        drop(unacked);

        if requeue {
            let mut ready = self.ready.write().await;
            ready
                .entry(queue.to_string())
                .or_default()
                .push_front(message);
        } else {
            warn!("消息被拒绝且不重新入队，已从队列 {} 移除", queue);
        }
        Ok(())
    }

    async fn queue_depth(&self, queue: &str) -> Result<u32> {
        let ready = self.ready.read().await;
        Ok(ready.get(queue).map(VecDeque::len).unwrap_or(0) as u32)
    }

    async fn purge_queue(&self, queue: &str) -> Result<()> {
        let mut ready = self.ready.write().await;
        if let Some(messages) = ready.get_mut(queue) {
            let purged = messages.len();
            messages.clear();
            debug!("已从队列 {} 清除 {} 条消息", queue, purged);
        }
        Ok(())
    }
}
