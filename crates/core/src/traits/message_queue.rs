use async_trait::async_trait;
use mockall::automock;

use crate::{headers::MessageMetadata, Result};

/// 一次消息投递
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 代理分配的投递标签，确认/拒绝时回传
    pub delivery_tag: u64,
    /// 原始字节载荷
    pub payload: Vec<u8>,
    /// 随消息传递的元数据
    pub metadata: MessageMetadata,
}

/// 消息队列抽象接口
///
/// RabbitMQ 实现用于生产部署，内存实现用于嵌入式部署与测试。
#[automock]
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息到指定队列，返回前须获得代理确认
    async fn publish_message(
        &self,
        queue: &str,
        payload: &[u8],
        metadata: &MessageMetadata,
    ) -> Result<()>;

    /// 从指定队列取出一条消息，队列为空时返回 `None`
    async fn fetch_message(&self, queue: &str) -> Result<Option<Delivery>>;

    /// 确认消息处理完成
    async fn ack_message(&self, queue: &str, delivery_tag: u64) -> Result<()>;

    /// 拒绝消息，`requeue` 决定是否重新入队
    async fn nack_message(&self, queue: &str, delivery_tag: u64, requeue: bool) -> Result<()>;

    /// 获取队列中的消息数量
    async fn queue_depth(&self, queue: &str) -> Result<u32>;

    /// 清空队列
    async fn purge_queue(&self, queue: &str) -> Result<()>;
}
