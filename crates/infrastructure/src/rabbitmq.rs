use std::sync::Arc;

use async_trait::async_trait;
use lapin::{
    options::{
        BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
        ConfirmSelectOptions, QueueDeclareOptions, QueuePurgeOptions,
    },
    publisher_confirm::Confirmation,
    types::{AMQPValue, ByteArray, FieldTable, LongString, ShortString},
    BasicProperties, Channel,
};
use tracing::{debug, warn};

use analyzer_core::{
    AnalyzerError, Delivery, HeaderValue, MessageMetadata, MessageQueue, Result,
    REQUEST_ID_HEADER,
};

use crate::connection::ConnectionManager;

/// RabbitMQ消息队列实现
///
/// 通道由互斥锁守护并在连接丢失后按需重建；发布走确认模式，
/// 消息在代理落盘确认前不会返回成功。
pub struct RabbitMessageQueue {
    manager: Arc<ConnectionManager>,
    channel: tokio::sync::Mutex<Option<Channel>>,
}

impl RabbitMessageQueue {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            channel: tokio::sync::Mutex::new(None),
        }
    }

    /// 获取当前可用通道，必要时重建并开启发布确认
    async fn channel(&self) -> Result<Channel> {
        let mut guard = self.channel.lock().await;

        let reusable = guard
            .as_ref()
            .map(|channel| channel.status().connected())
            .unwrap_or(false);

        if !reusable {
            if guard.is_some() {
                warn!("通道已失效，重新创建");
            }
            let channel = self.manager.create_channel().await?;
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| AnalyzerError::Connectivity(format!("开启发布确认失败: {e}")))?;
            *guard = Some(channel);
        }

        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| AnalyzerError::Internal("通道槽为空".to_string()))
    }

    fn build_headers(metadata: &MessageMetadata) -> FieldTable {
        let mut table = FieldTable::default();
        if let Some(request_id) = &metadata.request_id {
            table.insert(
                ShortString::from(REQUEST_ID_HEADER),
                AMQPValue::LongString(LongString::from(request_id.as_str())),
            );
        }
        for (key, value) in &metadata.headers {
            table.insert(ShortString::from(key.as_str()), header_to_amqp(value));
        }
        table
    }

    fn extract_metadata(properties: &BasicProperties) -> MessageMetadata {
        let mut metadata = MessageMetadata {
            correlation_id: properties
                .correlation_id()
                .as_ref()
                .map(|id| id.as_str().to_string()),
            ..MessageMetadata::default()
        };

        if let Some(table) = properties.headers() {
            for (key, value) in table.inner() {
                if key.as_str() == REQUEST_ID_HEADER {
                    if let Some(HeaderValue::Text(text)) = amqp_to_header(value) {
                        metadata.request_id = Some(text);
                        continue;
                    }
                }
                if let Some(header) = amqp_to_header(value) {
                    metadata.headers.insert(key.as_str().to_string(), header);
                }
            }
        }

        metadata
    }
}

/// 把抽象消息头映射为AMQP字段值
fn header_to_amqp(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::Byte(v) => AMQPValue::ShortShortUInt(*v),
        HeaderValue::Int(v) => AMQPValue::LongInt(*v),
        HeaderValue::Long(v) => AMQPValue::LongLongInt(*v),
        HeaderValue::Bytes(bytes) => AMQPValue::ByteArray(ByteArray::from(bytes.clone())),
        HeaderValue::Text(text) => AMQPValue::LongString(LongString::from(text.as_str())),
    }
}

/// 发布确认的判定：代理明确拒绝视为发布失败
fn confirm_to_result(confirmation: &Confirmation, queue: &str) -> Result<()> {
    match confirmation {
        Confirmation::Nack(_) => Err(AnalyzerError::MessageQueue(format!(
            "代理拒绝了发往队列 {queue} 的消息"
        ))),
        _ => Ok(()),
    }
}

/// 把AMQP字段值映射回抽象消息头，无法表达的类型丢弃
fn amqp_to_header(value: &AMQPValue) -> Option<HeaderValue> {
    match value {
        AMQPValue::ShortShortUInt(v) => Some(HeaderValue::Byte(*v)),
        AMQPValue::ShortShortInt(v) => Some(HeaderValue::Int(i32::from(*v))),
        AMQPValue::ShortInt(v) => Some(HeaderValue::Int(i32::from(*v))),
        AMQPValue::ShortUInt(v) => Some(HeaderValue::Int(i32::from(*v))),
        AMQPValue::LongInt(v) => Some(HeaderValue::Int(*v)),
        AMQPValue::LongUInt(v) => Some(HeaderValue::Long(i64::from(*v))),
        AMQPValue::LongLongInt(v) => Some(HeaderValue::Long(*v)),
        AMQPValue::LongString(text) => Some(HeaderValue::Text(
            String::from_utf8_lossy(text.as_bytes()).into_owned(),
        )),
        AMQPValue::ByteArray(bytes) => Some(HeaderValue::Bytes(bytes.as_slice().to_vec())),
        _ => None,
    }
}

#[async_trait]
impl MessageQueue for RabbitMessageQueue {
    async fn publish_message(
        &self,
        queue: &str,
        payload: &[u8],
        metadata: &MessageMetadata,
    ) -> Result<()> {
        let channel = self.channel().await?;

        let mut properties = BasicProperties::default()
            .with_delivery_mode(2) // 2 = persistent
            .with_headers(Self::build_headers(metadata));
        if let Some(correlation_id) = &metadata.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id.as_str()));
        }

        let confirm = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| AnalyzerError::MessageQueue(format!("发布消息到队列 {queue} 失败: {e}")))?;

        let confirmation = confirm
            .await
            .map_err(|e| AnalyzerError::MessageQueue(format!("消息发布确认失败: {e}")))?;
        confirm_to_result(&confirmation, queue)?;

        debug!("消息已发布到队列: {}", queue);
        Ok(())
    }

    async fn fetch_message(&self, queue: &str) -> Result<Option<Delivery>> {
        let channel = self.channel().await?;

        let fetched = channel
            .basic_get(queue, BasicGetOptions::default())
            .await
            .map_err(|e| AnalyzerError::MessageQueue(format!("从队列 {queue} 获取消息失败: {e}")))?;

        Ok(fetched.map(|message| Delivery {
            delivery_tag: message.delivery_tag,
            payload: message.data.clone(),
            metadata: Self::extract_metadata(&message.properties),
        }))
    }

    async fn ack_message(&self, _queue: &str, delivery_tag: u64) -> Result<()> {
        let channel = self.channel().await?;
        channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| AnalyzerError::MessageQueue(format!("确认消息失败: {e}")))
    }

    async fn nack_message(&self, _queue: &str, delivery_tag: u64, requeue: bool) -> Result<()> {
        let channel = self.channel().await?;
        channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AnalyzerError::MessageQueue(format!("拒绝消息失败: {e}")))
    }

    async fn queue_depth(&self, queue: &str) -> Result<u32> {
        let channel = self.channel().await?;
        let queue_info = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| AnalyzerError::MessageQueue(format!("获取队列 {queue} 信息失败: {e}")))?;
        Ok(queue_info.message_count())
    }

    async fn purge_queue(&self, queue: &str) -> Result<()> {
        let channel = self.channel().await?;
        channel
            .queue_purge(queue, QueuePurgeOptions::default())
            .await
            .map_err(|e| AnalyzerError::MessageQueue(format!("清空队列 {queue} 失败: {e}")))?;
        debug!("队列 {} 已清空", queue);
        Ok(())
    }
}
