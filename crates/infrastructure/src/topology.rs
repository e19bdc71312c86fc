use std::sync::Arc;

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    Channel,
};
use tracing::{debug, info};

use analyzer_core::{AnalyzerError, MessageQueueConfig, Result};

use crate::connection::ConnectionManager;

/// 队列拓扑初始化器
///
/// 在进程启动时、任何发布/消费开始之前运行一次。重复声明同构拓扑
/// 是幂等的；与既有拓扑冲突时立即报错，进程不得接受工作。
pub struct TopologyInitializer {
    manager: Arc<ConnectionManager>,
    config: MessageQueueConfig,
}

impl TopologyInitializer {
    pub fn new(manager: Arc<ConnectionManager>, config: MessageQueueConfig) -> Self {
        Self { manager, config }
    }

    /// 声明全部三个队列及任务队列的死信绑定
    pub async fn initialize(&self) -> Result<()> {
        let channel = self.manager.create_channel().await?;

        // 死信队列先于引用它的任务队列声明
        self.declare_queue(&channel, &self.config.dead_letter_queue, FieldTable::default())
            .await?;

        let mut job_queue_args = FieldTable::default();
        job_queue_args.insert(
            ShortString::from("x-dead-letter-exchange"),
            AMQPValue::LongString(LongString::from("")),
        );
        job_queue_args.insert(
            ShortString::from("x-dead-letter-routing-key"),
            AMQPValue::LongString(LongString::from(self.config.dead_letter_queue.as_str())),
        );
        self.declare_queue(&channel, &self.config.job_queue, job_queue_args)
            .await?;

        self.declare_queue(&channel, &self.config.result_queue, FieldTable::default())
            .await?;

        info!(
            job_queue = %self.config.job_queue,
            result_queue = %self.config.result_queue,
            dead_letter_queue = %self.config.dead_letter_queue,
            "队列拓扑初始化完成"
        );
        Ok(())
    }

    async fn declare_queue(
        &self,
        channel: &Channel,
        queue_name: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .map_err(|e| AnalyzerError::Topology(format!("声明队列 {queue_name} 失败: {e}")))?;

        debug!("队列 {} 声明成功", queue_name);
        Ok(())
    }
}
