use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use analyzer_core::{codec, AnalysisJobMessage, MessageMetadata, MessageQueue, Result};

/// 任务发布器
///
/// 无状态网关：编码、附加关联元数据、发布，不做内部重试。
/// 发布失败原样上报给调用方，重试责任在调用方或代理。
pub struct JobPublisher {
    queue: Arc<dyn MessageQueue>,
    job_queue: String,
}

impl JobPublisher {
    pub fn new(queue: Arc<dyn MessageQueue>, job_queue: impl Into<String>) -> Self {
        Self {
            queue,
            job_queue: job_queue.into(),
        }
    }

    /// 发布一条分析任务消息
    ///
    /// 成功返回意味着消息已被代理确认接收。
    pub async fn publish_job(&self, job: &AnalysisJobMessage) -> Result<()> {
        let payload = codec::encode(job)?;
        let metadata =
            MessageMetadata::for_request(job.request_id.clone(), Uuid::new_v4().to_string());

        self.queue
            .publish_message(&self.job_queue, &payload, &metadata)
            .await?;

        info!(
            job_id = %job.job_id,
            request_id = %job.request_id,
            analysis_type = %job.analysis_type,
            "分析任务已发布"
        );
        Ok(())
    }
}
