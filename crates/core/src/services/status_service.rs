use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    models::{AnalysisResultMessage, RequestStateStore, RequestStatus},
    traits::ResultHandler,
    Result,
};

/// 默认的结果处理器：驱动请求状态机
///
/// 成功的结果使请求沿全序推进一个阶段；失败的结果或死信通知将请求
/// 置为 `Failed`。非法流转原样上报，由消费者的重试/死信状态机处置。
pub struct RequestStatusService {
    store: Arc<RequestStateStore>,
}

impl RequestStatusService {
    pub fn new(store: Arc<RequestStateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<RequestStateStore> {
        Arc::clone(&self.store)
    }
}

#[async_trait]
impl ResultHandler for RequestStatusService {
    async fn handle_result(&self, result: AnalysisResultMessage) -> Result<()> {
        if !result.is_success() {
            let status = self
                .store
                .transition(&result.request_id, RequestStatus::Failed)
                .await?;
            warn!(
                request_id = %result.request_id,
                job_id = %result.job_id,
                error = result.error_message.as_deref().unwrap_or("未知"),
                "分析任务失败，请求状态更新为 {status:?}"
            );
            return Ok(());
        }

        let current = self.store.get(&result.request_id).await.ok_or_else(|| {
            crate::AnalyzerError::RequestNotFound {
                id: result.request_id.clone(),
            }
        })?;

        let target = current
            .status
            .next()
            .ok_or(crate::AnalyzerError::InvalidStateTransition {
                from: current.status,
                to: current.status,
            })?;

        let status = self.store.transition(&result.request_id, target).await?;
        info!(
            request_id = %result.request_id,
            job_id = %result.job_id,
            analysis_type = %result.analysis_type,
            "结果处理完成，请求状态推进为 {status:?}"
        );
        Ok(())
    }

    async fn on_permanent_failure(&self, request_id: &str) {
        match self.store.transition(request_id, RequestStatus::Failed).await {
            Ok(_) => warn!(request_id, "请求因消息进入死信队列被标记为失败"),
            Err(e) => warn!(request_id, "死信通知未能更新请求状态: {e}"),
        }
    }
}
