pub mod message;
pub mod request_status;

pub use message::{AnalysisJobMessage, AnalysisResultMessage, JobStatus};
pub use request_status::{RequestState, RequestStateStore, RequestStatus};

/// 健康检查结果
///
/// 供外部存活/就绪探针消费：连接打开即为健康，否则附带原因。
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub cause: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            cause: None,
        }
    }

    pub fn unhealthy(cause: impl Into<String>) -> Self {
        Self {
            healthy: false,
            cause: Some(cause.into()),
        }
    }
}
