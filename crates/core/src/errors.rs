use thiserror::Error;

use crate::models::RequestStatus;

/// 分析管道错误类型定义
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("消息代理连接错误: {0}")]
    Connectivity(String),

    #[error("队列拓扑声明失败: {0}")]
    Topology(String),

    #[error("消息解码失败: {0}")]
    Decode(String),

    #[error("结果处理失败: {0}")]
    Handler(String),

    #[error("消息队列操作失败: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("分析请求未找到: {id}")]
    RequestNotFound { id: String },

    #[error("非法的状态流转: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("内部错误: {0}")]
    Internal(String),
}

impl AnalyzerError {
    /// 连接类错误驱动健康检查与重连，不会终止进程
    pub fn is_connectivity(&self) -> bool {
        matches!(self, AnalyzerError::Connectivity(_))
    }

    /// 解码/处理类错误由消费者状态机消化，进入重试或死信流程
    pub fn is_processing_failure(&self) -> bool {
        matches!(self, AnalyzerError::Decode(_) | AnalyzerError::Handler(_))
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, AnalyzerError>;
