use serde::{Deserialize, Serialize};

/// 分析任务消息
///
/// 发布后不可变。字段别名覆盖小写折叠与下划线两种拼写，
/// 配合 `codec` 的键折叠实现大小写不敏感的解码。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJobMessage {
    /// 任务标识
    #[serde(alias = "jobid", alias = "job_id")]
    pub job_id: String,
    /// 请求关联标识
    #[serde(alias = "requestid", alias = "request_id")]
    pub request_id: String,
    /// 待分析的代码仓库引用
    #[serde(alias = "repositoryurl", alias = "repository_url")]
    pub repository_url: String,
    /// 分析类型
    #[serde(alias = "analysistype", alias = "analysis_type")]
    pub analysis_type: String,
    /// 共享上下文引用
    #[serde(
        default,
        alias = "contextid",
        alias = "context_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub context_id: Option<String>,
}

/// 分析结果消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResultMessage {
    #[serde(alias = "jobid", alias = "job_id")]
    pub job_id: String,
    #[serde(alias = "requestid", alias = "request_id")]
    pub request_id: String,
    /// 任务的终态结果
    pub status: JobStatus,
    #[serde(alias = "analysistype", alias = "analysis_type")]
    pub analysis_type: String,
    /// 成功时的结果载荷
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// 失败时的错误详情
    #[serde(
        default,
        alias = "errormessage",
        alias = "error_message",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

/// 单个分析任务的终态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "Completed", alias = "COMPLETED")]
    Completed,
    #[serde(alias = "Failed", alias = "FAILED")]
    Failed,
}

impl AnalysisResultMessage {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
