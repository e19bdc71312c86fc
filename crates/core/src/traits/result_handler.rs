use async_trait::async_trait;
use mockall::automock;

use crate::{models::AnalysisResultMessage, Result};

/// 结果处理回调
///
/// 由持久化请求状态的上层（排除在本核心之外）注册；处理失败会进入
/// 消费者的重试/死信状态机。
#[automock]
#[async_trait]
pub trait ResultHandler: Send + Sync {
    /// 处理一条已解码的结果消息
    async fn handle_result(&self, result: AnalysisResultMessage) -> Result<()>;

    /// 某个请求的消息重试耗尽并进入死信队列时的通知
    async fn on_permanent_failure(&self, request_id: &str);
}
