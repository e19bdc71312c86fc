use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{AnalyzerError, Result};

/// 分析请求的生命周期状态
///
/// 沿全序推进，不允许回退；`Failed` 可从任意非终态进入。
/// `Completed` 与 `Failed` 为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestStatus {
    Queued,
    DiscoveryRunning,
    AnalysisRunning,
    Consolidating,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    /// 推进方向上的序号，`Failed` 不参与全序
    fn rank(&self) -> Option<u8> {
        match self {
            RequestStatus::Queued => Some(0),
            RequestStatus::DiscoveryRunning => Some(1),
            RequestStatus::AnalysisRunning => Some(2),
            RequestStatus::Consolidating => Some(3),
            RequestStatus::Completed => Some(4),
            RequestStatus::Failed => None,
        }
    }

    /// 全序上的下一个状态
    pub fn next(&self) -> Option<RequestStatus> {
        match self {
            RequestStatus::Queued => Some(RequestStatus::DiscoveryRunning),
            RequestStatus::DiscoveryRunning => Some(RequestStatus::AnalysisRunning),
            RequestStatus::AnalysisRunning => Some(RequestStatus::Consolidating),
            RequestStatus::Consolidating => Some(RequestStatus::Completed),
            RequestStatus::Completed | RequestStatus::Failed => None,
        }
    }

    /// 判定一条流转边是否合法
    ///
    /// 同状态流转视为幂等空操作；终态之后不允许任何变更。
    pub fn can_transition_to(&self, target: RequestStatus) -> bool {
        if *self == target {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        if target == RequestStatus::Failed {
            return true;
        }
        match (self.rank(), target.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

/// 请求状态快照
#[derive(Debug, Clone)]
pub struct RequestState {
    pub status: RequestStatus,
    pub updated_at: DateTime<Utc>,
}

/// 内存中的请求状态跟踪器
///
/// 消费者的结果处理器是状态流转的唯一驱动方，非法流转被拒绝并
/// 上报，不会被静默应用。
#[derive(Debug, Default)]
pub struct RequestStateStore {
    states: RwLock<HashMap<String, RequestState>>,
}

impl RequestStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新请求，初始状态为 `Queued`
    pub async fn track(&self, request_id: impl Into<String>) {
        let mut states = self.states.write().await;
        states.insert(
            request_id.into(),
            RequestState {
                status: RequestStatus::Queued,
                updated_at: Utc::now(),
            },
        );
    }

    /// 将请求流转到目标状态
    pub async fn transition(&self, request_id: &str, target: RequestStatus) -> Result<RequestStatus> {
        let mut states = self.states.write().await;
        let state = states
            .get_mut(request_id)
            .ok_or_else(|| AnalyzerError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        if !state.status.can_transition_to(target) {
            return Err(AnalyzerError::InvalidStateTransition {
                from: state.status,
                to: target,
            });
        }

        state.status = target;
        state.updated_at = Utc::now();
        Ok(target)
    }

    pub async fn get(&self, request_id: &str) -> Option<RequestState> {
        self.states.read().await.get(request_id).cloned()
    }
}
