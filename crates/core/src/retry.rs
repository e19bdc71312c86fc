use std::time::Duration;

/// 重试退避策略
///
/// 纯函数式的退避表：按尝试次数给出延迟，超出表长即视为重试耗尽。
/// 不依赖消息代理，可独立单元测试。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    schedule: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 固定退避表：第1次 5 秒，第2次 30 秒，第3次起不再重试
        Self {
            schedule: vec![Duration::from_secs(5), Duration::from_secs(30)],
        }
    }
}

impl RetryPolicy {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self { schedule }
    }

    /// 返回第 `attempt` 次尝试前的退避延迟（attempt 从 1 开始计数）
    ///
    /// 返回 `None` 表示重试已耗尽，消息应转入死信队列。
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        let index = attempt.saturating_sub(1) as usize;
        self.schedule.get(index).copied()
    }

    /// 允许的最大尝试次数（含首次投递后的重试）
    pub fn max_attempts(&self) -> u32 {
        self.schedule.len() as u32
    }
}
