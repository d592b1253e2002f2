use std::time::Duration;

/// 单个任务的重试状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    /// 第 n 次尝试（从 1 开始）
    Attempting(u32),
    Completed,
    Failed,
}

/// 线性退避：第 n 次失败后等待 n 个时间单位
pub fn backoff_delay(attempt: u32, unit: Duration) -> Duration {
    unit * attempt
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, unit: Duration) -> Self {
        Self { max_retries, unit }
    }

    /// 总尝试次数 = 1 + 重试次数
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn start(&self) -> RetryState {
        RetryState::Attempting(1)
    }

    /// 本次尝试成功
    pub fn on_success(&self, state: RetryState) -> RetryState {
        match state {
            RetryState::Attempting(_) => RetryState::Completed,
            other => other,
        }
    }

    /// 本次尝试失败；还能重试时返回下一状态和需要等待的时间
    pub fn on_failure(&self, state: RetryState) -> (RetryState, Option<Duration>) {
        match state {
            RetryState::Attempting(n) if n < self.max_attempts() => (
                RetryState::Attempting(n + 1),
                Some(backoff_delay(n, self.unit)),
            ),
            RetryState::Attempting(_) => (RetryState::Failed, None),
            other => (other, None),
        }
    }
}
