use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{TaskState, TaskStatus};

/// 一个批次的汇总计数
#[derive(Debug, Clone)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub start_time: DateTime<Utc>,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            skipped: 0,
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    pub fn is_done(&self) -> bool {
        self.finished() == self.total
    }

    /// 按终态计数，非终态不计
    pub fn count(&mut self, state: TaskState) {
        match state {
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Skipped => self.skipped += 1,
            TaskState::Pending | TaskState::InProgress => {}
        }
        debug_assert!(self.finished() <= self.total);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// 每秒完成数，刚开始时返回 0
    pub fn rate(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed < 1e-3 {
            0.0
        } else {
            self.completed as f64 / elapsed
        }
    }

    pub fn view(&self, tasks: Vec<TaskStatus>) -> ProgressView {
        ProgressView {
            total: self.total,
            completed: self.completed,
            failed: self.failed,
            skipped: self.skipped,
            duration: self.elapsed_secs(),
            rate: self.rate(),
            started_at: self.start_time,
            tasks,
        }
    }
}

/// 对外的进度快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressView {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 已用时间（秒）
    pub duration: f64,
    pub rate: f64,
    pub started_at: DateTime<Utc>,
    pub tasks: Vec<TaskStatus>,
}

impl ProgressView {
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    pub fn is_done(&self) -> bool {
        self.finished() == self.total
    }

    pub fn status_of(&self, url: &str) -> Option<&TaskStatus> {
        self.tasks.iter().find(|t| t.url == url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_only_terminal_states() {
        let mut progress = Progress::new(3);
        progress.count(TaskState::InProgress);
        progress.count(TaskState::Completed);
        progress.count(TaskState::Failed);
        assert!(!progress.is_done());
        progress.count(TaskState::Skipped);
        assert!(progress.is_done());
        assert_eq!(
            (progress.completed, progress.failed, progress.skipped),
            (1, 1, 1)
        );
    }

    #[test]
    fn test_rate_is_finite_at_start() {
        let progress = Progress::new(0);
        assert!(progress.rate().is_finite());
        assert!(progress.view(Vec::new()).is_done());
    }
}
