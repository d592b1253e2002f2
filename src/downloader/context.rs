use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    history::HistoryStore,
    models::{DownloadTask, HistoryEntry, TaskState, TaskStatus},
    progress::{Progress, ProgressView},
};

struct BatchState {
    progress: Progress,
    statuses: Vec<TaskStatus>,
    index: HashMap<String, usize>,
}

/// 单个批次的共享状态，注入到每个 worker
///
/// 汇总计数和任务状态表放在同一把锁里，状态变更和计数在一个临界区内完成。
/// 历史记录由 [`HistoryStore`] 自己的锁保护。
pub struct BatchContext {
    id: Uuid,
    state: Mutex<BatchState>,
    history: Arc<HistoryStore>,
}

impl BatchContext {
    pub fn new(tasks: &[DownloadTask], history: Arc<HistoryStore>) -> Self {
        let statuses: Vec<TaskStatus> = tasks.iter().map(TaskStatus::from).collect();
        let index = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| (s.url.clone(), i))
            .collect();
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(BatchState {
                progress: Progress::new(tasks.len()),
                statuses,
                index,
            }),
            history,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// worker 领取任务时调用；只有 pending 的任务可以开始
    pub fn mark_in_progress(&self, url: &str) -> bool {
        let mut state = self.state.lock();
        let Some(&i) = state.index.get(url) else {
            return false;
        };
        let row = &mut state.statuses[i];
        if !row.status.can_transition_to(TaskState::InProgress) {
            return false;
        }
        row.status = TaskState::InProgress;
        true
    }

    /// 记录任务的终态
    ///
    /// 同一个 URL 只记录一次，重复上报返回 false。成功记录时向内存历史追加一条，
    /// 落盘由调用方通过 [`HistoryStore::flush`] 完成。
    pub fn record_outcome(&self, task: &DownloadTask) -> bool {
        if !task.state.is_terminal() {
            return false;
        }

        {
            let mut state = self.state.lock();
            let Some(&i) = state.index.get(&task.url) else {
                debug!("任务不属于当前批次: {}", task.url);
                return false;
            };
            let row = &mut state.statuses[i];
            if row.status.is_terminal() || !row.status.can_transition_to(task.state) {
                debug!("任务已记录过终态，忽略: {}", task.url);
                return false;
            }
            *row = TaskStatus::from(task);
            state.progress.count(task.state);
        }

        self.history.record(HistoryEntry::from_task(task));
        true
    }

    pub fn snapshot(&self) -> ProgressView {
        let state = self.state.lock();
        state.progress.view(state.statuses.clone())
    }

    pub fn status_of(&self, url: &str) -> Option<TaskStatus> {
        let state = self.state.lock();
        state.index.get(url).map(|&i| state.statuses[i].clone())
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().progress.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::ResourceType;

    fn tasks() -> Vec<DownloadTask> {
        vec![
            DownloadTask::new("https://a.com/1.png", ResourceType::Image),
            DownloadTask::new("https://a.com/2.css", ResourceType::Style),
        ]
    }

    #[test]
    fn test_outcome_recorded_once() {
        let tasks = tasks();
        let history = Arc::new(HistoryStore::in_memory());
        let ctx = BatchContext::new(&tasks, Arc::clone(&history));

        let mut task = tasks[0].clone();
        assert!(ctx.mark_in_progress(&task.url));
        assert!(!ctx.mark_in_progress(&task.url));
        task.transition(TaskState::InProgress);
        task.transition(TaskState::Completed);

        assert!(ctx.record_outcome(&task));
        assert!(!ctx.record_outcome(&task));

        let view = ctx.snapshot();
        assert_eq!((view.total, view.completed, view.failed), (2, 1, 0));
        assert_eq!(view.status_of(&task.url).unwrap().status, TaskState::Completed);
        assert_eq!(history.len(), 1);
        assert!(!ctx.is_done());
    }

    #[test]
    fn test_non_terminal_and_unknown_tasks_ignored() {
        let tasks = tasks();
        let ctx = BatchContext::new(&tasks, Arc::new(HistoryStore::in_memory()));
        assert!(!ctx.record_outcome(&tasks[1]));

        let mut stranger = DownloadTask::new("https://b.com/x.js", ResourceType::Script);
        stranger.transition(TaskState::Skipped);
        assert!(!ctx.record_outcome(&stranger));
        assert_eq!(ctx.snapshot().finished(), 0);
    }

    #[test]
    fn test_concurrent_outcomes_are_not_lost() {
        let tasks: Vec<DownloadTask> = (0..64)
            .map(|i| DownloadTask::new(format!("https://a.com/{}.png", i), ResourceType::Image))
            .collect();
        let ctx = Arc::new(BatchContext::new(&tasks, Arc::new(HistoryStore::in_memory())));

        let handles: Vec<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(i, mut task)| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || {
                    ctx.mark_in_progress(&task.url);
                    task.transition(TaskState::InProgress);
                    task.transition(if i % 3 == 0 { TaskState::Failed } else { TaskState::Completed });
                    // 重复上报不应重复计数
                    ctx.record_outcome(&task);
                    ctx.record_outcome(&task);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let view = ctx.snapshot();
        assert!(view.is_done());
        assert_eq!(view.failed, 22);
        assert_eq!(view.completed, 42);
        assert_eq!(ctx.history().len(), 64);
    }
}
