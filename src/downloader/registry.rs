use std::sync::Arc;

use dashmap::{DashMap, mapref::one::Ref};
use tracing::info;
use uuid::Uuid;

use super::{manager::BatchHandle, progress::ProgressView};

/// 同时跟踪多个批次，按批次 id 查询和取消
#[derive(Clone, Default)]
pub struct BatchRegistry {
    batches: Arc<DashMap<Uuid, BatchHandle>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: BatchHandle) -> Uuid {
        let id = handle.id();
        self.batches.insert(id, handle);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Ref<'_, Uuid, BatchHandle>> {
        self.batches.get(id)
    }

    pub fn snapshot(&self, id: &Uuid) -> Option<ProgressView> {
        self.batches.get(id).map(|h| h.snapshot())
    }

    /// 返回 false 表示批次不存在
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.batches.get(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &Uuid) -> Option<BatchHandle> {
        self.batches.remove(id).map(|(_, handle)| handle)
    }

    /// 移除所有 worker 已退出的批次
    pub fn prune_finished(&self) -> Vec<BatchHandle> {
        let finished: Vec<Uuid> = self
            .batches
            .iter()
            .filter(|entry| entry.value().is_finished())
            .map(|entry| *entry.key())
            .collect();
        let removed: Vec<BatchHandle> = finished.iter().filter_map(|id| self.remove(id)).collect();
        if !removed.is_empty() {
            info!("清理 {} 个已结束的批次", removed.len());
        }
        removed
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.batches.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
