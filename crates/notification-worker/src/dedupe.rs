//! 已处理消息 ID 缓存
//!
//! 代理是至少一次投递，同一消息可能被重复消费。缓存容量有限，超出后淘汰最早记录的 ID。

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use uuid::Uuid;

/// 默认容量
pub const DEFAULT_CAPACITY: usize = 10_000;

struct Inner {
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

/// 有界的已处理 ID 集合
pub struct ProcessedIds {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ProcessedIds {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity.min(1024)),
                seen: HashSet::with_capacity(capacity.min(1024)),
            }),
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.lock().seen.contains(id)
    }

    /// 记录一个 ID；已存在时返回 `false`
    pub fn insert(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(id) {
            return false;
        }
        inner.order.push_back(id);

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessedIds {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
