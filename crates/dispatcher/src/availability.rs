use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

/// 技师忙闲状态登记表
///
/// 调度期间技师可用性的唯一事实来源。每个技师一个原子标志位，
/// `try_claim` 通过 compare-and-set 提供按技师线性化的认领语义：
/// 同一个 available->busy 边沿上并发调用只有一个能成功。没有全局锁，
/// 不同技师之间不保证顺序（有意为之，最大化吞吐）。
pub struct AvailabilityRegistry {
    slots: RwLock<HashMap<String, Arc<AtomicBool>>>,
}

impl AvailabilityRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// 登记技师及其初始可用状态
    pub fn register(&self, mechanic_id: &str, available: bool) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(mechanic_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(available)))
            .store(available, Ordering::Release);
    }

    /// 注销技师（离职、下线）
    pub fn deregister(&self, mechanic_id: &str) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.remove(mechanic_id);
    }

    /// 原子认领：available -> busy
    ///
    /// 已忙或未登记的技师返回 false。这是技师转入忙碌的唯一路径。
    pub fn try_claim(&self, mechanic_id: &str) -> bool {
        let slot = {
            let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
            slots.get(mechanic_id).cloned()
        };

        match slot {
            Some(flag) => flag
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            None => {
                debug!("尝试认领未登记的技师: {}", mechanic_id);
                false
            }
        }
    }

    /// 释放技师：busy -> available，幂等
    pub fn release(&self, mechanic_id: &str) {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        match slots.get(mechanic_id) {
            Some(flag) => flag.store(true, Ordering::Release),
            None => warn!("释放未登记的技师: {}", mechanic_id),
        }
    }

    /// 查询单个技师当前是否可用
    pub fn is_available(&self, mechanic_id: &str) -> bool {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(mechanic_id)
            .map(|flag| flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// 给定ID集合中当前可用的子集
    ///
    /// 只是时间点快照，不持有任何锁定，陈旧性由后续的 try_claim 解决。
    pub fn snapshot_available(&self, ids: &[String]) -> HashSet<String> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        ids.iter()
            .filter(|id| {
                slots
                    .get(id.as_str())
                    .map(|flag| flag.load(Ordering::Acquire))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AvailabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
