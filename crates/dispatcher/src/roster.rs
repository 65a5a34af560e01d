use std::collections::HashMap;
use std::sync::RwLock;

use roadside_core::models::Mechanic;

/// 技师花名册
///
/// 引擎启动时从仓储同步的内存快照，匹配路径上查专长和服务站归属
/// 不再回仓储。可用状态不在这里维护，那是 AvailabilityRegistry 的
/// 职责。
pub struct MechanicRoster {
    inner: RwLock<HashMap<String, Mechanic>>,
}

impl MechanicRoster {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, mechanic: Mechanic) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(mechanic.id.clone(), mechanic);
    }

    pub fn get(&self, mechanic_id: &str) -> Option<Mechanic> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(mechanic_id).cloned()
    }

    pub fn remove(&self, mechanic_id: &str) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.remove(mechanic_id);
    }

    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MechanicRoster {
    fn default() -> Self {
        Self::new()
    }
}
