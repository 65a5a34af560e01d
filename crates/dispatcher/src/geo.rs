use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;

use roadside_core::models::GeoPoint;

/// 默认网格单元边长（度），约5.5公里
const DEFAULT_CELL_SIZE_DEG: f64 = 0.05;

/// 纬度方向每度的大致公里数
const KM_PER_DEG_LAT: f64 = 111.19;

/// 技师位置地理索引
///
/// 回答"离P点最近的k个满足条件的技师"查询。固定大小的经纬度网格
/// 分桶，按环形逐圈向外扩展搜索，距离用 haversine 大圆公式计算。
/// 技师移动或上下线时增量更新，多worker并发读写安全。
pub struct GeoIndex {
    cell_size_deg: f64,
    inner: RwLock<GridInner>,
}

#[derive(Default)]
struct GridInner {
    positions: HashMap<String, GeoPoint>,
    /// 单元格 -> 格内技师ID，有序集合保证遍历顺序确定
    cells: HashMap<(i32, i32), BTreeSet<String>>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::with_cell_size(DEFAULT_CELL_SIZE_DEG)
    }

    pub fn with_cell_size(cell_size_deg: f64) -> Self {
        Self {
            cell_size_deg,
            inner: RwLock::new(GridInner::default()),
        }
    }

    fn cell_of(&self, point: &GeoPoint) -> (i32, i32) {
        (
            (point.latitude / self.cell_size_deg).floor() as i32,
            (point.longitude / self.cell_size_deg).floor() as i32,
        )
    }

    /// 更新或插入技师位置
    pub fn upsert(&self, mechanic_id: &str, point: GeoPoint) {
        let cell = self.cell_of(&point);
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if let Some(old) = inner.positions.insert(mechanic_id.to_string(), point) {
            let old_cell = self.cell_of(&old);
            if old_cell != cell {
                if let Some(bucket) = inner.cells.get_mut(&old_cell) {
                    bucket.remove(mechanic_id);
                    if bucket.is_empty() {
                        inner.cells.remove(&old_cell);
                    }
                }
            }
        }

        inner
            .cells
            .entry(cell)
            .or_default()
            .insert(mechanic_id.to_string());
    }

    /// 移除技师位置（下线）
    pub fn remove(&self, mechanic_id: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(point) = inner.positions.remove(mechanic_id) {
            let cell = self.cell_of(&point);
            if let Some(bucket) = inner.cells.get_mut(&cell) {
                bucket.remove(mechanic_id);
                if bucket.is_empty() {
                    inner.cells.remove(&cell);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .positions
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 查询离 point 最近的 k 个满足 filter 的技师，按（距离，ID）升序
    ///
    /// 没有任何技师满足条件时返回空列表，不是错误。找到 k 个之后
    /// 继续向外扩环，直到下一环的最小可能距离超过当前第 k 近的
    /// 命中：对角方向的命中可能比外两环的轴向候选更远。
    pub fn nearest<F>(&self, point: &GeoPoint, k: usize, filter: F) -> Vec<(String, f64)>
    where
        F: Fn(&str) -> bool,
    {
        if k == 0 {
            return Vec::new();
        }

        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if inner.positions.is_empty() {
            return Vec::new();
        }

        // 网格可能稀疏，环扩展上限取已占用单元格的包络
        let center = self.cell_of(point);
        let max_ring = inner
            .cells
            .keys()
            .map(|(lat, lon)| ((lat - center.0).abs()).max((lon - center.1).abs()))
            .max()
            .unwrap_or(0);

        // 经度方向的单元格宽度随纬度收缩，下界取两个方向里更小的
        let km_per_deg = KM_PER_DEG_LAT * point.latitude.to_radians().cos().abs().min(1.0);

        let mut matches: Vec<(String, f64)> = Vec::new();

        for ring in 0..=max_ring {
            // 环 ring 里的任何点离查询点至少隔 ring-1 个完整单元格
            if matches.len() >= k {
                let ring_min_km = (ring - 1) as f64 * self.cell_size_deg * km_per_deg;
                if ring_min_km > kth_distance(&matches, k) {
                    break;
                }
            }

            for (cell_lat, cell_lon) in ring_cells(center, ring) {
                let Some(bucket) = inner.cells.get(&(cell_lat, cell_lon)) else {
                    continue;
                };
                for id in bucket {
                    if !filter(id) {
                        continue;
                    }
                    if let Some(pos) = inner.positions.get(id) {
                        matches.push((id.clone(), point.haversine_km(pos)));
                    }
                }
            }
        }

        matches.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        matches.truncate(k);

        debug!("地理索引查询返回 {} 个候选", matches.len());
        matches
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前命中里第 k 近的距离，调用方保证 matches.len() >= k
fn kth_distance(matches: &[(String, f64)], k: usize) -> f64 {
    let mut dists: Vec<f64> = matches.iter().map(|(_, d)| *d).collect();
    dists.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    dists[k - 1]
}

/// 以 center 为中心、距离为 ring 的方形环上的所有单元格
fn ring_cells(center: (i32, i32), ring: i32) -> Vec<(i32, i32)> {
    if ring == 0 {
        return vec![center];
    }

    let (clat, clon) = center;
    let mut cells = Vec::with_capacity((ring as usize) * 8);

    for lon in (clon - ring)..=(clon + ring) {
        cells.push((clat - ring, lon));
        cells.push((clat + ring, lon));
    }
    for lat in (clat - ring + 1)..(clat + ring) {
        cells.push((lat, clon - ring));
        cells.push((lat, clon + ring));
    }

    cells
}
