use std::collections::HashSet;

use tracing::debug;

use roadside_core::config::RankingConfig;
use roadside_core::models::{BreakdownType, Request};

/// 参与打分的候选技师
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mechanic_id: String,
    pub distance_km: f64,
    pub specialties: HashSet<BreakdownType>,
    pub station_id: String,
}

impl Candidate {
    fn matches_exactly(&self, breakdown_type: BreakdownType) -> bool {
        self.specialties.contains(&breakdown_type)
    }

    fn can_handle(&self, breakdown_type: BreakdownType) -> bool {
        self.matches_exactly(breakdown_type) || self.specialties.contains(&BreakdownType::Other)
    }
}

/// 候选技师匹配打分器
///
/// 纯函数，无副作用，候选集过期也可以安全重复调用——陈旧性由
/// AssignmentCoordinator 的原子认领解决，不在这里处理。
///
/// 打分是加权和：距离为主信号，urgency 越高距离项权重越陡（紧急
/// 请求更偏好路程短的技师），专长精确匹配减去一个公里当量的加成。
/// 分数越低越好，同分按技师ID决胜保证确定性。
pub struct MatchRanker {
    config: RankingConfig,
}

impl MatchRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// 对候选集打分排序，返回最优在前的技师ID序列
    ///
    /// 完全不具备该故障类型承接能力的候选被剔除。
    pub fn rank(&self, request: &Request, candidates: &[Candidate]) -> Vec<String> {
        let mut scored: Vec<(f64, &str)> = candidates
            .iter()
            .filter(|c| c.can_handle(request.breakdown_type))
            .map(|c| (self.score(request, c), c.mechanic_id.as_str()))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });

        debug!(
            "请求 {} 的 {} 个候选中有 {} 个可承接",
            request.id,
            candidates.len(),
            scored.len()
        );

        scored.into_iter().map(|(_, id)| id.to_string()).collect()
    }

    fn score(&self, request: &Request, candidate: &Candidate) -> f64 {
        let urgency_sharpening = 1.0 + self.config.urgency_weight * request.urgency.max(0) as f64;
        let mut score = candidate.distance_km * self.config.distance_weight * urgency_sharpening;

        if candidate.matches_exactly(request.breakdown_type) {
            score -= self.config.specialty_boost_km;
        }

        score
    }
}
