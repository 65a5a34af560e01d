use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use roadside_core::config::DispatcherConfig;
use roadside_core::errors::DispatchError;
use roadside_core::models::Request;

use crate::availability::AvailabilityRegistry;
use crate::geo::GeoIndex;
use crate::lifecycle::RequestLifecycle;
use crate::ranker::{Candidate, MatchRanker};
use crate::roster::MechanicRoster;

/// 一次分配尝试的结果
#[derive(Debug)]
pub enum AssignmentResult {
    /// 分配成功
    Assigned {
        mechanic_id: String,
        station_id: String,
    },
    /// 候选集为空或全部被抢占，稍后重试
    NoneAvailable,
    /// 分配过程出错（含取消竞态导致的 InvalidTransition）
    Failed(DispatchError),
}

/// 分配协调器
///
/// 匹配流水线的汇合点：地理索引出候选、打分器排序、注册表原子
/// 认领、生命周期持久化。认领成功但持久化失败时释放占用回滚，
/// 保证技师不会被泄漏在不可用状态。
pub struct AssignmentCoordinator {
    geo: Arc<GeoIndex>,
    roster: Arc<MechanicRoster>,
    availability: Arc<AvailabilityRegistry>,
    ranker: MatchRanker,
    lifecycle: Arc<RequestLifecycle>,
    config: DispatcherConfig,
}

impl AssignmentCoordinator {
    pub fn new(
        geo: Arc<GeoIndex>,
        roster: Arc<MechanicRoster>,
        availability: Arc<AvailabilityRegistry>,
        ranker: MatchRanker,
        lifecycle: Arc<RequestLifecycle>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            geo,
            roster,
            availability,
            ranker,
            lifecycle,
            config,
        }
    }

    /// 为一个 PENDING 请求寻找并认领技师
    ///
    /// 排序只是建议，认领才是裁决：按打分顺序逐个 try_claim，被
    /// 并发抢走就走向下一个。整条路径不持有任何锁跨越 await。
    pub async fn assign(&self, request: &Request) -> AssignmentResult {
        let ranked = self.ranked_candidates(request);
        if ranked.is_empty() {
            debug!("请求 {} 当前没有可承接的候选技师", request.id);
            return AssignmentResult::NoneAvailable;
        }

        for mechanic_id in ranked {
            if !self.availability.try_claim(&mechanic_id) {
                // 被并发分配抢占，继续探测下一名
                counter!("roadside_claim_races_total").increment(1);
                debug!("技师 {} 已被抢占，尝试下一候选", mechanic_id);
                continue;
            }

            let station_id = self
                .roster
                .get(&mechanic_id)
                .map(|m| m.station_id)
                .unwrap_or_default();

            match self
                .lifecycle
                .mark_assigned(&request.id, &mechanic_id, &station_id)
                .await
            {
                Ok(_) => {
                    counter!("roadside_assignments_total").increment(1);
                    return AssignmentResult::Assigned {
                        mechanic_id,
                        station_id,
                    };
                }
                Err(e) => {
                    // 认领已经发生，必须回滚释放
                    self.availability.release(&mechanic_id);
                    if matches!(e, DispatchError::InvalidTransition { .. }) {
                        debug!("请求 {} 在分配期间离开 PENDING 状态: {}", request.id, e);
                    } else {
                        warn!("请求 {} 分配持久化失败，已释放技师 {}: {}", request.id, mechanic_id, e);
                    }
                    return AssignmentResult::Failed(e);
                }
            }
        }

        debug!("请求 {} 的候选全部被抢占", request.id);
        AssignmentResult::NoneAvailable
    }

    /// 组装并排序候选集
    ///
    /// 先在地理索引上做可用性过滤的近邻查询；请求指定了服务站时
    /// 优先站内匹配，站内无人再回退全网（除非配置严格限站）。
    fn ranked_candidates(&self, request: &Request) -> Vec<String> {
        if let Some(station_id) = &request.station_id {
            let scoped = self.query_candidates(request, Some(station_id));
            if !scoped.is_empty() || self.config.respect_station_pin {
                return self.ranker.rank(request, &scoped);
            }
            debug!(
                "请求 {} 指定的服务站 {} 内无可用技师，回退全网匹配",
                request.id, station_id
            );
        }

        let all = self.query_candidates(request, None);
        self.ranker.rank(request, &all)
    }

    fn query_candidates(&self, request: &Request, station_id: Option<&str>) -> Vec<Candidate> {
        let roster = &self.roster;
        let nearest = self.geo.nearest(
            &request.location,
            self.config.candidate_limit,
            |mechanic_id: &str| {
                if !self.availability.is_available(mechanic_id) {
                    return false;
                }
                match roster.get(mechanic_id) {
                    Some(m) => station_id.map_or(true, |s| m.station_id == s),
                    None => false,
                }
            },
        );

        nearest
            .into_iter()
            .filter_map(|(mechanic_id, distance_km)| {
                roster.get(&mechanic_id).map(|m| Candidate {
                    mechanic_id,
                    distance_km,
                    specialties: m.specialties,
                    station_id: m.station_id,
                })
            })
            .collect()
    }
}
