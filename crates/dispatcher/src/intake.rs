use std::sync::Arc;

use metrics::counter;
use tracing::info;

use roadside_core::config::DispatcherConfig;
use roadside_core::errors::{DispatchError, DispatchResult};
use roadside_core::models::{Request, RequestDraft};
use roadside_core::traits::RequestRepository;

use crate::queue::{DispatchQueue, DispatchTicket};

/// 请求受理
///
/// 校验报修单、计算初始优先级、持久化为 PENDING 并推入调度队列。
pub struct IntakeService {
    request_repo: Arc<dyn RequestRepository>,
    queue: Arc<DispatchQueue>,
    config: DispatcherConfig,
}

impl IntakeService {
    pub fn new(
        request_repo: Arc<dyn RequestRepository>,
        queue: Arc<DispatchQueue>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            request_repo,
            queue,
            config,
        }
    }

    /// 受理一张报修单，返回新请求ID
    pub async fn submit(&self, draft: RequestDraft) -> DispatchResult<String> {
        Self::validate(&draft)?;

        let priority = self.compute_priority(&draft);
        let request = Request::from_draft(draft, priority);

        self.request_repo.create(&request).await?;
        self.queue.push(DispatchTicket::from_request(&request))?;

        counter!("roadside_intake_total").increment(1);
        info!(
            "受理请求 {}（故障 {:?}，urgency {}，优先级 {}）",
            request.id, request.breakdown_type, request.urgency, request.priority
        );
        Ok(request.id)
    }

    /// 初始优先级 = urgency 放大项 + 故障类型严重度
    fn compute_priority(&self, draft: &RequestDraft) -> i32 {
        draft.urgency * self.config.urgency_priority_weight
            + draft.breakdown_type.severity_weight()
    }

    fn validate(draft: &RequestDraft) -> DispatchResult<()> {
        if draft.requester_name.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "报修人姓名不能为空".to_string(),
            ));
        }
        if draft.requester_phone.trim().is_empty() {
            return Err(DispatchError::InvalidRequest(
                "报修人电话不能为空".to_string(),
            ));
        }
        if !(0..=10).contains(&draft.urgency) {
            return Err(DispatchError::InvalidRequest(format!(
                "urgency 必须在0-10之间: {}",
                draft.urgency
            )));
        }
        let lat = draft.location.latitude;
        let lon = draft.location.longitude;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(DispatchError::InvalidRequest(format!(
                "无效的坐标: ({lat}, {lon})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadside_core::models::{BreakdownType, GeoPoint, VehicleInfo};

    fn draft(urgency: i32) -> RequestDraft {
        RequestDraft {
            requester_name: "张三".to_string(),
            requester_phone: "13800000000".to_string(),
            breakdown_type: BreakdownType::Engine,
            description: "高速上熄火".to_string(),
            urgency,
            location: GeoPoint::new(39.9, 116.4),
            vehicle: VehicleInfo {
                make: "BYD".to_string(),
                model: "汉".to_string(),
                plate_number: "京A12345".to_string(),
            },
            station_id: None,
        }
    }

    #[test]
    fn test_validate_rejects_bad_drafts() {
        assert!(IntakeService::validate(&draft(5)).is_ok());

        let mut d = draft(5);
        d.requester_name = "  ".to_string();
        assert!(IntakeService::validate(&d).is_err());

        assert!(IntakeService::validate(&draft(11)).is_err());
        assert!(IntakeService::validate(&draft(-1)).is_err());

        let mut d = draft(5);
        d.location = GeoPoint::new(91.0, 0.0);
        assert!(IntakeService::validate(&d).is_err());
    }

    #[test]
    fn test_priority_combines_urgency_and_severity() {
        let config = DispatcherConfig::default();
        // ENGINE severity 30, urgency weight 10
        let engine_priority = 5 * config.urgency_priority_weight
            + BreakdownType::Engine.severity_weight();
        assert_eq!(engine_priority, 80);

        // 相同 urgency 下 ENGINE 比 TIRE 优先
        assert!(
            BreakdownType::Engine.severity_weight() > BreakdownType::Tire.severity_weight()
        );
    }
}
