use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 地理坐标点（WGS84 经纬度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// 计算到另一点的大圆距离（公里）
    ///
    /// 使用 haversine 公式而不是平面近似，救援覆盖范围可达数十公里，
    /// 平面近似在该尺度上误差明显。
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

/// 故障类型
///
/// 请求携带的故障分类标签，用于匹配技师的专长。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BreakdownType {
    #[serde(rename = "MECHANICAL")]
    Mechanical,
    #[serde(rename = "ELECTRICAL")]
    Electrical,
    #[serde(rename = "TIRE")]
    Tire,
    #[serde(rename = "BATTERY")]
    Battery,
    #[serde(rename = "ENGINE")]
    Engine,
    #[serde(rename = "TRANSMISSION")]
    Transmission,
    #[serde(rename = "BRAKES")]
    Brakes,
    #[serde(rename = "OTHER")]
    Other,
}

impl BreakdownType {
    /// 故障类型的严重度权重，参与初始优先级计算
    ///
    /// 动力相关故障（发动机、变速箱、刹车）车辆完全无法行驶或存在安全
    /// 风险，权重高于轮胎、电瓶这类可短暂等待的故障。
    pub fn severity_weight(&self) -> i32 {
        match self {
            BreakdownType::Engine => 30,
            BreakdownType::Transmission => 28,
            BreakdownType::Brakes => 25,
            BreakdownType::Mechanical => 20,
            BreakdownType::Electrical => 15,
            BreakdownType::Battery => 10,
            BreakdownType::Tire => 8,
            BreakdownType::Other => 5,
        }
    }
}

/// 救援请求状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ASSIGNED")]
    Assigned,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl RequestStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// 状态转换合法性检查
    ///
    /// 正向流转单调递进；CANCELLED 可从任意非终止状态到达；
    /// ASSIGNED/IN_PROGRESS 在分配失败（超时、技师无法继续）时可回退
    /// 到 PENDING 重新排队。
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, to) {
            (Pending, Assigned) => true,
            (Assigned, InProgress) => true,
            (InProgress, Completed) => true,
            (Assigned, Pending) | (InProgress, Pending) => true,
            (Pending, Cancelled) | (Assigned, Cancelled) | (InProgress, Cancelled) => true,
            _ => false,
        }
    }
}

/// 车辆信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    pub make: String,
    pub model: String,
    pub plate_number: String,
}

/// 救援请求
///
/// 一次道路故障报修。由接入层以 PENDING 状态创建，状态、时间戳、
/// 技师/服务站关联字段只由调度引擎（或外部取消操作）修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,
    pub requester_name: String,
    pub requester_phone: String,
    pub breakdown_type: BreakdownType,
    pub description: String,
    /// 报修人自报的紧急程度
    pub urgency: i32,
    pub location: GeoPoint,
    pub vehicle: VehicleInfo,
    pub status: RequestStatus,
    /// 引擎计算的调度优先级，区别于 urgency
    pub priority: i32,
    /// 分配失败重新排队的次数
    pub retry_count: i32,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub mechanic_id: Option<String>,
    pub station_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Request {
    /// 从报修草稿创建新请求，priority 由接入服务计算
    pub fn from_draft(draft: RequestDraft, priority: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requester_name: draft.requester_name,
            requester_phone: draft.requester_phone,
            breakdown_type: draft.breakdown_type,
            description: draft.description,
            urgency: draft.urgency,
            location: draft.location,
            vehicle: draft.vehicle,
            status: RequestStatus::Pending,
            priority,
            retry_count: 0,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            mechanic_id: None,
            station_id: draft.station_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 报修草稿，接入 API 的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDraft {
    pub requester_name: String,
    pub requester_phone: String,
    pub breakdown_type: BreakdownType,
    pub description: String,
    pub urgency: i32,
    pub location: GeoPoint,
    pub vehicle: VehicleInfo,
    /// 请求方指定的服务站（可选）
    pub station_id: Option<String>,
}

/// 请求查询过滤器
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub breakdown_type: Option<BreakdownType>,
    pub station_id: Option<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // 巴黎 -> 伦敦，约343公里
        let paris = GeoPoint::new(48.8566, 2.3522);
        let london = GeoPoint::new(51.5074, -0.1278);
        let d = paris.haversine_km(&london);
        assert!((d - 343.0).abs() < 5.0, "distance was {d}");
    }

    #[test]
    fn test_haversine_zero_distance() {
        let p = GeoPoint::new(40.0, -73.0);
        assert!(p.haversine_km(&p) < 1e-9);
    }

    #[test]
    fn test_status_transitions() {
        use RequestStatus::*;
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));

        // 重新排队路径
        assert!(Assigned.can_transition_to(Pending));
        assert!(InProgress.can_transition_to(Pending));

        // 取消可以从任意非终止状态到达
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Assigned.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));

        // 终止状态不再流转
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Cancelled));

        // 不允许跳级
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Assigned.can_transition_to(Completed));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(
            BreakdownType::Engine.severity_weight() > BreakdownType::Tire.severity_weight()
        );
        assert!(
            BreakdownType::Brakes.severity_weight() > BreakdownType::Battery.severity_weight()
        );
    }

    #[test]
    fn test_request_serde_schema_names() {
        let draft = RequestDraft {
            requester_name: "张伟".to_string(),
            requester_phone: "+33600000000".to_string(),
            breakdown_type: BreakdownType::Tire,
            description: "爆胎".to_string(),
            urgency: 3,
            location: GeoPoint::new(40.0, -73.0),
            vehicle: VehicleInfo {
                make: "Renault".to_string(),
                model: "Clio".to_string(),
                plate_number: "AB-123-CD".to_string(),
            },
            station_id: None,
        };
        let request = Request::from_draft(draft, 38);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["breakdownType"], "TIRE");
        assert!(json["assignedAt"].is_null());
        assert!(json.get("requesterName").is_some());
        assert!(json.get("requester_name").is_none());
    }
}
