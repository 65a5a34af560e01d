use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::request::{BreakdownType, GeoPoint};

/// 救援技师
///
/// `is_available` 是技师能否被匹配的唯一事实来源。调度期间只有
/// AvailabilityRegistry 修改它，持久化层仅做镜像。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mechanic {
    pub id: String,
    pub name: String,
    /// 当前位置，离线或未上报时为空
    pub location: Option<GeoPoint>,
    /// 能处理的故障类型集合
    pub specialties: HashSet<BreakdownType>,
    pub is_available: bool,
    pub station_id: String,
    /// 关联的登录账号（可选）
    pub user_id: Option<String>,
}

impl Mechanic {
    /// 是否能承接该故障类型
    ///
    /// 持有 OTHER 标签的技师视为全科，可承接任意故障；精确匹配与否
    /// 由匹配打分区分。
    pub fn can_handle(&self, breakdown_type: BreakdownType) -> bool {
        self.specialties.contains(&breakdown_type)
            || self.specialties.contains(&BreakdownType::Other)
    }

    /// 是否精确具备该故障类型的专长
    pub fn has_specialty(&self, breakdown_type: BreakdownType) -> bool {
        self.specialties.contains(&breakdown_type)
    }
}

/// 服务站
///
/// 拥有一批技师的站点，请求未指定技师时作为匹配范围的回退。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
}

/// 技师查询过滤器
#[derive(Debug, Clone, Default)]
pub struct MechanicFilter {
    pub specialty: Option<BreakdownType>,
    pub station_id: Option<String>,
    pub only_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mechanic_with(specialties: &[BreakdownType]) -> Mechanic {
        Mechanic {
            id: "m-1".to_string(),
            name: "李强".to_string(),
            location: Some(GeoPoint::new(40.0, -73.0)),
            specialties: specialties.iter().copied().collect(),
            is_available: true,
            station_id: "s-1".to_string(),
            user_id: None,
        }
    }

    #[test]
    fn test_can_handle() {
        let m = mechanic_with(&[BreakdownType::Tire, BreakdownType::Battery]);
        assert!(m.can_handle(BreakdownType::Tire));
        assert!(!m.can_handle(BreakdownType::Engine));
    }

    #[test]
    fn test_other_tag_is_generalist() {
        let m = mechanic_with(&[BreakdownType::Other]);
        assert!(m.can_handle(BreakdownType::Engine));
        assert!(!m.has_specialty(BreakdownType::Engine));
    }

    #[test]
    fn test_mechanic_serde_schema_names() {
        let m = mechanic_with(&[BreakdownType::Tire]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["isAvailable"], true);
        assert_eq!(json["stationId"], "s-1");
        assert_eq!(json["specialties"][0], "TIRE");
    }
}
