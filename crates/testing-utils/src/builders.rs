use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use roadside_core::models::{
    BreakdownType, GeoPoint, Intervention, Mechanic, Request, RequestStatus, VehicleInfo,
};

/// 救援请求构建器
///
/// 测试夹具，默认值是一张合法的 PENDING 请求，按需覆盖个别字段。
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            request: Request {
                id: Uuid::new_v4().to_string(),
                requester_name: "测试用户".to_string(),
                requester_phone: "13800000000".to_string(),
                breakdown_type: BreakdownType::Tire,
                description: "爆胎".to_string(),
                urgency: 5,
                location: GeoPoint::new(40.0, -73.0),
                vehicle: VehicleInfo {
                    make: "Toyota".to_string(),
                    model: "Corolla".to_string(),
                    plate_number: "测A00000".to_string(),
                },
                status: RequestStatus::Pending,
                priority: 58,
                retry_count: 0,
                assigned_at: None,
                started_at: None,
                completed_at: None,
                mechanic_id: None,
                station_id: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.request.id = id.to_string();
        self
    }

    pub fn with_breakdown_type(mut self, breakdown_type: BreakdownType) -> Self {
        self.request.breakdown_type = breakdown_type;
        self
    }

    pub fn with_urgency(mut self, urgency: i32) -> Self {
        self.request.urgency = urgency;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.request.priority = priority;
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.request.location = GeoPoint::new(latitude, longitude);
        self
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.request.status = status;
        self
    }

    pub fn with_mechanic(mut self, mechanic_id: &str) -> Self {
        self.request.mechanic_id = Some(mechanic_id.to_string());
        self
    }

    pub fn with_station(mut self, station_id: &str) -> Self {
        self.request.station_id = Some(station_id.to_string());
        self
    }

    pub fn with_assigned_at(mut self, at: DateTime<Utc>) -> Self {
        self.request.assigned_at = Some(at);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.request.created_at = at;
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 技师构建器
pub struct MechanicBuilder {
    mechanic: Mechanic,
}

impl MechanicBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            mechanic: Mechanic {
                id: id.to_string(),
                name: format!("技师-{id}"),
                location: Some(GeoPoint::new(40.0, -73.0)),
                specialties: HashSet::from([BreakdownType::Tire]),
                is_available: true,
                station_id: "station-1".to_string(),
                user_id: None,
            },
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.mechanic.location = Some(GeoPoint::new(latitude, longitude));
        self
    }

    pub fn without_location(mut self) -> Self {
        self.mechanic.location = None;
        self
    }

    pub fn with_specialties(mut self, specialties: &[BreakdownType]) -> Self {
        self.mechanic.specialties = specialties.iter().copied().collect();
        self
    }

    pub fn with_station(mut self, station_id: &str) -> Self {
        self.mechanic.station_id = station_id.to_string();
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.mechanic.is_available = false;
        self
    }

    pub fn build(self) -> Mechanic {
        self.mechanic
    }
}

/// 维修记录构建器
pub struct InterventionBuilder {
    intervention: Intervention,
}

impl InterventionBuilder {
    pub fn new(request_id: &str) -> Self {
        Self {
            intervention: Intervention {
                id: Uuid::new_v4().to_string(),
                request_id: request_id.to_string(),
                mechanic_id: "mechanic-1".to_string(),
                time_spent_minutes: 30,
                parts_cost: 100.0,
                labor_cost: 50.0,
                notes: String::new(),
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_mechanic(mut self, mechanic_id: &str) -> Self {
        self.intervention.mechanic_id = mechanic_id.to_string();
        self
    }

    pub fn with_costs(mut self, parts_cost: f64, labor_cost: f64) -> Self {
        self.intervention.parts_cost = parts_cost;
        self.intervention.labor_cost = labor_cost;
        self
    }

    pub fn with_time_spent(mut self, minutes: i32) -> Self {
        self.intervention.time_spent_minutes = minutes;
        self
    }

    pub fn build(self) -> Intervention {
        self.intervention
    }
}
