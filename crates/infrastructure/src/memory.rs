use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use roadside_core::errors::{DispatchError, DispatchResult};
use roadside_core::models::{
    Intervention, Invoice, Mechanic, MechanicFilter, Request, RequestStatus,
};
use roadside_core::traits::{
    InterventionRepository, InvoiceRepository, MechanicRepository, NotificationPort,
    RequestRepository,
};

/// 内存版救援请求仓储
///
/// 嵌入式运行和集成测试使用，语义与关系型实现一致。
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, Request>>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }
}

impl Default for InMemoryRequestRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn create(&self, request: &Request) -> DispatchResult<()> {
        let mut map = self.requests.write().await;
        if map.contains_key(&request.id) {
            return Err(DispatchError::PersistenceFailure(format!(
                "请求 {} 已存在",
                request.id
            )));
        }
        map.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> DispatchResult<Option<Request>> {
        Ok(self.requests.read().await.get(id).cloned())
    }

    async fn load_pending(&self) -> DispatchResult<Vec<Request>> {
        let map = self.requests.read().await;
        Ok(map
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn load_assigned_before(&self, cutoff: DateTime<Utc>) -> DispatchResult<Vec<Request>> {
        let map = self.requests.read().await;
        Ok(map
            .values()
            .filter(|r| {
                r.status == RequestStatus::Assigned
                    && r.assigned_at.map_or(false, |at| at < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn save_transition(&self, request: &Request) -> DispatchResult<()> {
        let mut map = self.requests.write().await;
        if !map.contains_key(&request.id) {
            return Err(DispatchError::RequestNotFound {
                id: request.id.clone(),
            });
        }
        map.insert(request.id.clone(), request.clone());
        Ok(())
    }
}

/// 内存版技师仓储
pub struct InMemoryMechanicRepository {
    mechanics: RwLock<HashMap<String, Mechanic>>,
}

impl InMemoryMechanicRepository {
    pub fn new() -> Self {
        Self {
            mechanics: RwLock::new(HashMap::new()),
        }
    }

    /// 预置技师（启动装载或测试夹具）
    pub async fn seed(&self, mechanic: Mechanic) {
        let mut map = self.mechanics.write().await;
        map.insert(mechanic.id.clone(), mechanic);
    }
}

impl Default for InMemoryMechanicRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MechanicRepository for InMemoryMechanicRepository {
    async fn get_by_id(&self, id: &str) -> DispatchResult<Option<Mechanic>> {
        Ok(self.mechanics.read().await.get(id).cloned())
    }

    async fn load_available(&self, filter: &MechanicFilter) -> DispatchResult<Vec<Mechanic>> {
        let map = self.mechanics.read().await;
        Ok(map
            .values()
            .filter(|m| !filter.only_available || m.is_available)
            .filter(|m| {
                filter
                    .specialty
                    .map_or(true, |s| m.can_handle(s))
            })
            .filter(|m| {
                filter
                    .station_id
                    .as_ref()
                    .map_or(true, |s| &m.station_id == s)
            })
            .cloned()
            .collect())
    }

    async fn load_all(&self) -> DispatchResult<Vec<Mechanic>> {
        Ok(self.mechanics.read().await.values().cloned().collect())
    }

    async fn set_available(&self, id: &str, available: bool) -> DispatchResult<()> {
        let mut map = self.mechanics.write().await;
        match map.get_mut(id) {
            Some(mechanic) => {
                mechanic.is_available = available;
                Ok(())
            }
            None => Err(DispatchError::MechanicNotFound { id: id.to_string() }),
        }
    }
}

/// 内存版维修记录仓储
pub struct InMemoryInterventionRepository {
    by_request: RwLock<HashMap<String, Vec<Intervention>>>,
}

impl InMemoryInterventionRepository {
    pub fn new() -> Self {
        Self {
            by_request: RwLock::new(HashMap::new()),
        }
    }

    /// 追加一条维修记录
    pub async fn add(&self, intervention: Intervention) {
        let mut map = self.by_request.write().await;
        map.entry(intervention.request_id.clone())
            .or_default()
            .push(intervention);
    }
}

impl Default for InMemoryInterventionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterventionRepository for InMemoryInterventionRepository {
    async fn list_by_request(&self, request_id: &str) -> DispatchResult<Vec<Intervention>> {
        let map = self.by_request.read().await;
        Ok(map.get(request_id).cloned().unwrap_or_default())
    }
}

/// 内存版发票仓储
///
/// 请求与发票一比一，重复开票在这里被拒绝。
pub struct InMemoryInvoiceRepository {
    by_request: RwLock<HashMap<String, Invoice>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self {
            by_request: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryInvoiceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn create(&self, invoice: &Invoice) -> DispatchResult<()> {
        let mut map = self.by_request.write().await;
        if map.contains_key(&invoice.request_id) {
            return Err(DispatchError::InvoiceExists {
                request_id: invoice.request_id.clone(),
            });
        }
        map.insert(invoice.request_id.clone(), invoice.clone());
        Ok(())
    }

    async fn get_by_request(&self, request_id: &str) -> DispatchResult<Option<Invoice>> {
        Ok(self.by_request.read().await.get(request_id).cloned())
    }
}

/// 日志通知器
///
/// 嵌入式运行时的 NotificationPort 实现，把通知写进结构化日志。
pub struct LoggingNotifier;

#[async_trait]
impl NotificationPort for LoggingNotifier {
    async fn notify_assigned(&self, request_id: &str, mechanic_id: &str) -> DispatchResult<()> {
        info!("通知：请求 {} 已分配技师 {}", request_id, mechanic_id);
        Ok(())
    }

    async fn notify_status_changed(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> DispatchResult<()> {
        info!("通知：请求 {} 状态变更为 {:?}", request_id, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use roadside_core::models::{BreakdownType, GeoPoint, RequestDraft, VehicleInfo};

    fn request(status: RequestStatus) -> Request {
        let draft = RequestDraft {
            requester_name: "李四".to_string(),
            requester_phone: "13900000000".to_string(),
            breakdown_type: BreakdownType::Battery,
            description: "打不着火".to_string(),
            urgency: 3,
            location: GeoPoint::new(31.2, 121.5),
            vehicle: VehicleInfo {
                make: "Tesla".to_string(),
                model: "Model 3".to_string(),
                plate_number: "沪B67890".to_string(),
            },
            station_id: None,
        };
        let mut r = Request::from_draft(draft, 40);
        r.status = status;
        r
    }

    #[tokio::test]
    async fn test_request_repo_create_and_pending_scan() {
        let repo = InMemoryRequestRepository::new();
        let r = request(RequestStatus::Pending);
        repo.create(&r).await.unwrap();

        assert!(repo.create(&r).await.is_err(), "重复创建被拒绝");
        assert_eq!(repo.load_pending().await.unwrap().len(), 1);
        assert!(repo.get_by_id(&r.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_request_repo_assigned_before_cutoff() {
        let repo = InMemoryRequestRepository::new();

        let mut stale = request(RequestStatus::Assigned);
        stale.assigned_at = Some(Utc::now() - Duration::minutes(10));
        repo.create(&stale).await.unwrap();

        let mut fresh = request(RequestStatus::Assigned);
        fresh.assigned_at = Some(Utc::now());
        repo.create(&fresh).await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(5);
        let expired = repo.load_assigned_before(cutoff).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
    }

    #[tokio::test]
    async fn test_save_transition_requires_existing() {
        let repo = InMemoryRequestRepository::new();
        let r = request(RequestStatus::Pending);
        assert!(matches!(
            repo.save_transition(&r).await,
            Err(DispatchError::RequestNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_mechanic_repo_filters() {
        use std::collections::HashSet;

        let repo = InMemoryMechanicRepository::new();
        repo.seed(Mechanic {
            id: "m-1".to_string(),
            name: "王师傅".to_string(),
            location: None,
            specialties: HashSet::from([BreakdownType::Tire]),
            is_available: true,
            station_id: "s-1".to_string(),
            user_id: None,
        })
        .await;
        repo.seed(Mechanic {
            id: "m-2".to_string(),
            name: "赵师傅".to_string(),
            location: None,
            specialties: HashSet::from([BreakdownType::Engine]),
            is_available: false,
            station_id: "s-2".to_string(),
            user_id: None,
        })
        .await;

        let filter = MechanicFilter {
            specialty: Some(BreakdownType::Tire),
            station_id: None,
            only_available: true,
        };
        let found = repo.load_available(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "m-1");

        repo.set_available("m-2", true).await.unwrap();
        let filter = MechanicFilter {
            specialty: None,
            station_id: Some("s-2".to_string()),
            only_available: true,
        };
        assert_eq!(repo.load_available(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoice_repo_rejects_second_invoice() {
        let repo = InMemoryInvoiceRepository::new();
        let invoice = Invoice::from_interventions("req-1", &[], 0.2);
        repo.create(&invoice).await.unwrap();

        let again = Invoice::from_interventions("req-1", &[], 0.2);
        assert!(matches!(
            repo.create(&again).await,
            Err(DispatchError::InvoiceExists { .. })
        ));
        assert!(repo.get_by_request("req-1").await.unwrap().is_some());
    }
}
