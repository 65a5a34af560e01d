use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DispatchResult;
use crate::models::{Intervention, Invoice, Mechanic, MechanicFilter, Request};

/// 救援请求仓储接口
///
/// 抽象关系型存储，核心从不直接发SQL。引擎只通过 `save_transition`
/// 写回自己拥有的字段（状态、时间戳、技师/服务站关联）。
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// 创建新请求
    async fn create(&self, request: &Request) -> DispatchResult<()>;

    /// 按ID查询请求
    async fn get_by_id(&self, id: &str) -> DispatchResult<Option<Request>>;

    /// 加载所有 PENDING 状态的请求（启动恢复时使用）
    async fn load_pending(&self) -> DispatchResult<Vec<Request>>;

    /// 加载在 cutoff 之前进入 ASSIGNED 且仍未确认的请求
    async fn load_assigned_before(&self, cutoff: DateTime<Utc>) -> DispatchResult<Vec<Request>>;

    /// 持久化一次状态转换后的完整请求
    async fn save_transition(&self, request: &Request) -> DispatchResult<()>;
}

/// 技师仓储接口
#[async_trait]
pub trait MechanicRepository: Send + Sync {
    /// 按ID查询技师
    async fn get_by_id(&self, id: &str) -> DispatchResult<Option<Mechanic>>;

    /// 按过滤条件加载可用技师
    async fn load_available(&self, filter: &MechanicFilter) -> DispatchResult<Vec<Mechanic>>;

    /// 加载全部技师（引擎启动时同步花名册）
    async fn load_all(&self) -> DispatchResult<Vec<Mechanic>>;

    /// 镜像写回可用状态
    ///
    /// 调度期间内存中的 AvailabilityRegistry 才是事实来源，这里只是
    /// 持久化镜像。
    async fn set_available(&self, id: &str, available: bool) -> DispatchResult<()>;
}

/// 维修记录仓储接口
#[async_trait]
pub trait InterventionRepository: Send + Sync {
    /// 列出请求关联的全部维修记录
    async fn list_by_request(&self, request_id: &str) -> DispatchResult<Vec<Intervention>>;
}

/// 发票仓储接口
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// 创建发票，同一请求已有发票时返回 InvoiceExists
    async fn create(&self, invoice: &Invoice) -> DispatchResult<()>;

    /// 查询请求对应的发票
    async fn get_by_request(&self, request_id: &str) -> DispatchResult<Option<Invoice>>;
}
