use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use roadside_core::errors::{DispatchError, DispatchResult};
use roadside_core::models::{Invoice, Request, RequestStatus};
use roadside_core::traits::{InvoiceRepository, NotificationPort, RequestRepository};

/// 可注入故障的请求仓储包装器
///
/// 包装真实仓储，按开关让 `save_transition` 失败，用于验证分配
/// 持久化失败时的认领回滚路径。
pub struct FailingRequestRepository {
    inner: Arc<dyn RequestRepository>,
    fail_save: AtomicBool,
}

impl FailingRequestRepository {
    pub fn wrap(inner: Arc<dyn RequestRepository>) -> Self {
        Self {
            inner,
            fail_save: AtomicBool::new(false),
        }
    }

    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestRepository for FailingRequestRepository {
    async fn create(&self, request: &Request) -> DispatchResult<()> {
        self.inner.create(request).await
    }

    async fn get_by_id(&self, id: &str) -> DispatchResult<Option<Request>> {
        self.inner.get_by_id(id).await
    }

    async fn load_pending(&self) -> DispatchResult<Vec<Request>> {
        self.inner.load_pending().await
    }

    async fn load_assigned_before(&self, cutoff: DateTime<Utc>) -> DispatchResult<Vec<Request>> {
        self.inner.load_assigned_before(cutoff).await
    }

    async fn save_transition(&self, request: &Request) -> DispatchResult<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(DispatchError::PersistenceFailure(
                "注入的持久化故障".to_string(),
            ));
        }
        self.inner.save_transition(request).await
    }
}

/// 可注入保存延迟的请求仓储包装器
///
/// 让 `save_transition` 在委托前挂起指定时长，用于制造读-改-写
/// 窗口内的并发转换。
pub struct SlowSaveRequestRepository {
    inner: Arc<dyn RequestRepository>,
    save_delay_ms: AtomicU64,
}

impl SlowSaveRequestRepository {
    pub fn wrap(inner: Arc<dyn RequestRepository>) -> Self {
        Self {
            inner,
            save_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_save_delay(&self, delay: Duration) {
        self.save_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestRepository for SlowSaveRequestRepository {
    async fn create(&self, request: &Request) -> DispatchResult<()> {
        self.inner.create(request).await
    }

    async fn get_by_id(&self, id: &str) -> DispatchResult<Option<Request>> {
        self.inner.get_by_id(id).await
    }

    async fn load_pending(&self) -> DispatchResult<Vec<Request>> {
        self.inner.load_pending().await
    }

    async fn load_assigned_before(&self, cutoff: DateTime<Utc>) -> DispatchResult<Vec<Request>> {
        self.inner.load_assigned_before(cutoff).await
    }

    async fn save_transition(&self, request: &Request) -> DispatchResult<()> {
        let delay = self.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.save_transition(request).await
    }
}

/// 可注入故障的发票仓储包装器
pub struct FailingInvoiceRepository {
    inner: Arc<dyn InvoiceRepository>,
    fail_create: AtomicBool,
}

impl FailingInvoiceRepository {
    pub fn wrap(inner: Arc<dyn InvoiceRepository>) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl InvoiceRepository for FailingInvoiceRepository {
    async fn create(&self, invoice: &Invoice) -> DispatchResult<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DispatchError::PersistenceFailure(
                "注入的开票故障".to_string(),
            ));
        }
        self.inner.create(invoice).await
    }

    async fn get_by_request(&self, request_id: &str) -> DispatchResult<Option<Invoice>> {
        self.inner.get_by_request(request_id).await
    }
}

/// 通知记录
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationRecord {
    Assigned {
        request_id: String,
        mechanic_id: String,
    },
    StatusChanged {
        request_id: String,
        status: RequestStatus,
    },
}

/// 记录型通知器
///
/// 把所有通知留存在内存里供测试断言，可注入发送故障。
pub struct RecordingNotifier {
    records: Mutex<Vec<NotificationRecord>>,
    fail_all: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_all: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn assigned_count(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, NotificationRecord::Assigned { .. }))
            .count()
    }

    pub fn status_changes_for(&self, request_id: &str) -> Vec<RequestStatus> {
        self.records()
            .iter()
            .filter_map(|r| match r {
                NotificationRecord::StatusChanged {
                    request_id: id,
                    status,
                } if id == request_id => Some(*status),
                _ => None,
            })
            .collect()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn notify_assigned(&self, request_id: &str, mechanic_id: &str) -> DispatchResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(DispatchError::Notification("注入的通知故障".to_string()));
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NotificationRecord::Assigned {
                request_id: request_id.to_string(),
                mechanic_id: mechanic_id.to_string(),
            });
        Ok(())
    }

    async fn notify_status_changed(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> DispatchResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(DispatchError::Notification("注入的通知故障".to_string()));
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NotificationRecord::StatusChanged {
                request_id: request_id.to_string(),
                status,
            });
        Ok(())
    }
}
