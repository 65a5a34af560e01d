use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics::counter;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use roadside_core::errors::{DispatchError, DispatchResult};
use roadside_core::models::{Invoice, Request, RequestStatus};
use roadside_core::traits::{
    InterventionRepository, InvoiceRepository, MechanicRepository, NotificationPort,
    RequestRepository,
};

use crate::availability::AvailabilityRegistry;
use crate::queue::{DispatchQueue, DispatchTicket};

/// 请求生命周期管理
///
/// 状态机 PENDING → ASSIGNED → IN_PROGRESS → COMPLETED 的唯一写入口，
/// 取消和超时回退也经由这里。每次转换先校验合法性，再持久化完整
/// 请求，最后做可用性登记和尽力而为的通知。同一请求的转换按请求ID
/// 串行执行，读-改-写之间不会被并发的取消或回退插入覆盖。
pub struct RequestLifecycle {
    request_repo: Arc<dyn RequestRepository>,
    mechanic_repo: Arc<dyn MechanicRepository>,
    intervention_repo: Arc<dyn InterventionRepository>,
    invoice_repo: Arc<dyn InvoiceRepository>,
    notifier: Arc<dyn NotificationPort>,
    availability: Arc<AvailabilityRegistry>,
    queue: Arc<DispatchQueue>,
    tax_rate: f64,
    /// 请求ID -> 转换互斥锁，终态转换成功后移除条目
    transition_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RequestLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_repo: Arc<dyn RequestRepository>,
        mechanic_repo: Arc<dyn MechanicRepository>,
        intervention_repo: Arc<dyn InterventionRepository>,
        invoice_repo: Arc<dyn InvoiceRepository>,
        notifier: Arc<dyn NotificationPort>,
        availability: Arc<AvailabilityRegistry>,
        queue: Arc<DispatchQueue>,
        tax_rate: f64,
    ) -> Self {
        Self {
            request_repo,
            mechanic_repo,
            intervention_repo,
            invoice_repo,
            notifier,
            availability,
            queue,
            tax_rate,
            transition_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 取得请求的转换互斥锁，整个转换（加载、校验、保存）都在锁内
    async fn serialize(&self, request_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self
                .transition_locks
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                map.entry(request_id.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// 请求进入终态后锁条目不再有意义。已排队的等待者持有各自的
    /// Arc，不受移除影响；之后的转换在新锁上校验时会直接被拒绝。
    fn discard_lock(&self, request_id: &str) {
        self.transition_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(request_id);
    }

    async fn load(&self, request_id: &str) -> DispatchResult<Request> {
        self.request_repo
            .get_by_id(request_id)
            .await?
            .ok_or_else(|| DispatchError::RequestNotFound {
                id: request_id.to_string(),
            })
    }

    fn ensure_transition(request: &Request, to: RequestStatus) -> DispatchResult<()> {
        if !request.status.can_transition_to(to) {
            return Err(DispatchError::InvalidTransition {
                from: request.status,
                to,
            });
        }
        Ok(())
    }

    /// PENDING → ASSIGNED
    ///
    /// 调用方（AssignmentCoordinator）已经通过注册表占住了技师；这里
    /// 只负责持久化关联。持久化失败时由调用方释放占用。取消优先：
    /// 请求已经不在 PENDING 时返回 InvalidTransition。
    pub async fn mark_assigned(
        &self,
        request_id: &str,
        mechanic_id: &str,
        station_id: &str,
    ) -> DispatchResult<Request> {
        let _guard = self.serialize(request_id).await;
        let mut request = self.load(request_id).await?;
        Self::ensure_transition(&request, RequestStatus::Assigned)?;

        request.status = RequestStatus::Assigned;
        request.mechanic_id = Some(mechanic_id.to_string());
        request.station_id = Some(station_id.to_string());
        request.assigned_at = Some(Utc::now());
        self.request_repo.save_transition(&request).await?;

        // 持久化镜像，注册表才是事实来源
        if let Err(e) = self.mechanic_repo.set_available(mechanic_id, false).await {
            warn!("技师 {} 可用状态镜像写回失败: {}", mechanic_id, e);
        }
        if let Err(e) = self.notifier.notify_assigned(request_id, mechanic_id).await {
            warn!("请求 {} 分配通知发送失败: {}", request_id, e);
        }

        info!("请求 {} 已分配给技师 {}", request_id, mechanic_id);
        Ok(request)
    }

    /// ASSIGNED → IN_PROGRESS，技师确认到场开工
    pub async fn mark_in_progress(&self, request_id: &str) -> DispatchResult<Request> {
        let _guard = self.serialize(request_id).await;
        let mut request = self.load(request_id).await?;
        Self::ensure_transition(&request, RequestStatus::InProgress)?;

        request.status = RequestStatus::InProgress;
        request.started_at = Some(Utc::now());
        self.request_repo.save_transition(&request).await?;

        self.notify_status(request_id, RequestStatus::InProgress).await;
        info!("请求 {} 开始处理", request_id);
        Ok(request)
    }

    /// IN_PROGRESS → COMPLETED
    ///
    /// 释放技师并根据维修记录开票。请求没有任何维修记录时仍然开出
    /// 零金额发票，保持请求与发票一比一。已完成且发票在册时重复调用
    /// 返回 InvalidTransition；已完成但发票缺失（上次开票失败）时
    /// 允许再次调用补开，状态不会二次写入。
    pub async fn mark_completed(&self, request_id: &str) -> DispatchResult<Invoice> {
        let _guard = self.serialize(request_id).await;
        let mut request = self.load(request_id).await?;

        if request.status == RequestStatus::Completed {
            if self.invoice_repo.get_by_request(request_id).await?.is_some() {
                return Err(DispatchError::InvalidTransition {
                    from: RequestStatus::Completed,
                    to: RequestStatus::Completed,
                });
            }
            warn!("请求 {} 已完成但发票缺失，补开发票", request_id);
        } else {
            Self::ensure_transition(&request, RequestStatus::Completed)?;

            request.status = RequestStatus::Completed;
            request.completed_at = Some(Utc::now());
            self.request_repo.save_transition(&request).await?;

            if let Some(mechanic_id) = &request.mechanic_id {
                self.release_mechanic(mechanic_id).await;
            }
        }

        let interventions = self.intervention_repo.list_by_request(request_id).await?;
        if interventions.is_empty() {
            debug!("请求 {} 没有维修记录，开零金额发票", request_id);
        }
        let invoice = Invoice::from_interventions(request_id, &interventions, self.tax_rate);
        self.invoice_repo.create(&invoice).await?;

        self.notify_status(request_id, RequestStatus::Completed).await;
        counter!("roadside_completions_total").increment(1);
        info!(
            "请求 {} 已完成，发票 {} 总额 {:.2}",
            request_id, invoice.id, invoice.total_amount
        );
        self.discard_lock(request_id);
        Ok(invoice)
    }

    /// 取消请求
    ///
    /// 对已取消的请求幂等（不会二次释放技师），对已完成的请求返回
    /// InvalidTransition。已分配或处理中的请求取消时释放技师。
    pub async fn cancel(&self, request_id: &str) -> DispatchResult<Request> {
        let _guard = self.serialize(request_id).await;
        let mut request = self.load(request_id).await?;
        if request.status == RequestStatus::Cancelled {
            debug!("请求 {} 已是取消状态，跳过", request_id);
            self.discard_lock(request_id);
            return Ok(request);
        }
        Self::ensure_transition(&request, RequestStatus::Cancelled)?;

        let claimed = request.mechanic_id.clone();
        request.status = RequestStatus::Cancelled;
        self.request_repo.save_transition(&request).await?;

        if let Some(mechanic_id) = &claimed {
            self.release_mechanic(mechanic_id).await;
        }

        self.notify_status(request_id, RequestStatus::Cancelled).await;
        counter!("roadside_cancellations_total").increment(1);
        info!("请求 {} 已取消", request_id);
        self.discard_lock(request_id);
        Ok(request)
    }

    /// 回退到 PENDING 并重新排队
    ///
    /// 用于确认超时和技师主动报告无法处理。清除技师关联、释放占用、
    /// 重试计数加一，然后带退避延迟重新入队。
    pub async fn requeue(&self, request_id: &str, reason: &str) -> DispatchResult<Request> {
        let _guard = self.serialize(request_id).await;
        let mut request = self.load(request_id).await?;
        Self::ensure_transition(&request, RequestStatus::Pending)?;

        let claimed = request.mechanic_id.take();
        request.station_id = None;
        request.assigned_at = None;
        request.started_at = None;
        request.status = RequestStatus::Pending;
        // schedule_requeue 负责把票据的尝试次数加一
        let ticket = DispatchTicket::from_request(&request);
        request.retry_count += 1;
        self.request_repo.save_transition(&request).await?;

        if let Some(mechanic_id) = &claimed {
            self.release_mechanic(mechanic_id).await;
        }

        warn!("请求 {} 回退重新排队: {}", request_id, reason);
        self.queue.schedule_requeue(ticket);
        Ok(request)
    }

    async fn release_mechanic(&self, mechanic_id: &str) {
        self.availability.release(mechanic_id);
        if let Err(e) = self.mechanic_repo.set_available(mechanic_id, true).await {
            warn!("技师 {} 可用状态镜像写回失败: {}", mechanic_id, e);
        }
    }

    async fn notify_status(&self, request_id: &str, status: RequestStatus) {
        if let Err(e) = self.notifier.notify_status_changed(request_id, status).await {
            warn!("请求 {} 状态变更通知发送失败: {}", request_id, e);
        }
    }
}
