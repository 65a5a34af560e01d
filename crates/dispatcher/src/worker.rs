use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use roadside_core::config::DispatcherConfig;
use roadside_core::errors::DispatchError;
use roadside_core::models::RequestStatus;
use roadside_core::traits::{NotificationPort, RequestRepository};

use crate::coordinator::{AssignmentCoordinator, AssignmentResult};
use crate::lifecycle::RequestLifecycle;
use crate::queue::{DispatchQueue, DispatchTicket};

/// 调度 worker
///
/// 从队列取票据、重新加载请求、驱动一次分配。多个 worker 并发运行，
/// 请求级的互斥由状态机转换校验保证，技师级的互斥由注册表认领
/// 保证。
pub struct DispatchWorker {
    worker_id: usize,
    queue: Arc<DispatchQueue>,
    request_repo: Arc<dyn RequestRepository>,
    coordinator: Arc<AssignmentCoordinator>,
    notifier: Arc<dyn NotificationPort>,
    config: DispatcherConfig,
}

impl DispatchWorker {
    pub fn new(
        worker_id: usize,
        queue: Arc<DispatchQueue>,
        request_repo: Arc<dyn RequestRepository>,
        coordinator: Arc<AssignmentCoordinator>,
        notifier: Arc<dyn NotificationPort>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            worker_id,
            queue,
            request_repo,
            coordinator,
            notifier,
            config,
        }
    }

    /// worker 主循环，收到关闭信号或队列关闭排空后退出
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("调度worker {} 启动", self.worker_id);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("调度worker {} 收到关闭信号", self.worker_id);
                    break;
                }
                maybe_ticket = self.queue.pop() => {
                    match maybe_ticket {
                        Some(ticket) => self.handle_ticket(ticket).await,
                        None => {
                            info!("调度worker {} 队列已关闭", self.worker_id);
                            break;
                        }
                    }
                }
            }
        }

        info!("调度worker {} 退出", self.worker_id);
    }

    async fn handle_ticket(&self, ticket: DispatchTicket) {
        let started = Instant::now();

        // 票据可能过期，以仓储里的最新状态为准
        let request = match self.request_repo.get_by_id(&ticket.request_id).await {
            Ok(Some(r)) => r,
            Ok(None) => {
                warn!("票据指向不存在的请求 {}，丢弃", ticket.request_id);
                return;
            }
            Err(e) => {
                error!("加载请求 {} 失败: {}", ticket.request_id, e);
                self.retry_or_give_up(ticket).await;
                return;
            }
        };

        if request.status != RequestStatus::Pending {
            debug!(
                "请求 {} 已处于 {:?} 状态，跳过调度",
                request.id, request.status
            );
            return;
        }

        match self.coordinator.assign(&request).await {
            AssignmentResult::Assigned { mechanic_id, .. } => {
                histogram!("roadside_dispatch_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                info!(
                    "worker {} 将请求 {} 分配给技师 {}（第 {} 次尝试）",
                    self.worker_id,
                    request.id,
                    mechanic_id,
                    ticket.attempt + 1
                );
            }
            AssignmentResult::NoneAvailable => {
                self.retry_or_give_up(ticket).await;
            }
            AssignmentResult::Failed(DispatchError::InvalidTransition { from, to }) => {
                // 取消竞态：请求在排队期间离开了 PENDING，不再重试
                debug!(
                    "请求 {} 分配时状态已变（{:?} → {:?}），放弃本次调度",
                    request.id, from, to
                );
            }
            AssignmentResult::Failed(e) => {
                error!("请求 {} 分配失败: {}", request.id, e);
                self.retry_or_give_up(ticket).await;
            }
        }
    }

    /// 未成功的尝试：未到上限就退避重排，到上限则留在 PENDING 并
    /// 对外报告当前无可用技师
    async fn retry_or_give_up(&self, ticket: DispatchTicket) {
        if ticket.attempt + 1 >= self.config.max_dispatch_attempts {
            counter!("roadside_dispatch_exhausted_total").increment(1);
            warn!(
                "请求 {} 经过 {} 次尝试仍无可用技师，停止自动调度",
                ticket.request_id,
                ticket.attempt + 1
            );
            if let Err(e) = self
                .notifier
                .notify_status_changed(&ticket.request_id, RequestStatus::Pending)
                .await
            {
                warn!("请求 {} 无人可派通知发送失败: {}", ticket.request_id, e);
            }
            return;
        }
        self.queue.schedule_requeue(ticket);
    }
}

/// 确认超时巡检
///
/// 周期扫描停留在 ASSIGNED 超过确认窗口的请求，回退到 PENDING
/// 重新排队，释放被占用的技师。
pub struct TimeoutWatcher {
    request_repo: Arc<dyn RequestRepository>,
    lifecycle: Arc<RequestLifecycle>,
    config: DispatcherConfig,
}

impl TimeoutWatcher {
    pub fn new(
        request_repo: Arc<dyn RequestRepository>,
        lifecycle: Arc<RequestLifecycle>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            request_repo,
            lifecycle,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(
            self.config.timeout_scan_interval_seconds,
        ));
        info!(
            "确认超时巡检启动，窗口 {}s，间隔 {}s",
            self.config.confirm_timeout_seconds, self.config.timeout_scan_interval_seconds
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("确认超时巡检收到关闭信号");
                    break;
                }
                _ = ticker.tick() => {
                    self.scan_once().await;
                }
            }
        }
    }

    pub async fn scan_once(&self) {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.confirm_timeout_seconds as i64);

        let expired = match self.request_repo.load_assigned_before(cutoff).await {
            Ok(list) => list,
            Err(e) => {
                error!("扫描超时请求失败: {}", e);
                return;
            }
        };

        for request in expired {
            counter!("roadside_confirm_timeouts_total").increment(1);
            match self.lifecycle.requeue(&request.id, "技师确认超时").await {
                Ok(_) => {}
                // 与完成/取消并发竞争时转换会被拒绝，不是故障
                Err(DispatchError::InvalidTransition { .. }) => {
                    debug!("请求 {} 超时回退与其他转换竞争，跳过", request.id);
                }
                Err(e) => error!("请求 {} 超时回退失败: {}", request.id, e),
            }
        }
    }
}
