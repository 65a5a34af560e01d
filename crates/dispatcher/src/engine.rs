use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use roadside_core::config::AppConfig;
use roadside_core::errors::DispatchResult;
use roadside_core::models::{Invoice, Request, RequestDraft};
use roadside_core::traits::{
    InterventionRepository, InvoiceRepository, MechanicRepository, NotificationPort,
    RequestRepository,
};

use crate::availability::AvailabilityRegistry;
use crate::coordinator::AssignmentCoordinator;
use crate::geo::GeoIndex;
use crate::intake::IntakeService;
use crate::lifecycle::RequestLifecycle;
use crate::queue::{DispatchQueue, DispatchTicket};
use crate::ranker::MatchRanker;
use crate::roster::MechanicRoster;
use crate::worker::{DispatchWorker, TimeoutWatcher};

/// 调度引擎
///
/// 组合根：拥有队列、可用性注册表、地理索引、协调器和生命周期，
/// 负责 worker/巡检任务的启停。二进制入口和集成测试都通过这个
/// 门面使用引擎，不直接触碰内部组件。
pub struct DispatchEngine {
    config: AppConfig,
    request_repo: Arc<dyn RequestRepository>,
    mechanic_repo: Arc<dyn MechanicRepository>,
    notifier: Arc<dyn NotificationPort>,
    queue: Arc<DispatchQueue>,
    availability: Arc<AvailabilityRegistry>,
    geo: Arc<GeoIndex>,
    roster: Arc<MechanicRoster>,
    lifecycle: Arc<RequestLifecycle>,
    coordinator: Arc<AssignmentCoordinator>,
    intake: IntakeService,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchEngine {
    pub fn new(
        config: AppConfig,
        request_repo: Arc<dyn RequestRepository>,
        mechanic_repo: Arc<dyn MechanicRepository>,
        intervention_repo: Arc<dyn InterventionRepository>,
        invoice_repo: Arc<dyn InvoiceRepository>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        let queue = Arc::new(DispatchQueue::new(config.retry.clone()));
        let availability = Arc::new(AvailabilityRegistry::new());
        let geo = Arc::new(GeoIndex::new());
        let roster = Arc::new(MechanicRoster::new());

        let lifecycle = Arc::new(RequestLifecycle::new(
            Arc::clone(&request_repo),
            Arc::clone(&mechanic_repo),
            intervention_repo,
            invoice_repo,
            Arc::clone(&notifier),
            Arc::clone(&availability),
            Arc::clone(&queue),
            config.billing.tax_rate,
        ));

        let coordinator = Arc::new(AssignmentCoordinator::new(
            Arc::clone(&geo),
            Arc::clone(&roster),
            Arc::clone(&availability),
            MatchRanker::new(config.ranking.clone()),
            Arc::clone(&lifecycle),
            config.dispatcher.clone(),
        ));

        let intake = IntakeService::new(
            Arc::clone(&request_repo),
            Arc::clone(&queue),
            config.dispatcher.clone(),
        );

        let (shutdown_tx, _) = broadcast::channel(4);

        Self {
            config,
            request_repo,
            mechanic_repo,
            notifier,
            queue,
            availability,
            geo,
            roster,
            lifecycle,
            coordinator,
            intake,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// 启动引擎：同步花名册、恢复遗留的 PENDING 请求、拉起
    /// worker 和超时巡检
    pub async fn start(&self) -> DispatchResult<()> {
        let synced = self.sync_roster().await?;
        let recovered = self.recover_pending().await?;
        info!("引擎启动：{} 名技师入册，恢复 {} 个待调度请求", synced, recovered);

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());

        for worker_id in 0..self.config.dispatcher.worker_count {
            let worker = DispatchWorker::new(
                worker_id,
                Arc::clone(&self.queue),
                Arc::clone(&self.request_repo),
                Arc::clone(&self.coordinator),
                Arc::clone(&self.notifier),
                self.config.dispatcher.clone(),
            );
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(worker.run(shutdown_rx)));
        }

        let watcher = TimeoutWatcher::new(
            Arc::clone(&self.request_repo),
            Arc::clone(&self.lifecycle),
            self.config.dispatcher.clone(),
        );
        let shutdown_rx = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(watcher.run(shutdown_rx)));

        Ok(())
    }

    /// 从仓储同步技师花名册到内存索引，返回入册人数
    pub async fn sync_roster(&self) -> DispatchResult<usize> {
        let mechanics = self.mechanic_repo.load_all().await?;
        let count = mechanics.len();

        for mechanic in mechanics {
            self.availability.register(&mechanic.id, mechanic.is_available);
            if let Some(location) = mechanic.location {
                self.geo.upsert(&mechanic.id, location);
            }
            self.roster.upsert(mechanic);
        }
        Ok(count)
    }

    /// 把仓储中遗留的 PENDING 请求重新推入队列（进程重启恢复）
    async fn recover_pending(&self) -> DispatchResult<usize> {
        let pending = self.request_repo.load_pending().await?;
        let count = pending.len();

        for request in &pending {
            if let Err(e) = self.queue.push(DispatchTicket::from_request(request)) {
                warn!("请求 {} 恢复入队失败: {}", request.id, e);
            }
        }
        Ok(count)
    }

    /// 受理新的报修请求
    pub async fn submit(&self, draft: RequestDraft) -> DispatchResult<String> {
        self.intake.submit(draft).await
    }

    /// 取消请求（取消优先于并发中的分配）
    pub async fn cancel(&self, request_id: &str) -> DispatchResult<Request> {
        self.lifecycle.cancel(request_id).await
    }

    /// 技师确认到场开工
    pub async fn mark_in_progress(&self, request_id: &str) -> DispatchResult<Request> {
        self.lifecycle.mark_in_progress(request_id).await
    }

    /// 完成请求并开票
    pub async fn mark_completed(&self, request_id: &str) -> DispatchResult<Invoice> {
        self.lifecycle.mark_completed(request_id).await
    }

    /// 技师报告无法处理，请求回退重新调度
    pub async fn report_unable(&self, request_id: &str) -> DispatchResult<Request> {
        self.lifecycle.requeue(request_id, "技师报告无法处理").await
    }

    pub async fn get_request(&self, request_id: &str) -> DispatchResult<Option<Request>> {
        self.request_repo.get_by_id(request_id).await
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// 优雅关闭：广播关闭信号、关闭队列、等待所有任务退出
    pub async fn shutdown(&self) {
        info!("引擎开始关闭");
        let _ = self.shutdown_tx.send(());
        self.queue.close();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("后台任务退出异常: {}", e);
            }
        }
        info!("引擎已关闭");
    }
}
