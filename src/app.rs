use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::info;

use roadside_core::config::AppConfig;
use roadside_core::traits::{
    InterventionRepository, InvoiceRepository, MechanicRepository, NotificationPort,
    RequestRepository,
};
use roadside_dispatcher::DispatchEngine;
use roadside_infrastructure::{
    InMemoryInterventionRepository, InMemoryInvoiceRepository, InMemoryMechanicRepository,
    InMemoryRequestRepository, LoggingNotifier,
};

/// 主应用程序
///
/// 嵌入式运行形态：内存仓储加日志通知器，把调度引擎拉起来并
/// 托管到关闭信号。换成真实存储只需要替换这里注入的端口实现。
pub struct Application {
    engine: Arc<DispatchEngine>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("初始化道路救援调度应用");

        let request_repo: Arc<dyn RequestRepository> = Arc::new(InMemoryRequestRepository::new());
        let mechanic_repo: Arc<dyn MechanicRepository> =
            Arc::new(InMemoryMechanicRepository::new());
        let intervention_repo: Arc<dyn InterventionRepository> =
            Arc::new(InMemoryInterventionRepository::new());
        let invoice_repo: Arc<dyn InvoiceRepository> = Arc::new(InMemoryInvoiceRepository::new());
        let notifier: Arc<dyn NotificationPort> = Arc::new(LoggingNotifier);

        let engine = Arc::new(DispatchEngine::new(
            config,
            request_repo,
            mechanic_repo,
            intervention_repo,
            invoice_repo,
            notifier,
        ));

        Ok(Self { engine })
    }

    pub fn engine(&self) -> Arc<DispatchEngine> {
        Arc::clone(&self.engine)
    }

    /// 启动引擎并托管到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.engine.start().await?;
        info!("调度引擎已启动，等待关闭信号");

        let _ = shutdown_rx.recv().await;

        self.engine.shutdown().await;
        Ok(())
    }
}
