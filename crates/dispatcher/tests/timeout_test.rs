//! 确认超时巡检测试

use std::sync::Arc;

use chrono::{Duration, Utc};
use roadside_core::config::{AppConfig, DispatcherConfig};
use roadside_core::models::RequestStatus;
use roadside_core::traits::{
    InterventionRepository, InvoiceRepository, MechanicRepository, NotificationPort,
    RequestRepository,
};
use roadside_dispatcher::worker::TimeoutWatcher;
use roadside_dispatcher::{AvailabilityRegistry, DispatchQueue, RequestLifecycle};
use roadside_infrastructure::{
    InMemoryInterventionRepository, InMemoryInvoiceRepository, InMemoryMechanicRepository,
    InMemoryRequestRepository,
};
use roadside_testing_utils::{MechanicBuilder, RecordingNotifier, RequestBuilder};

struct Stack {
    request_repo: Arc<InMemoryRequestRepository>,
    mechanic_repo: Arc<InMemoryMechanicRepository>,
    availability: Arc<AvailabilityRegistry>,
    queue: Arc<DispatchQueue>,
    watcher: TimeoutWatcher,
}

fn build_stack(config: DispatcherConfig) -> Stack {
    let app = AppConfig::default();
    let request_repo = Arc::new(InMemoryRequestRepository::new());
    let mechanic_repo = Arc::new(InMemoryMechanicRepository::new());
    let availability = Arc::new(AvailabilityRegistry::new());
    let queue = Arc::new(DispatchQueue::new(app.retry.clone()));

    let lifecycle = Arc::new(RequestLifecycle::new(
        Arc::clone(&request_repo) as Arc<dyn RequestRepository>,
        Arc::clone(&mechanic_repo) as Arc<dyn MechanicRepository>,
        Arc::new(InMemoryInterventionRepository::new()) as Arc<dyn InterventionRepository>,
        Arc::new(InMemoryInvoiceRepository::new()) as Arc<dyn InvoiceRepository>,
        Arc::new(RecordingNotifier::new()) as Arc<dyn NotificationPort>,
        Arc::clone(&availability),
        Arc::clone(&queue),
        app.billing.tax_rate,
    ));

    let watcher = TimeoutWatcher::new(
        Arc::clone(&request_repo) as Arc<dyn RequestRepository>,
        lifecycle,
        config,
    );

    Stack {
        request_repo,
        mechanic_repo,
        availability,
        queue,
        watcher,
    }
}

#[tokio::test(start_paused = true)]
async fn test_expired_assignment_requeued_and_mechanic_restored() {
    let config = DispatcherConfig {
        confirm_timeout_seconds: 300,
        ..DispatcherConfig::default()
    };
    let stack = build_stack(config);

    stack.mechanic_repo.seed(MechanicBuilder::new("m-1").build()).await;
    stack.availability.register("m-1", true);
    assert!(stack.availability.try_claim("m-1"));

    // 分配发生在超时窗口之前
    let stale = RequestBuilder::new()
        .with_id("req-stale")
        .with_status(RequestStatus::Assigned)
        .with_mechanic("m-1")
        .with_assigned_at(Utc::now() - Duration::minutes(10))
        .build();
    stack.request_repo.create(&stale).await.unwrap();

    stack.watcher.scan_once().await;

    let requeued = stack.request_repo.get_by_id("req-stale").await.unwrap().unwrap();
    assert_eq!(requeued.status, RequestStatus::Pending);
    assert!(requeued.mechanic_id.is_none());
    assert_eq!(requeued.retry_count, 1);
    assert!(stack.availability.is_available("m-1"));
    // 镜像也恢复
    let mechanic = stack.mechanic_repo.get_by_id("m-1").await.unwrap().unwrap();
    assert!(mechanic.is_available);

    // 退避后票据回到队列
    let ticket = stack.queue.pop().await.unwrap();
    assert_eq!(ticket.request_id, "req-stale");
}

#[tokio::test]
async fn test_fresh_assignment_left_alone() {
    let stack = build_stack(DispatcherConfig::default());

    stack.mechanic_repo.seed(MechanicBuilder::new("m-1").build()).await;
    stack.availability.register("m-1", true);
    assert!(stack.availability.try_claim("m-1"));

    let fresh = RequestBuilder::new()
        .with_id("req-fresh")
        .with_status(RequestStatus::Assigned)
        .with_mechanic("m-1")
        .with_assigned_at(Utc::now())
        .build();
    stack.request_repo.create(&fresh).await.unwrap();

    stack.watcher.scan_once().await;

    let untouched = stack.request_repo.get_by_id("req-fresh").await.unwrap().unwrap();
    assert_eq!(untouched.status, RequestStatus::Assigned);
    assert!(!stack.availability.is_available("m-1"));
}
