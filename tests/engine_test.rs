//! 引擎端到端测试：受理 → worker 分配 → 完成开票

use std::sync::Arc;
use std::time::Duration;

use roadside_core::config::AppConfig;
use roadside_core::models::{
    BreakdownType, GeoPoint, RequestDraft, RequestStatus, VehicleInfo,
};
use roadside_core::traits::{
    InterventionRepository, InvoiceRepository, MechanicRepository, NotificationPort,
    RequestRepository,
};
use roadside_dispatcher::DispatchEngine;
use roadside_infrastructure::{
    InMemoryInterventionRepository, InMemoryInvoiceRepository, InMemoryMechanicRepository,
    InMemoryRequestRepository, LoggingNotifier,
};
use roadside_testing_utils::MechanicBuilder;

fn draft(breakdown_type: BreakdownType) -> RequestDraft {
    RequestDraft {
        requester_name: "端到端用户".to_string(),
        requester_phone: "13700000000".to_string(),
        breakdown_type,
        description: "测试故障".to_string(),
        urgency: 7,
        location: GeoPoint::new(40.0, -73.0),
        vehicle: VehicleInfo {
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            plate_number: "测B11111".to_string(),
        },
        station_id: None,
    }
}

struct Harness {
    engine: Arc<DispatchEngine>,
    mechanic_repo: Arc<InMemoryMechanicRepository>,
    invoice_repo: Arc<InMemoryInvoiceRepository>,
}

async fn start_engine() -> Harness {
    let config = AppConfig::default();
    let request_repo = Arc::new(InMemoryRequestRepository::new());
    let mechanic_repo = Arc::new(InMemoryMechanicRepository::new());
    let intervention_repo = Arc::new(InMemoryInterventionRepository::new());
    let invoice_repo = Arc::new(InMemoryInvoiceRepository::new());

    mechanic_repo
        .seed(
            MechanicBuilder::new("m-1")
                .with_location(40.0, -73.0)
                .with_specialties(&[BreakdownType::Tire, BreakdownType::Battery])
                .build(),
        )
        .await;

    let engine = Arc::new(DispatchEngine::new(
        config,
        Arc::clone(&request_repo) as Arc<dyn RequestRepository>,
        Arc::clone(&mechanic_repo) as Arc<dyn MechanicRepository>,
        Arc::clone(&intervention_repo) as Arc<dyn InterventionRepository>,
        Arc::clone(&invoice_repo) as Arc<dyn InvoiceRepository>,
        Arc::new(LoggingNotifier) as Arc<dyn NotificationPort>,
    ));
    engine.start().await.expect("引擎启动失败");

    Harness {
        engine,
        mechanic_repo,
        invoice_repo,
    }
}

async fn wait_for_status(
    engine: &DispatchEngine,
    request_id: &str,
    status: RequestStatus,
) -> bool {
    for _ in 0..200 {
        let request = engine.get_request(request_id).await.unwrap().unwrap();
        if request.status == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_submit_to_completed_invoice() {
    let harness = start_engine().await;
    let engine = &harness.engine;

    let request_id = engine.submit(draft(BreakdownType::Tire)).await.unwrap();

    assert!(
        wait_for_status(engine, &request_id, RequestStatus::Assigned).await,
        "请求应被 worker 分配"
    );
    let assigned = engine.get_request(&request_id).await.unwrap().unwrap();
    assert_eq!(assigned.mechanic_id.as_deref(), Some("m-1"));

    engine.mark_in_progress(&request_id).await.unwrap();
    let invoice = engine.mark_completed(&request_id).await.unwrap();
    assert_eq!(invoice.total_amount, 0.0, "没有维修记录时开零金额发票");

    assert!(harness
        .invoice_repo
        .get_by_request(&request_id)
        .await
        .unwrap()
        .is_some());
    // 完成后镜像也恢复可用
    let mechanic = harness.mechanic_repo.get_by_id("m-1").await.unwrap().unwrap();
    assert!(mechanic.is_available);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_cancel_before_any_mechanic_exists() {
    let config = AppConfig::default();
    let engine = Arc::new(DispatchEngine::new(
        config,
        Arc::new(InMemoryRequestRepository::new()),
        Arc::new(InMemoryMechanicRepository::new()),
        Arc::new(InMemoryInterventionRepository::new()),
        Arc::new(InMemoryInvoiceRepository::new()),
        Arc::new(LoggingNotifier),
    ));
    engine.start().await.unwrap();

    let request_id = engine.submit(draft(BreakdownType::Engine)).await.unwrap();
    // 没有技师，请求停留在 PENDING，可以直接取消
    let cancelled = engine.cancel(&request_id).await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_report_unable_returns_request_to_queue() {
    let harness = start_engine().await;
    let engine = &harness.engine;

    let request_id = engine.submit(draft(BreakdownType::Battery)).await.unwrap();
    assert!(wait_for_status(engine, &request_id, RequestStatus::Assigned).await);

    let requeued = engine.report_unable(&request_id).await.unwrap();
    assert_eq!(requeued.status, RequestStatus::Pending);
    assert_eq!(requeued.retry_count, 1);
    assert!(requeued.mechanic_id.is_none());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_second_request_waits_while_mechanic_busy() {
    let harness = start_engine().await;
    let engine = &harness.engine;

    let first = engine.submit(draft(BreakdownType::Tire)).await.unwrap();
    assert!(wait_for_status(engine, &first, RequestStatus::Assigned).await);

    // 唯一技师被占用，第二个请求保持 PENDING
    let second = engine.submit(draft(BreakdownType::Tire)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let r = engine.get_request(&second).await.unwrap().unwrap();
    assert_eq!(r.status, RequestStatus::Pending);

    engine.shutdown().await;
}
