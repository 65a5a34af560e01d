//! 道路救援调度引擎
//!
//! 救援请求从受理到完成的完整编排：地理近邻召回、专长打分、
//! 技师原子认领、生命周期状态机、确认超时回退和完工开票。

pub mod availability;
pub mod coordinator;
pub mod engine;
pub mod geo;
pub mod intake;
pub mod lifecycle;
pub mod queue;
pub mod ranker;
pub mod roster;
pub mod worker;

pub use availability::AvailabilityRegistry;
pub use coordinator::{AssignmentCoordinator, AssignmentResult};
pub use engine::DispatchEngine;
pub use geo::GeoIndex;
pub use intake::IntakeService;
pub use lifecycle::RequestLifecycle;
pub use queue::{DispatchQueue, DispatchTicket};
pub use ranker::{Candidate, MatchRanker};
pub use roster::MechanicRoster;
pub use worker::{DispatchWorker, TimeoutWatcher};
