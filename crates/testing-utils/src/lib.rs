//! 测试工具
//!
//! 构建器风格的测试夹具和可注入故障的测试替身，供各 crate 的
//! 单元测试与集成测试共用。

pub mod builders;
pub mod mocks;

pub use builders::{InterventionBuilder, MechanicBuilder, RequestBuilder};
pub use mocks::{
    FailingInvoiceRepository, FailingRequestRepository, NotificationRecord, RecordingNotifier,
    SlowSaveRequestRepository,
};
