//! 基础设施实现
//!
//! 核心端口（仓储、通知）的内存实现，供嵌入式运行和集成测试使用。

pub mod memory;

pub use memory::{
    InMemoryInterventionRepository, InMemoryInvoiceRepository, InMemoryMechanicRepository,
    InMemoryRequestRepository, LoggingNotifier,
};
