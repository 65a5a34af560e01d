use thiserror::Error;

use crate::models::RequestStatus;

/// 调度引擎错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("救援请求未找到: {id}")]
    RequestNotFound { id: String },

    #[error("技师未找到: {id}")]
    MechanicNotFound { id: String },

    #[error("非法状态转换: {from:?} -> {to:?}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },

    #[error("请求 {request_id} 的发票已存在")]
    InvoiceExists { request_id: String },

    #[error("持久化操作失败: {0}")]
    PersistenceFailure(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("调度队列已关闭")]
    QueueClosed,

    #[error("无效的请求参数: {0}")]
    InvalidRequest(String),

    #[error("配置错误: {0}")]
    Configuration(String),
}

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
