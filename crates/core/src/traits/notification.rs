use async_trait::async_trait;

use crate::errors::DispatchResult;
use crate::models::RequestStatus;

/// 通知端口
///
/// 尽力而为的外部通知（短信、推送等）。发送失败不会回滚任何生命周期
/// 转换，调用方只记录日志。
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// 通知请求已分配技师
    async fn notify_assigned(&self, request_id: &str, mechanic_id: &str) -> DispatchResult<()>;

    /// 通知请求状态变更
    async fn notify_status_changed(
        &self,
        request_id: &str,
        status: RequestStatus,
    ) -> DispatchResult<()>;
}
