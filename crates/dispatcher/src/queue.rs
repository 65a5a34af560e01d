use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::Notify;
use tracing::{debug, warn};

use roadside_core::config::RetryConfig;
use roadside_core::errors::{DispatchError, DispatchResult};
use roadside_core::models::Request;

/// 调度队列票据
///
/// 入队的是轻量票据而不是完整请求，worker 取出后再从仓储加载最新
/// 状态，排队期间的取消因此天然可见。
#[derive(Debug, Clone)]
pub struct DispatchTicket {
    pub request_id: String,
    pub priority: i32,
    pub urgency: i32,
    pub created_at: DateTime<Utc>,
    /// 已经历的调度尝试次数
    pub attempt: i32,
}

impl DispatchTicket {
    pub fn from_request(request: &Request) -> Self {
        Self {
            request_id: request.id.clone(),
            priority: request.priority,
            urgency: request.urgency,
            created_at: request.created_at,
            attempt: request.retry_count,
        }
    }
}

// 最大堆序：priority 高优先，其次 urgency 高优先，再按创建时间先到
// 先服务，最后按请求ID保证确定性
impl Ord for DispatchTicket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.urgency.cmp(&other.urgency))
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.request_id.cmp(&self.request_id))
    }
}

impl PartialOrd for DispatchTicket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DispatchTicket {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DispatchTicket {}

struct QueueInner {
    heap: BinaryHeap<DispatchTicket>,
    closed: bool,
}

/// 调度队列
///
/// 按（priority 降序、urgency 降序、createdAt 升序）出队的优先级
/// 队列。支持并发生产者和消费者，同一张票据至多交付给一个 worker。
/// `pop` 是消费者唯一的阻塞点；`requeue` 按重试次数做指数退避后
/// 重新入队。
pub struct DispatchQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    retry: RetryConfig,
}

impl DispatchQueue {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                closed: false,
            }),
            notify: Notify::new(),
            retry,
        }
    }

    /// 入队，队列已关闭时返回 QueueClosed
    pub fn push(&self, ticket: DispatchTicket) -> DispatchResult<()> {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.closed {
                return Err(DispatchError::QueueClosed);
            }
            inner.heap.push(ticket);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// 阻塞出队，队列关闭且排空后返回 None
    pub async fn pop(&self) -> Option<DispatchTicket> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // 先登记等待，再检查条件，避免检查和休眠之间丢通知
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(ticket) = inner.heap.pop() {
                    // 链式唤醒下一个等待的消费者
                    if !inner.heap.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(ticket);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// 非阻塞出队
    pub fn try_pop(&self) -> Option<DispatchTicket> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.heap.pop()
    }

    /// 按退避延迟重新入队，attempt 自动加一
    ///
    /// 延迟在独立任务中休眠，不阻塞调用方。
    pub fn schedule_requeue(self: &Arc<Self>, mut ticket: DispatchTicket) {
        ticket.attempt += 1;
        let delay = self.backoff_delay(ticket.attempt - 1);
        counter!("roadside_requeues_total").increment(1);
        debug!(
            "请求 {} 第 {} 次重新排队，延迟 {:?}",
            ticket.request_id, ticket.attempt, delay
        );

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.push(ticket.clone()) {
                warn!("请求 {} 重新入队失败: {}", ticket.request_id, e);
            }
        });
    }

    /// 计算第 retry_count 次重试的退避延迟
    ///
    /// 指数退避加随机抖动，封顶，避免雷群效应。
    pub fn backoff_delay(&self, retry_count: i32) -> Duration {
        let base = self.retry.base_interval_seconds as f64;
        let capped = (base * self.retry.backoff_multiplier.powi(retry_count.max(0)))
            .min(self.retry.max_interval_seconds as f64);

        let jitter = capped * self.retry.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        let final_secs = (capped + jitter).max(base);

        Duration::from_secs_f64(final_secs)
    }

    /// 关闭队列：不再接受新票据，消费者排空后退出
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .heap
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn ticket(id: &str, priority: i32, urgency: i32, age_secs: i64) -> DispatchTicket {
        DispatchTicket {
            request_id: id.to_string(),
            priority,
            urgency,
            created_at: Utc::now() - ChronoDuration::seconds(age_secs),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn test_ordering_priority_then_urgency_then_age() {
        let queue = DispatchQueue::new(RetryConfig::default());
        queue.push(ticket("r-low", 10, 5, 0)).unwrap();
        queue.push(ticket("r-high", 50, 1, 0)).unwrap();
        queue.push(ticket("r-old", 10, 5, 60)).unwrap();
        queue.push(ticket("r-urgent", 10, 9, 0)).unwrap();

        assert_eq!(queue.pop().await.unwrap().request_id, "r-high");
        assert_eq!(queue.pop().await.unwrap().request_id, "r-urgent");
        // 同优先级同紧急度，先创建的先出
        assert_eq!(queue.pop().await.unwrap().request_id, "r-old");
        assert_eq!(queue.pop().await.unwrap().request_id, "r-low");
    }

    #[tokio::test]
    async fn test_pop_blocks_until_push() {
        let queue = Arc::new(DispatchQueue::new(RetryConfig::default()));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(ticket("r-1", 1, 1, 0)).unwrap();

        let got = consumer.await.unwrap();
        assert_eq!(got.unwrap().request_id, "r-1");
    }

    #[tokio::test]
    async fn test_close_drains_then_none() {
        let queue = DispatchQueue::new(RetryConfig::default());
        queue.push(ticket("r-1", 1, 1, 0)).unwrap();
        queue.close();

        // 关闭后仍可排空剩余票据
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
        assert!(matches!(
            queue.push(ticket("r-2", 1, 1, 0)),
            Err(DispatchError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_consumers() {
        let queue = Arc::new(DispatchQueue::new(RetryConfig::default()));

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move { queue.pop().await }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        for c in consumers {
            assert!(c.await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_at_most_once_delivery() {
        let queue = Arc::new(DispatchQueue::new(RetryConfig::default()));
        for i in 0..100 {
            queue.push(ticket(&format!("r-{i}"), i, 0, 0)).unwrap();
        }
        queue.close();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(t) = queue.pop().await {
                    seen.push(t.request_id);
                }
                seen
            }));
        }

        let mut all: Vec<String> = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 100, "每张票据恰好交付一次");
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            base_interval_seconds: 10,
            max_interval_seconds: 60,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        let queue = DispatchQueue::new(retry);

        assert_eq!(queue.backoff_delay(0), Duration::from_secs(10));
        assert_eq!(queue.backoff_delay(1), Duration::from_secs(20));
        assert_eq!(queue.backoff_delay(2), Duration::from_secs(40));
        // 封顶
        assert_eq!(queue.backoff_delay(5), Duration::from_secs(60));
        assert_eq!(queue.backoff_delay(20), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let queue = DispatchQueue::new(RetryConfig::default());
        for retry_count in 0..6 {
            let d = queue.backoff_delay(retry_count).as_secs_f64();
            assert!(d >= 30.0, "不低于基础间隔");
            assert!(d <= 600.0 * 1.1, "不超过上限加抖动");
        }
    }
}
