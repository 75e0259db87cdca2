use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// 错误日志节流：每个窗口内最多输出一次
#[derive(Debug)]
pub struct ErrorThrottle {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// 本次错误是否应当输出
    pub fn should_log(&self) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// 队列连接状态
///
/// 不可用时入队直接失败，由后台任务负责重连
#[derive(Debug)]
pub struct QueueHealth {
    available: AtomicBool,
    reconnecting: AtomicBool,
    throttle: ErrorThrottle,
}

impl QueueHealth {
    pub fn new(log_window: Duration) -> Self {
        Self {
            available: AtomicBool::new(true),
            reconnecting: AtomicBool::new(false),
            throttle: ErrorThrottle::new(log_window),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn mark_available(&self) {
        self.available.store(true, Ordering::SeqCst);
    }

    pub fn mark_unavailable(&self) {
        self.available.store(false, Ordering::SeqCst);
    }

    /// 抢占重连任务，已有任务在跑时返回 false
    pub fn begin_reconnect(&self) -> bool {
        self.reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_reconnect(&self) {
        self.reconnecting.store(false, Ordering::SeqCst);
    }

    pub fn should_log(&self) -> bool {
        self.throttle.should_log()
    }
}

/// 第 n 次重连前的等待时间，上限 3 秒
pub fn reconnect_delay(attempt: u32) -> Duration {
    Duration::from_millis((u64::from(attempt) * 1_000).min(3_000))
}
