//! 申请生命周期通知
//!
//! worker 通过 broadcast 通道发布事件，通知任务只负责记录日志。

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 事件通道容量
pub const EVENT_CAPACITY: usize = 256;

/// 事件类型
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LifecycleKind {
    Started,
    Completed {
        confirmation_url: Option<String>,
    },
    Failed {
        error: String,
        /// 是否已不再重试
        terminal: bool,
        attempt: u32,
    },
}

/// 申请生命周期事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub application_id: String,
    pub user_id: String,
    pub job_title: String,
    pub company_name: String,
    #[serde(flatten)]
    pub kind: LifecycleKind,
}

pub fn channel() -> (broadcast::Sender<LifecycleEvent>, broadcast::Receiver<LifecycleEvent>) {
    broadcast::channel(EVENT_CAPACITY)
}

/// 启动通知任务，通道关闭后退出
pub fn spawn_notifier(mut events: broadcast::Receiver<LifecycleEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => notify(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("⚠️ 通知任务落后，丢弃 {} 条事件", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn notify(event: &LifecycleEvent) {
    match &event.kind {
        LifecycleKind::Started => info!(
            "📨 [通知 {}] 开始申请 {} @ {}",
            event.user_id, event.job_title, event.company_name
        ),
        LifecycleKind::Completed { confirmation_url } => info!(
            "📨 [通知 {}] ✅ 申请成功 {} @ {} (确认页: {})",
            event.user_id,
            event.job_title,
            event.company_name,
            confirmation_url.as_deref().unwrap_or("无")
        ),
        LifecycleKind::Failed {
            error: reason,
            terminal: true,
            attempt,
        } => error!(
            "📨 [通知 {}] ❌ 申请失败 {} @ {} (第 {} 次尝试，不再重试): {}",
            event.user_id, event.job_title, event.company_name, attempt, reason
        ),
        LifecycleKind::Failed { error: reason, attempt, .. } => warn!(
            "📨 [通知 {}] 🔄 申请失败 {} @ {} (第 {} 次尝试，稍后重试): {}",
            event.user_id, event.job_title, event.company_name, attempt, reason
        ),
    }
}
