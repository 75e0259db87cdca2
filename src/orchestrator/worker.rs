//! 队列消费者 - 编排层
//!
//! ## 职责
//!
//! 1. 从队列取出任务，立即把记录标记为 `processing`
//! 2. 调用编排器执行一次尝试，执行期间定期续租
//! 3. 先向队列确认结果，再写入终态（`completed` / `failed`）
//!    租约已被其他 worker 接管时不写记录
//! 4. 发布生命周期事件
//!
//! 记录存储的写入失败只记日志，不影响队列的重试判断。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::PageSource;
use crate::models::{ApplicationResult, ApplicationStatus, StatusUpdate};
use crate::orchestrator::apply_orchestrator::Applier;
use crate::queue::{ErrorThrottle, JobQueue, QueuedJob};
use crate::services::{LifecycleEvent, LifecycleKind, RecordStore};

/// 队列计数日志间隔
const COUNTS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// 队列消费者
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn RecordStore>,
    applier: Arc<dyn Applier>,
    events: broadcast::Sender<LifecycleEvent>,
    poll_interval: Duration,
    lease: Duration,
    throttle: ErrorThrottle,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn RecordStore>,
        applier: Arc<dyn Applier>,
        events: broadcast::Sender<LifecycleEvent>,
        config: &Config,
    ) -> Self {
        Self {
            queue,
            store,
            applier,
            events,
            poll_interval: config.poll_interval(),
            lease: config.lease(),
            throttle: ErrorThrottle::new(Duration::from_millis(config.queue_error_log_window_ms)),
        }
    }

    /// 持续消费直到收到停止信号，当前任务处理完才退出
    pub async fn run(&self, pages: &dyn PageSource, mut shutdown: watch::Receiver<bool>) {
        info!("🚀 Worker 开始消费队列");
        let mut last_counts_log = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            if last_counts_log.elapsed() >= COUNTS_LOG_INTERVAL {
                self.log_counts().await;
                last_counts_log = Instant::now();
            }

            match self.run_once(pages).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    if self.throttle.should_log() {
                        error!("❌ 取任务失败: {}", e);
                    }
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
        info!("Worker 已停止");
    }

    /// 处理一个到期任务，没有任务时返回 `false`
    pub async fn run_once(&self, pages: &dyn PageSource) -> AppResult<bool> {
        let Some(job) = self.queue.reserve().await? else {
            return Ok(false);
        };
        self.process(pages, job).await;
        Ok(true)
    }

    async fn process(&self, pages: &dyn PageSource, job: QueuedJob) {
        let application_id = job.payload.application_id.clone();
        let tag = format!("[申请 {}]", application_id);
        info!("{}", "=".repeat(60));
        info!(
            "{} 🔄 开始处理: {} @ {} (第 {}/{} 次尝试)",
            tag,
            job.payload.job_posting.job_title,
            job.payload.job_posting.company_name,
            job.attempt(),
            job.max_attempts
        );

        // 先标记 processing，崩溃时记录不会停留在 queued
        self.update_record(&tag, &application_id, StatusUpdate::status(ApplicationStatus::Processing))
            .await;
        self.emit(&job, LifecycleKind::Started);

        let heartbeat = self.spawn_heartbeat(job.clone());
        let result = self.applier.apply(pages, &job.payload).await;
        heartbeat.abort();

        if result.success {
            self.on_success(&tag, &job, result).await;
        } else {
            self.on_failure(&tag, &job, result).await;
        }
        info!("{}", "=".repeat(60));
    }

    async fn on_success(&self, tag: &str, job: &QueuedJob, result: ApplicationResult) {
        match self.queue.complete(job).await {
            Ok(()) => {}
            Err(e) if e.is_lease_lost() => {
                warn!("{} ⚠️ 租约已失效，任务已由其他 worker 接管，跳过写入", tag);
                return;
            }
            Err(e) => error!("{} ❌ 确认任务完成失败: {}", tag, e),
        }

        let update = StatusUpdate {
            status: Some(ApplicationStatus::Completed),
            screenshot_url: result.screenshot_path.clone(),
            confirmation_url: result.confirmation_url.clone(),
            ..Default::default()
        };
        self.update_record(tag, &job.payload.application_id, update).await;
        info!("{} ✅ 申请完成", tag);
        self.emit(
            job,
            LifecycleKind::Completed {
                confirmation_url: result.confirmation_url,
            },
        );
    }

    async fn on_failure(&self, tag: &str, job: &QueuedJob, result: ApplicationResult) {
        let error = result.error_text();
        let outcome = match self.queue.fail(job, &error, result.is_retryable()).await {
            Ok(outcome) => Some(outcome),
            Err(e) if e.is_lease_lost() => {
                warn!("{} ⚠️ 租约已失效，任务已由其他 worker 接管，跳过写入", tag);
                return;
            }
            Err(e) => {
                error!("{} ❌ 提交失败结果到队列失败: {}", tag, e);
                None
            }
        };

        let update = StatusUpdate {
            screenshot_url: result.screenshot_path.clone(),
            ..StatusUpdate::failed(error.clone(), job.attempt())
        };
        self.update_record(tag, &job.payload.application_id, update).await;

        let Some(outcome) = outcome else {
            return;
        };
        if outcome.is_terminal() {
            error!(
                "{} ❌ 申请失败，不再重试 (共 {} 次尝试): {}",
                tag,
                outcome.attempts_made(),
                error
            );
        } else {
            warn!("{} ⚠️ 申请失败，等待重试: {}", tag, error);
        }
        self.emit(
            job,
            LifecycleKind::Failed {
                error,
                terminal: outcome.is_terminal(),
                attempt: job.attempt(),
            },
        );
    }

    /// 执行期间定期续租，租约丢失后停止
    fn spawn_heartbeat(&self, job: QueuedJob) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let every = (self.lease / 3).max(Duration::from_millis(100));
        tokio::spawn(async move {
            loop {
                sleep(every).await;
                match queue.extend_lease(&job).await {
                    Ok(()) => debug!("任务 {} 已续租", job.id),
                    Err(e) if e.is_lease_lost() => {
                        warn!("⚠️ 任务 {} 的租约已失效，停止续租", job.id);
                        break;
                    }
                    Err(e) => warn!("⚠️ 任务 {} 续租失败: {}", job.id, e),
                }
            }
        })
    }

    async fn update_record(&self, tag: &str, application_id: &str, update: StatusUpdate) {
        if let Err(e) = self.store.update(application_id, update).await {
            warn!("{} ⚠️ 更新申请记录失败: {}", tag, e);
        }
    }

    fn emit(&self, job: &QueuedJob, kind: LifecycleKind) {
        let event = LifecycleEvent {
            application_id: job.payload.application_id.clone(),
            user_id: job.payload.user_id.clone(),
            job_title: job.payload.job_posting.job_title.clone(),
            company_name: job.payload.job_posting.company_name.clone(),
            kind,
        };
        // 没有订阅者时忽略
        let _ = self.events.send(event);
    }

    async fn log_counts(&self) {
        match self.queue.counts().await {
            Ok(counts) if counts.has_work() => info!(
                "📊 队列状态: 等待 {} | 延迟 {} | 执行中 {} | 完成 {} | 失败 {}",
                counts.waiting, counts.delayed, counts.active, counts.completed, counts.failed
            ),
            Ok(_) => {}
            Err(e) => {
                if self.throttle.should_log() {
                    warn!("⚠️ 获取队列状态失败: {}", e);
                }
            }
        }
    }
}
