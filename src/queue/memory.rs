use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    new_lease_token, EnqueueOptions, FailOutcome, FailedJob, JobHandle, JobQueue, QueueCounts,
    QueuedJob, RetryPolicy,
};
use crate::config::Config;
use crate::error::{AppError, AppResult, QueueError};
use crate::models::ApplicationJob;

#[derive(Debug, Clone)]
enum EntryState {
    Pending { ready_at: Instant },
    Active { lease_until: Instant, token: String },
}

#[derive(Debug)]
struct Entry {
    job: QueuedJob,
    state: EntryState,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// 幂等键 -> 任务 ID，任务结束后移除
    idempotency: HashMap<String, String>,
    completed: VecDeque<String>,
    failed: VecDeque<FailedJob>,
    seq: u64,
}

impl Inner {
    /// 结束任务：移除任务体和幂等键
    fn finish(&mut self, job_id: &str) -> Option<Entry> {
        let entry = self.entries.remove(job_id)?;
        if self.idempotency.get(&entry.job.idempotency_key).map(String::as_str) == Some(job_id) {
            self.idempotency.remove(&entry.job.idempotency_key);
        }
        Some(entry)
    }
}

/// 进程内队列
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    policy: RetryPolicy,
    lease: Duration,
    keep_completed: usize,
    keep_failed: usize,
    available: AtomicBool,
}

impl MemoryQueue {
    pub fn new(policy: RetryPolicy, lease: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
            lease,
            keep_completed: 100,
            keep_failed: 200,
            available: AtomicBool::new(true),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(RetryPolicy::from_config(config), config.lease())
            .with_retention(config.queue_keep_completed, config.queue_keep_failed)
    }

    pub fn with_retention(mut self, keep_completed: usize, keep_failed: usize) -> Self {
        self.keep_completed = keep_completed;
        self.keep_failed = keep_failed;
        self
    }

    /// 模拟代理断开或恢复
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(AppError::QueueUnavailable("内存队列已断开".to_string()))
        }
    }

    /// 调用方仍持有租约的任务
    fn leased_entry<'a>(inner: &'a mut Inner, job: &QueuedJob) -> AppResult<&'a mut Entry> {
        let token = job.lease()?;
        let entry = inner
            .entries
            .get_mut(&job.id)
            .ok_or_else(|| AppError::lease_lost(&job.id))?;
        match &entry.state {
            EntryState::Active { token: held, .. } if held == token => Ok(entry),
            _ => Err(AppError::lease_lost(&job.id)),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: ApplicationJob, options: EnqueueOptions) -> AppResult<JobHandle> {
        self.ensure_available()?;
        let mut inner = self.lock();

        if let Some(existing) = inner.idempotency.get(&options.idempotency_key) {
            debug!("幂等键 {} 已有任务 {}", options.idempotency_key, existing);
            return Ok(JobHandle {
                id: existing.clone(),
                deduplicated: true,
            });
        }

        let queued = QueuedJob::new(job, &options, self.policy.max_attempts);
        if inner.entries.contains_key(&queued.id) {
            return Ok(JobHandle {
                id: queued.id,
                deduplicated: true,
            });
        }

        inner.seq += 1;
        let seq = inner.seq;
        let id = queued.id.clone();
        inner
            .idempotency
            .insert(options.idempotency_key.clone(), id.clone());
        inner.entries.insert(
            id.clone(),
            Entry {
                job: queued,
                state: EntryState::Pending {
                    ready_at: Instant::now() + options.delay,
                },
                seq,
            },
        );
        Ok(JobHandle {
            id,
            deduplicated: false,
        })
    }

    async fn reserve(&self) -> AppResult<Option<QueuedJob>> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut inner = self.lock();

        // 租约过期的任务重新投递
        for entry in inner.entries.values_mut() {
            if let EntryState::Active { lease_until, .. } = entry.state {
                if lease_until <= now {
                    warn!("🔄 任务 {} 租约过期，重新投递", entry.job.id);
                    entry.state = EntryState::Pending { ready_at: now };
                }
            }
        }

        let next = inner
            .entries
            .values()
            .filter_map(|entry| match entry.state {
                EntryState::Pending { ready_at } if ready_at <= now => {
                    Some(((entry.job.priority, ready_at, entry.seq), entry.job.id.clone()))
                }
                _ => None,
            })
            .min_by_key(|(key, _)| *key)
            .map(|(_, id)| id);

        let Some(id) = next else {
            return Ok(None);
        };
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| QueueError::UnknownJob(id.clone()))?;
        let token = new_lease_token();
        entry.state = EntryState::Active {
            lease_until: now + self.lease,
            token: token.clone(),
        };
        let mut job = entry.job.clone();
        job.lease_token = Some(token);
        Ok(Some(job))
    }

    async fn extend_lease(&self, job: &QueuedJob) -> AppResult<()> {
        self.ensure_available()?;
        let renewed = Instant::now() + self.lease;
        let mut inner = self.lock();
        let entry = Self::leased_entry(&mut inner, job)?;
        if let EntryState::Active { lease_until, .. } = &mut entry.state {
            *lease_until = renewed;
        }
        Ok(())
    }

    async fn complete(&self, job: &QueuedJob) -> AppResult<()> {
        self.ensure_available()?;
        let mut inner = self.lock();
        Self::leased_entry(&mut inner, job)?;
        inner.finish(&job.id);
        inner.completed.push_front(job.id.clone());
        inner.completed.truncate(self.keep_completed);
        Ok(())
    }

    async fn fail(&self, job: &QueuedJob, error: &str, retryable: bool) -> AppResult<FailOutcome> {
        self.ensure_available()?;
        let outcome = self.policy.outcome(job, retryable);
        let mut inner = self.lock();
        Self::leased_entry(&mut inner, job)?;

        match outcome {
            FailOutcome::Retrying { attempts_made, retry_in } => {
                let entry = Self::leased_entry(&mut inner, job)?;
                entry.job.attempts_made = attempts_made;
                entry.job.last_error = Some(error.to_string());
                entry.state = EntryState::Pending {
                    ready_at: Instant::now() + retry_in,
                };
            }
            FailOutcome::Exhausted { attempts_made } => {
                inner.finish(&job.id);
                inner
                    .failed
                    .push_front(FailedJob::from_job(job, error, attempts_made));
                inner.failed.truncate(self.keep_failed);
            }
        }
        Ok(outcome)
    }

    async fn counts(&self) -> AppResult<QueueCounts> {
        self.ensure_available()?;
        let now = Instant::now();
        let inner = self.lock();
        let mut counts = QueueCounts {
            completed: inner.completed.len() as u64,
            failed: inner.failed.len() as u64,
            ..Default::default()
        };
        for entry in inner.entries.values() {
            match entry.state {
                EntryState::Pending { ready_at } if ready_at <= now => counts.waiting += 1,
                EntryState::Pending { .. } => counts.delayed += 1,
                EntryState::Active { .. } => counts.active += 1,
            }
        }
        Ok(counts)
    }

    async fn recent_failures(&self, limit: usize) -> AppResult<Vec<FailedJob>> {
        self.ensure_available()?;
        Ok(self.lock().failed.iter().take(limit).cloned().collect())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        debug!("内存队列关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::idempotency_key;
    use crate::testing::sample_job;
    use tokio::time::advance;
    use tokio_test::{assert_err, assert_ok};

    fn queue() -> MemoryQueue {
        MemoryQueue::new(
            RetryPolicy {
                max_attempts: 3,
                backoff_base: Duration::from_secs(60),
            },
            Duration::from_secs(120),
        )
    }

    fn options(job: &ApplicationJob, delay_ms: u64, priority: u32) -> EnqueueOptions {
        EnqueueOptions {
            delay: Duration::from_millis(delay_ms),
            priority,
            idempotency_key: idempotency_key(&job.user_id, &job.job_id),
        }
    }

    fn job_for(application_id: &str, job_id: &str) -> ApplicationJob {
        let mut job = sample_job(application_id);
        job.job_id = job_id.to_string();
        job
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_is_not_reserved_early() {
        let queue = queue();
        let job = job_for("a1", "j1");
        let opts = options(&job, 5_000, 1);
        queue.enqueue(job, opts).await.unwrap();

        advance(Duration::from_millis(4_999)).await;
        assert!(queue.reserve().await.unwrap().is_none());
        assert_eq!(queue.counts().await.unwrap().delayed, 1);

        advance(Duration::from_millis(1)).await;
        let reserved = queue.reserve().await.unwrap().unwrap();
        assert_eq!(reserved.id, "app-a1");
        assert_eq!(queue.counts().await.unwrap().active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_priority_value_goes_first() {
        let queue = queue();
        let bulk = job_for("bulk", "j1");
        let single = job_for("single", "j2");
        let bulk_opts = options(&bulk, 0, 5);
        let single_opts = options(&single, 0, 1);
        queue.enqueue(bulk, bulk_opts).await.unwrap();
        advance(Duration::from_millis(10)).await;
        queue.enqueue(single, single_opts).await.unwrap();

        assert_eq!(queue.reserve().await.unwrap().unwrap().id, "app-single");
        assert_eq!(queue.reserve().await.unwrap().unwrap().id, "app-bulk");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotency_key_deduplicates_until_finished() {
        let queue = queue();
        let first = job_for("a1", "j1");
        let opts = options(&first, 0, 1);
        let handle = queue.enqueue(first, opts.clone()).await.unwrap();
        assert!(!handle.deduplicated);

        let again = queue.enqueue(job_for("a2", "j1"), opts.clone()).await.unwrap();
        assert!(again.deduplicated);
        assert_eq!(again.id, handle.id);

        let reserved = queue.reserve().await.unwrap().unwrap();
        queue.complete(&reserved).await.unwrap();
        let after = queue.enqueue(job_for("a3", "j1"), opts).await.unwrap();
        assert!(!after.deduplicated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_then_exhaust() {
        let queue = queue();
        let job = job_for("a1", "j1");
        let opts = options(&job, 0, 1);
        queue.enqueue(job, opts).await.unwrap();

        let first = queue.reserve().await.unwrap().unwrap();
        let outcome = queue.fail(&first, "timeout", true).await.unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retrying {
                attempts_made: 1,
                retry_in: Duration::from_secs(60)
            }
        );

        advance(Duration::from_secs(59)).await;
        assert!(queue.reserve().await.unwrap().is_none());
        advance(Duration::from_secs(1)).await;
        let second = queue.reserve().await.unwrap().unwrap();
        assert_eq!(second.attempts_made, 1);
        assert_eq!(second.last_error.as_deref(), Some("timeout"));

        queue.fail(&second, "timeout", true).await.unwrap();
        advance(Duration::from_secs(120)).await;
        let third = queue.reserve().await.unwrap().unwrap();
        let outcome = queue.fail(&third, "timeout", true).await.unwrap();
        assert_eq!(outcome, FailOutcome::Exhausted { attempts_made: 3 });

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.waiting + counts.delayed + counts.active, 0);
        let failures = queue.recent_failures(10).await.unwrap();
        assert_eq!(failures[0].application_id, "a1");
        assert_eq!(failures[0].attempts_made, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_is_redelivered() {
        let queue = queue();
        let job = job_for("a1", "j1");
        let opts = options(&job, 0, 1);
        queue.enqueue(job, opts).await.unwrap();

        let reserved = queue.reserve().await.unwrap().unwrap();
        advance(Duration::from_secs(60)).await;
        assert_ok!(queue.extend_lease(&reserved).await);
        advance(Duration::from_secs(119)).await;
        assert!(queue.reserve().await.unwrap().is_none());

        advance(Duration::from_secs(1)).await;
        let redelivered = queue.reserve().await.unwrap().unwrap();
        assert_eq!(redelivered.id, reserved.id);
        assert_eq!(redelivered.attempts_made, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_holder_cannot_touch_redelivered_job() {
        let queue = queue();
        let job = job_for("a1", "j1");
        let opts = options(&job, 0, 1);
        queue.enqueue(job, opts).await.unwrap();

        let stale = queue.reserve().await.unwrap().unwrap();
        advance(Duration::from_secs(121)).await;
        let current = queue.reserve().await.unwrap().unwrap();
        assert_eq!(current.id, stale.id);
        assert_ne!(current.lease_token, stale.lease_token);

        assert!(queue.fail(&stale, "stale", true).await.unwrap_err().is_lease_lost());
        assert!(queue.complete(&stale).await.unwrap_err().is_lease_lost());
        assert!(queue.extend_lease(&stale).await.unwrap_err().is_lease_lost());

        // 过期持有者的失败没有让任务重新排期
        advance(Duration::from_secs(61)).await;
        assert_ok!(queue.extend_lease(&current).await);
        assert!(queue.reserve().await.unwrap().is_none());
        assert_eq!(queue.counts().await.unwrap().active, 1);

        assert_ok!(queue.complete(&current).await);
        assert_eq!(queue.counts().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn test_job_without_lease_is_rejected() {
        let queue = queue();
        let job = job_for("a1", "j1");
        let opts = options(&job, 0, 1);
        queue.enqueue(job, opts).await.unwrap();

        let mut reserved = queue.reserve().await.unwrap().unwrap();
        reserved.lease_token = None;
        assert!(queue.complete(&reserved).await.unwrap_err().is_lease_lost());
    }

    #[tokio::test]
    async fn test_retention_is_bounded() {
        let queue = queue().with_retention(2, 1);
        for i in 0..3 {
            let job = job_for(&format!("a{}", i), &format!("j{}", i));
            let opts = options(&job, 0, 1);
            queue.enqueue(job, opts).await.unwrap();
            let reserved = queue.reserve().await.unwrap().unwrap();
            queue.complete(&reserved).await.unwrap();
        }
        assert_eq!(queue.counts().await.unwrap().completed, 2);
    }

    #[tokio::test]
    async fn test_unavailable_queue_fails_fast() {
        let queue = queue();
        queue.set_available(false);
        let job = job_for("a1", "j1");
        let opts = options(&job, 0, 1);
        let err = queue.enqueue(job, opts).await.unwrap_err();
        assert!(matches!(err, AppError::QueueUnavailable(_)));
        assert_err!(queue.reserve().await);
    }
}
