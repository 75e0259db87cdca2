//! 申请任务队列
//!
//! 支持延迟、优先级、指数退避重试和租约重投。
//! 生产环境使用 Redis，测试和单进程开发使用内存实现。

mod health;
mod memory;
mod redis_queue;

pub use health::{ErrorThrottle, QueueHealth};
pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::ApplicationJob;

/// 入队选项
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub delay: Duration,
    /// 数值越小越优先
    pub priority: u32,
    pub idempotency_key: String,
}

/// 入队结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    /// 相同幂等键的任务已在队列中，本次未新建
    pub deduplicated: bool,
}

/// 队列中的任务
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub id: String,
    pub payload: ApplicationJob,
    pub priority: u32,
    pub idempotency_key: String,
    /// 已失败的尝试次数
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// 本次取出时签发的租约令牌，续租和结束任务时校验
    #[serde(skip)]
    pub lease_token: Option<String>,
}

impl QueuedJob {
    pub fn new(payload: ApplicationJob, options: &EnqueueOptions, max_attempts: u32) -> Self {
        Self {
            id: job_id_for(&payload.application_id),
            payload,
            priority: options.priority,
            idempotency_key: options.idempotency_key.clone(),
            attempts_made: 0,
            max_attempts,
            enqueued_at: Utc::now(),
            last_error: None,
            lease_token: None,
        }
    }

    /// 当前是第几次尝试（从 1 开始）
    pub fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    /// 租约令牌，未持有租约时返回 `LeaseLost`
    pub fn lease(&self) -> AppResult<&str> {
        self.lease_token
            .as_deref()
            .ok_or_else(|| AppError::lease_lost(&self.id))
    }
}

/// 新的租约令牌
pub(crate) fn new_lease_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 失败处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// 已按退避策略重新排期
    Retrying { attempts_made: u32, retry_in: Duration },
    /// 不再重试，已移入失败保留区
    Exhausted { attempts_made: u32 },
}

impl FailOutcome {
    pub fn attempts_made(&self) -> u32 {
        match *self {
            FailOutcome::Retrying { attempts_made, .. } | FailOutcome::Exhausted { attempts_made } => attempts_made,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FailOutcome::Exhausted { .. })
    }
}

/// 失败保留区中的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub id: String,
    pub application_id: String,
    pub error: String,
    pub attempts_made: u32,
    pub failed_at: DateTime<Utc>,
}

impl FailedJob {
    fn from_job(job: &QueuedJob, error: &str, attempts_made: u32) -> Self {
        Self {
            id: job.id.clone(),
            application_id: job.payload.application_id.clone(),
            error: error.to_string(),
            attempts_made,
            failed_at: Utc::now(),
        }
    }
}

/// 队列计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn has_work(&self) -> bool {
        self.waiting > 0 || self.active > 0
    }
}

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.queue_max_attempts.max(1),
            backoff_base: Duration::from_millis(config.queue_backoff_ms),
        }
    }

    /// 第 n 次失败后的等待时间：base * 2^(n-1)
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(20);
        self.backoff_base.saturating_mul(1 << exponent)
    }

    /// 计算失败后的结果
    pub fn outcome(&self, job: &QueuedJob, retryable: bool) -> FailOutcome {
        let attempts_made = job.attempts_made + 1;
        if retryable && attempts_made < job.max_attempts {
            FailOutcome::Retrying {
                attempts_made,
                retry_in: self.backoff(attempts_made),
            }
        } else {
            FailOutcome::Exhausted { attempts_made }
        }
    }
}

/// 申请对应的队列任务 ID
pub fn job_id_for(application_id: &str) -> String {
    format!("app-{}", application_id)
}

/// 任务队列能力
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队；相同幂等键的任务未结束时返回已有任务
    async fn enqueue(&self, job: ApplicationJob, options: EnqueueOptions) -> AppResult<JobHandle>;

    /// 取出一个到期任务并签发租约令牌
    async fn reserve(&self) -> AppResult<Option<QueuedJob>>;

    /// 续租；`extend_lease`、`complete`、`fail` 在令牌不匹配时返回 `LeaseLost`
    async fn extend_lease(&self, job: &QueuedJob) -> AppResult<()>;

    async fn complete(&self, job: &QueuedJob) -> AppResult<()>;

    /// 记录失败，按重试策略重新排期或移入失败保留区
    async fn fail(&self, job: &QueuedJob, error: &str, retryable: bool) -> AppResult<FailOutcome>;

    async fn counts(&self) -> AppResult<QueueCounts>;

    /// 最近失败的任务，新的在前
    async fn recent_failures(&self, limit: usize) -> AppResult<Vec<FailedJob>>;

    fn is_available(&self) -> bool;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(3), Duration::from_secs(240));
    }

    #[test]
    fn test_outcome_respects_max_attempts() {
        let policy = policy();
        let mut job = QueuedJob {
            id: "app-1".to_string(),
            payload: crate::testing::sample_job("1"),
            priority: 1,
            idempotency_key: "apply:u1:j1".to_string(),
            attempts_made: 0,
            max_attempts: 3,
            enqueued_at: Utc::now(),
            last_error: None,
            lease_token: None,
        };

        assert_eq!(
            policy.outcome(&job, true),
            FailOutcome::Retrying {
                attempts_made: 1,
                retry_in: Duration::from_secs(60)
            }
        );
        job.attempts_made = 2;
        assert_eq!(policy.outcome(&job, true), FailOutcome::Exhausted { attempts_made: 3 });

        // 不可重试的错误直接结束
        job.attempts_made = 0;
        assert!(policy.outcome(&job, false).is_terminal());
    }
}
