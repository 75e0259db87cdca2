//! Redis 队列
//!
//! 键布局（`<name>` 为队列名）：
//! - `<name>:jobs`      HASH  任务 ID -> 任务 JSON
//! - `<name>:idem`      HASH  幂等键 -> 任务 ID
//! - `<name>:delayed`   ZSET  按就绪时间排序
//! - `<name>:wait`      ZSET  按 优先级 * 1e13 + 就绪时间 排序
//! - `<name>:active`    ZSET  按租约到期时间排序
//! - `<name>:lease`     HASH  任务 ID -> 当前租约令牌
//! - `<name>:completed` LIST  最近完成的任务 ID
//! - `<name>:failed`    LIST  最近失败的任务记录

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::redis::{self, RedisError, Script};
use deadpool_redis::{Connection, Pool, Runtime};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::health::{reconnect_delay, QueueHealth};
use super::{
    new_lease_token, EnqueueOptions, FailOutcome, FailedJob, JobHandle, JobQueue, QueueCounts,
    QueuedJob, RetryPolicy,
};
use crate::config::Config;
use crate::error::{AppError, AppResult, QueueError};
use crate::models::ApplicationJob;

static ENQUEUE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local existing = redis.call('HGET', KEYS[2], ARGV[3])
if existing then return {0, existing} end
if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then return {0, ARGV[1]} end
redis.call('HSET', KEYS[2], ARGV[3], ARGV[1])
redis.call('ZADD', KEYS[3], ARGV[4], ARGV[1])
return {1, ARGV[1]}
",
    )
});

static RESERVE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local now = tonumber(ARGV[1])
local expired = redis.call('ZRANGEBYSCORE', KEYS[4], '-inf', now)
for _, id in ipairs(expired) do
  redis.call('ZREM', KEYS[4], id)
  redis.call('HDEL', KEYS[5], id)
  redis.call('ZADD', KEYS[2], now, id)
end
local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now, 'WITHSCORES')
for i = 1, #due, 2 do
  local id = due[i]
  redis.call('ZREM', KEYS[2], id)
  local body = redis.call('HGET', KEYS[1], id)
  if body then
    local priority = tonumber(cjson.decode(body).priority) or 0
    redis.call('ZADD', KEYS[3], priority * 1e13 + tonumber(due[i + 1]), id)
  end
end
while true do
  local popped = redis.call('ZPOPMIN', KEYS[3])
  if #popped == 0 then return false end
  local body = redis.call('HGET', KEYS[1], popped[1])
  if body then
    redis.call('ZADD', KEYS[4], ARGV[2], popped[1])
    redis.call('HSET', KEYS[5], popped[1], ARGV[3])
    return body
  end
end
",
    )
});

/// 续租：令牌匹配才刷新到期时间
static EXTEND: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then return 0 end
redis.call('ZADD', KEYS[1], 'XX', ARGV[3], ARGV[1])
return 1
",
    )
});

/// 结束任务：完成或最终失败
static FINISH: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if redis.call('HGET', KEYS[5], ARGV[1]) ~= ARGV[5] then return 0 end
redis.call('HDEL', KEYS[5], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('HDEL', KEYS[1], ARGV[1])
if redis.call('HGET', KEYS[3], ARGV[2]) == ARGV[1] then
  redis.call('HDEL', KEYS[3], ARGV[2])
end
redis.call('LPUSH', KEYS[4], ARGV[3])
redis.call('LTRIM', KEYS[4], 0, tonumber(ARGV[4]) - 1)
return 1
",
    )
});

static RETRY: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
if redis.call('HGET', KEYS[4], ARGV[1]) ~= ARGV[4] then return 0 end
redis.call('HDEL', KEYS[4], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
return 1
",
    )
});

#[derive(Debug, Clone)]
struct QueueKeys {
    jobs: String,
    idem: String,
    delayed: String,
    wait: String,
    active: String,
    lease: String,
    completed: String,
    failed: String,
}

impl QueueKeys {
    fn new(name: &str) -> Self {
        Self {
            jobs: format!("{}:jobs", name),
            idem: format!("{}:idem", name),
            delayed: format!("{}:delayed", name),
            wait: format!("{}:wait", name),
            active: format!("{}:active", name),
            lease: format!("{}:lease", name),
            completed: format!("{}:completed", name),
            failed: format!("{}:failed", name),
        }
    }
}

/// Redis 队列
pub struct RedisQueue {
    pool: Pool,
    keys: QueueKeys,
    policy: RetryPolicy,
    lease: Duration,
    keep_completed: usize,
    keep_failed: usize,
    connect_timeout: Duration,
    health: Arc<QueueHealth>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// 连接类错误会让队列进入降级状态
fn is_connection_error(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

impl RedisQueue {
    /// 创建连接池并检查连通性
    ///
    /// 连不上时不会返回错误，而是进入降级状态并在后台重连
    pub async fn connect(config: &Config) -> AppResult<Self> {
        let pool = deadpool_redis::Config::from_url(config.redis_url.as_str())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AppError::Config(format!("Redis 配置无效: {}", e)))?;

        let queue = Self {
            pool,
            keys: QueueKeys::new(&config.queue_name),
            policy: RetryPolicy::from_config(config),
            lease: config.lease(),
            keep_completed: config.queue_keep_completed,
            keep_failed: config.queue_keep_failed,
            connect_timeout: Duration::from_millis(config.queue_connect_timeout_ms),
            health: Arc::new(QueueHealth::new(Duration::from_millis(
                config.queue_error_log_window_ms,
            ))),
        };

        match ping(&queue.pool, queue.connect_timeout).await {
            Ok(()) => info!("✅ Redis 队列已连接: {}", config.queue_name),
            Err(e) => {
                warn!("⚠️ Redis 暂不可用，队列进入降级模式: {}", e);
                queue.degrade();
            }
        }
        Ok(queue)
    }

    /// 标记不可用并启动后台重连
    fn degrade(&self) {
        self.health.mark_unavailable();
        if !self.health.begin_reconnect() {
            return;
        }

        let pool = self.pool.clone();
        let health = self.health.clone();
        let connect_timeout = self.connect_timeout;
        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                attempt = attempt.saturating_add(1);
                sleep(reconnect_delay(attempt)).await;
                match ping(&pool, connect_timeout).await {
                    Ok(()) => {
                        health.mark_available();
                        info!("✅ Redis 已重新连接 (第 {} 次尝试)", attempt);
                        break;
                    }
                    Err(e) => {
                        if health.should_log() {
                            warn!("🔄 Redis 重连失败 (第 {} 次尝试): {}", attempt, e);
                        }
                    }
                }
            }
            health.end_reconnect();
        });
    }

    fn unavailable(&self, reason: impl ToString) -> AppError {
        let reason = reason.to_string();
        if self.health.should_log() {
            error!("❌ Redis 队列错误: {}", reason);
        }
        AppError::QueueUnavailable(reason)
    }

    async fn conn(&self) -> AppResult<Connection> {
        if !self.health.is_available() {
            return Err(AppError::QueueUnavailable("Redis 未连接".to_string()));
        }
        match timeout(self.connect_timeout, self.pool.get()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                self.degrade();
                Err(self.unavailable(QueueError::Pool(e.to_string())))
            }
            Err(_) => {
                self.degrade();
                Err(self.unavailable("获取 Redis 连接超时"))
            }
        }
    }

    /// 命令错误：连接类错误降级，其他错误原样返回
    fn command_error(&self, err: RedisError) -> AppError {
        if is_connection_error(&err) {
            self.degrade();
            self.unavailable(err)
        } else {
            if self.health.should_log() {
                error!("❌ Redis 命令失败: {}", err);
            }
            err.into()
        }
    }

    fn decode(&self, job_id: &str, body: &str) -> AppResult<QueuedJob> {
        serde_json::from_str(body).map_err(|source| {
            QueueError::CorruptPayload {
                job_id: job_id.to_string(),
                source,
            }
            .into()
        })
    }

    fn encode(job: &QueuedJob) -> AppResult<String> {
        serde_json::to_string(job).map_err(|source| {
            QueueError::CorruptPayload {
                job_id: job.id.clone(),
                source,
            }
            .into()
        })
    }

    async fn finish(&self, job: &QueuedJob, list: &str, entry: String, keep: usize) -> AppResult<()> {
        let token = job.lease()?;
        let mut conn = self.conn().await?;
        let finished: i64 = FINISH
            .key(&self.keys.jobs)
            .key(&self.keys.active)
            .key(&self.keys.idem)
            .key(list)
            .key(&self.keys.lease)
            .arg(&job.id)
            .arg(&job.idempotency_key)
            .arg(entry)
            .arg(keep.max(1))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.command_error(e))?;
        if finished == 0 {
            return Err(AppError::lease_lost(&job.id));
        }
        Ok(())
    }
}

async fn ping(pool: &Pool, connect_timeout: Duration) -> AppResult<()> {
    let mut conn = timeout(connect_timeout, pool.get())
        .await
        .map_err(|_| AppError::QueueUnavailable("获取 Redis 连接超时".to_string()))?
        .map_err(|e| QueueError::Pool(e.to_string()))?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: ApplicationJob, options: EnqueueOptions) -> AppResult<JobHandle> {
        let queued = QueuedJob::new(job, &options, self.policy.max_attempts);
        let body = Self::encode(&queued)?;
        let ready_at = now_ms() + millis(options.delay);

        let mut conn = self.conn().await?;
        let (created, id): (i64, String) = ENQUEUE
            .key(&self.keys.jobs)
            .key(&self.keys.idem)
            .key(&self.keys.delayed)
            .arg(&queued.id)
            .arg(body)
            .arg(&options.idempotency_key)
            .arg(ready_at)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.command_error(e))?;

        debug!("入队 {} (新建: {})", id, created == 1);
        Ok(JobHandle {
            id,
            deduplicated: created == 0,
        })
    }

    async fn reserve(&self) -> AppResult<Option<QueuedJob>> {
        let now = now_ms();
        let token = new_lease_token();
        let mut conn = self.conn().await?;
        let body: Option<String> = RESERVE
            .key(&self.keys.jobs)
            .key(&self.keys.delayed)
            .key(&self.keys.wait)
            .key(&self.keys.active)
            .key(&self.keys.lease)
            .arg(now)
            .arg(now + millis(self.lease))
            .arg(&token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.command_error(e))?;

        let Some(body) = body else {
            return Ok(None);
        };
        let mut job = self.decode("reserved", &body)?;
        job.lease_token = Some(token);
        Ok(Some(job))
    }

    async fn extend_lease(&self, job: &QueuedJob) -> AppResult<()> {
        let token = job.lease()?;
        let mut conn = self.conn().await?;
        let extended: i64 = EXTEND
            .key(&self.keys.active)
            .key(&self.keys.lease)
            .arg(&job.id)
            .arg(token)
            .arg(now_ms() + millis(self.lease))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.command_error(e))?;
        if extended == 0 {
            return Err(AppError::lease_lost(&job.id));
        }
        Ok(())
    }

    async fn complete(&self, job: &QueuedJob) -> AppResult<()> {
        self.finish(job, &self.keys.completed, job.id.clone(), self.keep_completed)
            .await
    }

    async fn fail(&self, job: &QueuedJob, error: &str, retryable: bool) -> AppResult<FailOutcome> {
        let outcome = self.policy.outcome(job, retryable);
        match outcome {
            FailOutcome::Retrying { attempts_made, retry_in } => {
                let token = job.lease()?;
                let mut updated = job.clone();
                updated.attempts_made = attempts_made;
                updated.last_error = Some(error.to_string());
                let body = Self::encode(&updated)?;

                let mut conn = self.conn().await?;
                let moved: i64 = RETRY
                    .key(&self.keys.jobs)
                    .key(&self.keys.active)
                    .key(&self.keys.delayed)
                    .key(&self.keys.lease)
                    .arg(&job.id)
                    .arg(body)
                    .arg(now_ms() + millis(retry_in))
                    .arg(token)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(|e| self.command_error(e))?;
                if moved == 0 {
                    return Err(AppError::lease_lost(&job.id));
                }
            }
            FailOutcome::Exhausted { attempts_made } => {
                let record = serde_json::to_string(&FailedJob::from_job(job, error, attempts_made))
                    .map_err(|source| QueueError::CorruptPayload {
                        job_id: job.id.clone(),
                        source,
                    })?;
                self.finish(job, &self.keys.failed, record, self.keep_failed)
                    .await?;
            }
        }
        Ok(outcome)
    }

    async fn counts(&self) -> AppResult<QueueCounts> {
        let now = now_ms();
        let mut conn = self.conn().await?;
        let (wait, due, delayed, active, completed, failed): (u64, u64, u64, u64, u64, u64) =
            redis::pipe()
                .zcard(&self.keys.wait)
                .zcount(&self.keys.delayed, "-inf", now)
                .zcount(&self.keys.delayed, format!("({}", now), "+inf")
                .zcard(&self.keys.active)
                .llen(&self.keys.completed)
                .llen(&self.keys.failed)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.command_error(e))?;

        Ok(QueueCounts {
            waiting: wait + due,
            delayed,
            active,
            completed,
            failed,
        })
    }

    async fn recent_failures(&self, limit: usize) -> AppResult<Vec<FailedJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.keys.failed)
            .arg(0)
            .arg(limit as i64 - 1)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.command_error(e))?;

        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(failed) => Some(failed),
                Err(e) => {
                    warn!("⚠️ 跳过无法解析的失败记录: {}", e);
                    None
                }
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        self.health.is_available()
    }

    async fn close(&self) {
        self.pool.close();
        info!("Redis 连接池已关闭");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::idempotency_key;
    use crate::testing::sample_job;

    #[test]
    fn test_key_layout() {
        let keys = QueueKeys::new("job-applications");
        assert_eq!(keys.jobs, "job-applications:jobs");
        assert_eq!(keys.failed, "job-applications:failed");
        assert_eq!(keys.lease, "job-applications:lease");
    }

    #[tokio::test]
    #[ignore = "需要本地 Redis"]
    async fn test_live_enqueue_reserve_complete() {
        let config = Config {
            queue_name: format!("auto-apply-test-{}", uuid::Uuid::new_v4()),
            ..Config::default()
        };
        let queue = RedisQueue::connect(&config).await.unwrap();
        assert!(queue.is_available());

        let job = sample_job("live-1");
        let options = EnqueueOptions {
            delay: Duration::ZERO,
            priority: 1,
            idempotency_key: idempotency_key(&job.user_id, &job.job_id),
        };
        let handle = queue.enqueue(job.clone(), options.clone()).await.unwrap();
        assert!(queue.enqueue(job, options).await.unwrap().deduplicated);

        let reserved = queue.reserve().await.unwrap().unwrap();
        assert_eq!(reserved.id, handle.id);
        queue.extend_lease(&reserved).await.unwrap();

        let mut stale = reserved.clone();
        stale.lease_token = Some("stale".to_string());
        assert!(queue.complete(&stale).await.unwrap_err().is_lease_lost());

        queue.complete(&reserved).await.unwrap();
        assert_eq!(queue.counts().await.unwrap().completed, 1);
        queue.close().await;
    }
}
