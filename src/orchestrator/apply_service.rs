//! 入队服务 - 编排层
//!
//! 校验申请请求、创建申请记录并投递到队列。
//! 单个申请与批量申请走同一套入队逻辑。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{
    idempotency_key, ApplicationJob, ApplicationRecord, ApplicationStatus, CvSnapshot, JobPosting,
    StatusUpdate,
};
use crate::queue::{EnqueueOptions, JobQueue};
use crate::services::RecordStore;

/// 单个申请的优先级
pub const SINGLE_PRIORITY: u32 = 1;
/// 批量申请的优先级
pub const BULK_PRIORITY: u32 = 5;

/// 入队请求
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub user_id: String,
    pub job_id: String,
    pub cv: CvSnapshot,
    pub job: JobPosting,
    pub resume_asset_ref: Option<String>,
}

/// 入队回执
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReceipt {
    pub application_id: String,
    pub queue_job_id: String,
    pub status: ApplicationStatus,
    pub job_title: String,
    pub company_name: String,
    pub estimated_start: DateTime<Utc>,
}

/// 批量申请中单个职位的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItem {
    pub job_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 批量申请报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub applied: usize,
    pub skipped: usize,
    pub daily_limit: usize,
    pub remaining: usize,
    pub results: Vec<BulkItem>,
}

/// 入队服务
pub struct ApplyService {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn JobQueue>,
    apply_delay: Duration,
    bulk_stagger: Duration,
    max_per_day: usize,
}

impl ApplyService {
    pub fn new(store: Arc<dyn RecordStore>, queue: Arc<dyn JobQueue>, config: &Config) -> Self {
        Self {
            store,
            queue,
            apply_delay: config.apply_delay(),
            bulk_stagger: Duration::from_millis(config.bulk_stagger_ms),
            max_per_day: config.max_applications_per_day,
        }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn queue(&self) -> &dyn JobQueue {
        self.queue.as_ref()
    }

    /// 申请单个职位
    pub async fn apply(&self, user_id: &str, job_id: &str) -> AppResult<ApplyReceipt> {
        self.apply_with(user_id, job_id, SINGLE_PRIORITY, self.apply_delay)
            .await
    }

    /// 批量申请，单个职位失败不影响其他职位
    pub async fn apply_bulk(&self, user_id: &str, job_ids: &[String]) -> AppResult<BulkReport> {
        require("userId", user_id)?;
        if job_ids.is_empty() {
            return Err(AppError::missing_field("jobIds"));
        }

        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let applied_today = self.store.count_created_since(user_id, midnight).await?;
        let allowance = self.max_per_day.saturating_sub(applied_today);
        if allowance == 0 {
            return Err(ValidationError::DailyLimitReached {
                limit: self.max_per_day,
                applied: applied_today,
            }
            .into());
        }

        let selected = &job_ids[..job_ids.len().min(allowance)];
        info!(
            "📦 批量申请: 用户 {} 提交 {} 个职位，今日剩余额度 {}",
            user_id,
            job_ids.len(),
            allowance
        );

        let mut results = Vec::with_capacity(selected.len());
        for (index, job_id) in selected.iter().enumerate() {
            let delay = self.apply_delay + self.bulk_stagger * index as u32;
            let item = match self.apply_with(user_id, job_id, BULK_PRIORITY, delay).await {
                Ok(receipt) => BulkItem {
                    job_id: job_id.clone(),
                    success: true,
                    application_id: Some(receipt.application_id),
                    error: None,
                },
                Err(e) => {
                    warn!("[批量] 职位 {} 入队失败: {}", job_id, e);
                    BulkItem {
                        job_id: job_id.clone(),
                        success: false,
                        application_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(item);
        }

        let applied = results.iter().filter(|r| r.success).count();
        Ok(BulkReport {
            applied,
            skipped: job_ids.len() - selected.len(),
            daily_limit: self.max_per_day,
            remaining: allowance - applied,
            results,
        })
    }

    /// 读取简历与职位后入队
    async fn apply_with(
        &self,
        user_id: &str,
        job_id: &str,
        priority: u32,
        delay: Duration,
    ) -> AppResult<ApplyReceipt> {
        require("userId", user_id)?;
        require("jobId", job_id)?;

        let cv = self
            .store
            .cv_snapshot(user_id)
            .await?
            .ok_or_else(|| ValidationError::CvNotFound {
                user_id: user_id.to_string(),
            })?;
        let job = self
            .store
            .job_posting(job_id)
            .await?
            .ok_or_else(|| ValidationError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        let resume_asset_ref = cv.resume_url.clone();
        self.enqueue(
            EnqueueRequest {
                user_id: user_id.to_string(),
                job_id: job_id.to_string(),
                cv,
                job,
                resume_asset_ref,
            },
            priority,
            delay,
        )
        .await
    }

    /// 入队
    ///
    /// 同一 (用户, 职位) 已有未失败的记录时拒绝；失败的旧记录保留，新建一条记录
    pub async fn enqueue(
        &self,
        request: EnqueueRequest,
        priority: u32,
        delay: Duration,
    ) -> AppResult<ApplyReceipt> {
        require("userId", &request.user_id)?;
        require("jobId", &request.job_id)?;
        if request.job.apply_url().is_none() {
            return Err(ValidationError::MissingApplicationUrl {
                job_id: request.job_id.clone(),
            }
            .into());
        }

        if let Some(existing) = self
            .store
            .find_for_job(&request.user_id, &request.job_id)
            .await?
        {
            if existing.status != ApplicationStatus::Failed {
                return Err(already_applied(&existing));
            }
        }

        let record = self
            .store
            .create(&request.user_id, &request.job_id)
            .await?;

        if !self.queue.is_available() {
            self.mark_failed(&record, "队列不可用，Redis 未连接").await;
            return Err(AppError::QueueUnavailable(format!(
                "申请 {} 已创建但无法处理",
                record.id
            )));
        }

        let key = idempotency_key(&request.user_id, &request.job_id);
        let payload = ApplicationJob {
            application_id: record.id.clone(),
            user_id: request.user_id,
            job_id: request.job_id,
            cv_snapshot: request.cv,
            job_posting: request.job,
            resume_asset_ref: request.resume_asset_ref,
            delay_ms: delay.as_millis() as u64,
            priority,
            idempotency_key: key.clone(),
        };
        let job_title = payload.job_posting.job_title.clone();
        let company_name = payload.job_posting.company_name.clone();

        let options = EnqueueOptions {
            delay,
            priority,
            idempotency_key: key,
        };
        let handle = match self.queue.enqueue(payload, options).await {
            Ok(handle) => handle,
            Err(e) => {
                self.mark_failed(&record, &e.to_string()).await;
                return Err(e);
            }
        };

        if handle.deduplicated {
            // 并发请求抢先入队，本条记录作废
            self.mark_failed(&record, "已有相同申请在队列中").await;
            return Err(ValidationError::AlreadyApplied {
                application_id: record.id,
                status: ApplicationStatus::Queued.to_string(),
            }
            .into());
        }

        info!(
            "✅ 申请已入队: {} @ {} (申请 {}, 任务 {})",
            job_title, company_name, record.id, handle.id
        );
        Ok(ApplyReceipt {
            application_id: record.id,
            queue_job_id: handle.id,
            status: ApplicationStatus::Queued,
            job_title,
            company_name,
            estimated_start: Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
        })
    }

    async fn mark_failed(&self, record: &ApplicationRecord, reason: &str) {
        if let Err(e) = self
            .store
            .update(&record.id, StatusUpdate::failed(reason, 0))
            .await
        {
            warn!("[申请 {}] ⚠️ 标记失败状态出错: {}", record.id, e);
        }
    }
}

fn require(field: &'static str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        Err(AppError::missing_field(field))
    } else {
        Ok(())
    }
}

fn already_applied(existing: &ApplicationRecord) -> AppError {
    ValidationError::AlreadyApplied {
        application_id: existing.id.clone(),
        status: existing.status.to_string(),
    }
    .into()
}
