use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::de_lenient_id;
use super::profile::{CvSnapshot, JobPosting};

/// 申请状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Queued => "queued",
            ApplicationStatus::Processing => "processing",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Completed | ApplicationStatus::Failed)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 申请记录（持久化在 `applications` 表）
///
/// 同一 (user_id, job_id) 至多存在一条非终态记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    #[serde(deserialize_with = "de_lenient_id")]
    pub id: String,
    pub user_id: String,
    #[serde(deserialize_with = "de_lenient_id")]
    pub job_id: String,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default)]
    pub confirmation_url: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 状态变更，`None` 的字段保持不变
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl StatusUpdate {
    pub fn status(status: ApplicationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, retry_count: u32) -> Self {
        Self {
            status: Some(ApplicationStatus::Failed),
            error_message: Some(error.into()),
            retry_count: Some(retry_count),
            ..Default::default()
        }
    }
}

/// 队列任务载荷
///
/// 由 API 层创建后不再修改，终态后按队列保留策略清理
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationJob {
    pub application_id: String,
    pub user_id: String,
    pub job_id: String,
    pub cv_snapshot: CvSnapshot,
    pub job_posting: JobPosting,
    pub resume_asset_ref: Option<String>,
    pub delay_ms: u64,
    pub priority: u32,
    pub idempotency_key: String,
}

impl ApplicationJob {
    /// 申请表单地址
    pub fn target_url(&self) -> Option<&str> {
        self.job_posting.apply_url()
    }
}

/// 由 (user_id, job_id) 确定的幂等键
pub fn idempotency_key(user_id: &str, job_id: &str) -> String {
    format!("apply:{}:{}", user_id, job_id)
}
