//! 申请记录存储 - 业务能力层
//!
//! `applications` 表的读写，以及读取简历快照和职位信息。
//! 生产环境使用 [`SupabaseStore`](crate::clients::SupabaseStore)，未配置时退回内存实现。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppResult, StoreError};
use crate::models::{ApplicationRecord, ApplicationStatus, CvSnapshot, JobPosting, StatusUpdate};

/// 记录存储能力
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 新建一条 `queued` 记录
    async fn create(&self, user_id: &str, job_id: &str) -> AppResult<ApplicationRecord>;

    async fn get(&self, id: &str) -> AppResult<Option<ApplicationRecord>>;

    /// 同一用户对同一职位的最新记录
    async fn find_for_job(&self, user_id: &str, job_id: &str) -> AppResult<Option<ApplicationRecord>>;

    /// 用户的全部记录，按创建时间倒序
    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<ApplicationRecord>>;

    async fn count_created_since(&self, user_id: &str, since: DateTime<Utc>) -> AppResult<usize>;

    /// 应用状态变更并刷新 `updated_at`
    async fn update(&self, id: &str, update: StatusUpdate) -> AppResult<ApplicationRecord>;

    async fn cv_snapshot(&self, user_id: &str) -> AppResult<Option<CvSnapshot>>;

    async fn job_posting(&self, job_id: &str) -> AppResult<Option<JobPosting>>;
}

/// 将变更合并到记录上
pub(crate) fn apply_update(record: &mut ApplicationRecord, update: StatusUpdate) {
    if let Some(status) = update.status {
        record.status = status;
    }
    if let Some(error) = update.error_message {
        record.error_message = Some(error);
    }
    if let Some(screenshot) = update.screenshot_url {
        record.screenshot_url = Some(screenshot);
    }
    if let Some(confirmation) = update.confirmation_url {
        record.confirmation_url = Some(confirmation);
    }
    if let Some(retry_count) = update.retry_count {
        record.retry_count = retry_count;
    }
    record.updated_at = Utc::now();
}

#[derive(Default)]
struct MemoryTables {
    applications: Vec<ApplicationRecord>,
    cvs: HashMap<String, CvSnapshot>,
    jobs: HashMap<String, JobPosting>,
}

/// 内存存储，用于本地运行和测试
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_cv(&self, user_id: &str, cv: CvSnapshot) {
        self.lock().cvs.insert(user_id.to_string(), cv);
    }

    pub fn put_job(&self, job: JobPosting) {
        self.lock().jobs.insert(job.id.clone(), job);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, user_id: &str, job_id: &str) -> AppResult<ApplicationRecord> {
        let now = Utc::now();
        let record = ApplicationRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            job_id: job_id.to_string(),
            status: ApplicationStatus::Queued,
            error_message: None,
            screenshot_url: None,
            confirmation_url: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.lock().applications.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> AppResult<Option<ApplicationRecord>> {
        Ok(self.lock().applications.iter().find(|r| r.id == id).cloned())
    }

    async fn find_for_job(&self, user_id: &str, job_id: &str) -> AppResult<Option<ApplicationRecord>> {
        Ok(self
            .lock()
            .applications
            .iter()
            .rev()
            .find(|r| r.user_id == user_id && r.job_id == job_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<ApplicationRecord>> {
        let mut records: Vec<_> = self
            .lock()
            .applications
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn count_created_since(&self, user_id: &str, since: DateTime<Utc>) -> AppResult<usize> {
        Ok(self
            .lock()
            .applications
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .count())
    }

    async fn update(&self, id: &str, update: StatusUpdate) -> AppResult<ApplicationRecord> {
        let mut tables = self.lock();
        let record = tables
            .applications
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply_update(record, update);
        Ok(record.clone())
    }

    async fn cv_snapshot(&self, user_id: &str) -> AppResult<Option<CvSnapshot>> {
        Ok(self.lock().cvs.get(user_id).cloned())
    }

    async fn job_posting(&self, job_id: &str) -> AppResult<Option<JobPosting>> {
        Ok(self.lock().jobs.get(job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_create_and_update() {
        let store = MemoryStore::new();
        let record = store.create("u1", "j1").await.unwrap();
        assert_eq!(record.status, ApplicationStatus::Queued);
        assert_eq!(record.retry_count, 0);

        let updated = store
            .update(&record.id, StatusUpdate::failed("timeout", 2))
            .await
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::Failed);
        assert_eq!(updated.error_message.as_deref(), Some("timeout"));
        assert_eq!(updated.retry_count, 2);
        assert!(updated.updated_at >= record.updated_at);

        // 未设置的字段保持不变
        let updated = store
            .update(&record.id, StatusUpdate::status(ApplicationStatus::Queued))
            .await
            .unwrap();
        assert_eq!(updated.error_message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let store = MemoryStore::new();
        assert_err!(store.update("missing", StatusUpdate::default()).await);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_user() {
        let store = MemoryStore::new();
        store.create("u1", "j1").await.unwrap();
        store.create("u2", "j1").await.unwrap();
        store.create("u1", "j2").await.unwrap();

        let records = store.list_for_user("u1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.user_id == "u1"));
        assert!(records[0].created_at >= records[1].created_at);
        assert_eq!(
            store.count_created_since("u1", Utc::now() - chrono::Duration::hours(1)).await.unwrap(),
            2
        );
        assert!(store.find_for_job("u2", "j2").await.unwrap().is_none());
    }
}
