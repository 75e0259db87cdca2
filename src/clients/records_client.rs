//! Supabase 记录存储客户端
//!
//! 通过 PostgREST 接口读写 `applications`、`cv_data`、`jobs` 三张表

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult, StoreError};
use crate::models::{ApplicationRecord, ApplicationStatus, CvSnapshot, JobPosting, StatusUpdate};
use crate::services::RecordStore;

/// Supabase 存储
pub struct SupabaseStore {
    http: reqwest::Client,
    rest_url: String,
    service_key: String,
}

#[derive(Serialize)]
struct RecordPatch<'a> {
    #[serde(flatten)]
    update: &'a StatusUpdate,
    updated_at: DateTime<Utc>,
}

impl SupabaseStore {
    pub fn new(base_url: &str, service_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            service_key: service_key.into(),
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// 发送请求并解析为行列表
    async fn rows<T: DeserializeOwned>(&self, table: &str, request: RequestBuilder) -> AppResult<Vec<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::store_request(table, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::BadResponse {
                endpoint: table.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| AppError::store_request(table, e))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> AppResult<Vec<T>> {
        debug!("查询 {}: {:?}", table, query);
        let request = self.request(Method::GET, table).query(&[("select", "*")]).query(query);
        self.rows(table, request).await
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn create(&self, user_id: &str, job_id: &str) -> AppResult<ApplicationRecord> {
        let request = self
            .request(Method::POST, "applications")
            .header("Prefer", "return=representation")
            .json(&json!({
                "user_id": user_id,
                "job_id": job_id,
                "status": ApplicationStatus::Queued,
                "retry_count": 0,
            }));
        self.rows::<ApplicationRecord>("applications", request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", user_id, job_id)).into())
    }

    async fn get(&self, id: &str) -> AppResult<Option<ApplicationRecord>> {
        let rows = self.select("applications", &[("id", eq(id))]).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_for_job(&self, user_id: &str, job_id: &str) -> AppResult<Option<ApplicationRecord>> {
        let rows = self
            .select(
                "applications",
                &[
                    ("user_id", eq(user_id)),
                    ("job_id", eq(job_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<ApplicationRecord>> {
        self.select(
            "applications",
            &[("user_id", eq(user_id)), ("order", "created_at.desc".to_string())],
        )
        .await
    }

    async fn count_created_since(&self, user_id: &str, since: DateTime<Utc>) -> AppResult<usize> {
        let rows: Vec<serde_json::Value> = self
            .select(
                "applications",
                &[
                    ("user_id", eq(user_id)),
                    ("created_at", format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Secs, true))),
                ],
            )
            .await?;
        Ok(rows.len())
    }

    async fn update(&self, id: &str, update: StatusUpdate) -> AppResult<ApplicationRecord> {
        let request = self
            .request(Method::PATCH, "applications")
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .json(&RecordPatch {
                update: &update,
                updated_at: Utc::now(),
            });
        self.rows::<ApplicationRecord>("applications", request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(id.to_string()).into())
    }

    async fn cv_snapshot(&self, user_id: &str) -> AppResult<Option<CvSnapshot>> {
        let rows = self
            .select(
                "cv_data",
                &[("user_id", eq(user_id)), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn job_posting(&self, job_id: &str) -> AppResult<Option<JobPosting>> {
        let rows = self.select("jobs", &[("id", eq(job_id))]).await?;
        Ok(rows.into_iter().next())
    }
}
