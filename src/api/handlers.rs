//! HTTP 处理函数

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::AppState;
use crate::error::{AppError, AppResult, StoreError};
use crate::models::ApplicationRecord;
use crate::orchestrator::{ApplyReceipt, BulkReport};
use crate::queue::{FailedJob, QueueCounts};
use crate::services::ProviderStatus;

/// 失败任务列表的默认条数
const DEFAULT_FAILED_LIMIT: usize = 20;
const MAX_FAILED_LIMIT: usize = 200;

/// 成功响应：`{"success": true, ...data}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

pub type ApiResult<T> = AppResult<Json<Success<T>>>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Success {
        success: true,
        data,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyBody {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkBody {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub job_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct FailedQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyData {
    pub message: String,
    #[serde(flatten)]
    pub receipt: ApplyReceipt,
}

#[derive(Debug, Serialize)]
pub struct RecordData {
    pub application: ApplicationRecord,
}

#[derive(Debug, Serialize)]
pub struct RecordsData {
    pub applications: Vec<ApplicationRecord>,
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub queue: QueueHealthData,
    pub ai: ProviderStatus,
}

#[derive(Debug, Serialize)]
pub struct QueueHealthData {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<QueueCounts>,
}

#[derive(Debug, Serialize)]
pub struct SearchData {
    pub results: String,
}

#[derive(Debug, Serialize)]
pub struct FailedData {
    pub jobs: Vec<FailedJob>,
}

// POST /api/apply/{job_id}
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(body): Json<ApplyBody>,
) -> ApiResult<ApplyData> {
    info!("📥 收到申请请求: 用户 {} → 职位 {}", body.user_id, job_id);
    let receipt = state.service.apply(&body.user_id, &job_id).await?;
    ok(ApplyData {
        message: "申请已加入队列".to_string(),
        receipt,
    })
}

// POST /api/apply/bulk
pub async fn apply_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkBody>,
) -> ApiResult<BulkReport> {
    info!("📥 收到批量申请请求: 用户 {} 共 {} 个职位", body.user_id, body.job_ids.len());
    let report = state.service.apply_bulk(&body.user_id, &body.job_ids).await?;
    ok(report)
}

// GET /api/apply/status/{application_id}
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(application_id): Path<String>,
) -> ApiResult<RecordData> {
    let application = state
        .service
        .store()
        .get(&application_id)
        .await?
        .ok_or(StoreError::NotFound(application_id))?;
    ok(RecordData { application })
}

// GET /api/apply/user/{user_id}
pub async fn user_applications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<RecordsData> {
    let applications = state.service.store().list_for_user(&user_id).await?;
    ok(RecordsData { applications })
}

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Success<HealthData>> {
    let queue = state.service.queue();
    let available = queue.is_available();
    let counts = if available { queue.counts().await.ok() } else { None };

    let data = HealthData {
        status: if available { "ok" } else { "degraded" },
        queue: QueueHealthData { available, counts },
        ai: state.ai.status(),
    };
    Json(Success {
        success: true,
        data,
    })
}

// POST /api/ai/search
pub async fn ai_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> ApiResult<SearchData> {
    if body.query.trim().is_empty() {
        return Err(AppError::missing_field("query"));
    }
    let results = state.ai.search_listings(&body.query).await?;
    ok(SearchData { results })
}

// GET /api/queue/failed?limit=
pub async fn failed_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FailedQuery>,
) -> ApiResult<FailedData> {
    let limit = query.limit.unwrap_or(DEFAULT_FAILED_LIMIT).min(MAX_FAILED_LIMIT);
    let jobs = state.service.queue().recent_failures(limit).await?;
    ok(FailedData { jobs })
}
