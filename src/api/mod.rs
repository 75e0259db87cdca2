//! HTTP 接口层
//!
//! 只负责请求解析与响应编码，业务逻辑全部委托给 [`ApplyService`] 和 [`AiProvider`]。
//!
//! | 路由 | 说明 |
//! |------|------|
//! | `POST /api/apply/{job_id}` | 申请单个职位 |
//! | `POST /api/apply/bulk` | 批量申请 |
//! | `GET /api/apply/status/{application_id}` | 查询申请记录 |
//! | `GET /api/apply/user/{user_id}` | 用户的全部申请 |
//! | `GET /api/queue/failed` | 最近失败的队列任务 |
//! | `POST /api/ai/search` | AI 职位搜索 |
//! | `GET /api/health` | 队列与 AI 状态 |

mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::orchestrator::ApplyService;
use crate::services::AiProvider;

/// 处理函数共享的状态
pub struct AppState {
    pub service: Arc<ApplyService>,
    pub ai: Arc<AiProvider>,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/apply/bulk", post(handlers::apply_bulk))
        .route("/api/apply/status/{application_id}", get(handlers::status))
        .route("/api/apply/user/{user_id}", get(handlers::user_applications))
        .route("/api/apply/{job_id}", post(handlers::apply))
        .route("/api/queue/failed", get(handlers::failed_jobs))
        .route("/api/ai/search", post(handlers::ai_search))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}
