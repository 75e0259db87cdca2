//! 错误到 HTTP 响应的映射

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::error::{AppError, StoreError, ValidationError};

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(ValidationError::AlreadyApplied { .. }) => StatusCode::CONFLICT,
            AppError::Validation(ValidationError::CvNotFound { .. })
            | AppError::Validation(ValidationError::JobNotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Validation(ValidationError::DailyLimitReached { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("❌ 请求失败: {}", self);
        } else {
            warn!("请求被拒绝: {}", self);
        }

        let mut body = json!({ "success": false, "error": self.to_string() });
        if let AppError::Validation(ValidationError::AlreadyApplied { application_id, .. }) = &self {
            body["applicationId"] = json!(application_id);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE {
            body["message"] = json!("申请已记录但暂时无法处理，请稍后重试");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::missing_field("userId").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(ValidationError::AlreadyApplied {
                application_id: "a1".to_string(),
                status: "queued".to_string(),
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(ValidationError::DailyLimitReached { limit: 20, applied: 20 }).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::QueueUnavailable("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Config("bad".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_already_applied_body_carries_application_id() {
        let response = AppError::from(ValidationError::AlreadyApplied {
            application_id: "a1".to_string(),
            status: "processing".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
