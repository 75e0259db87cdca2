use serde::{Deserialize, Serialize};

use super::platform::Platform;

/// 失败类型，决定队列是否重试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Retryable,
    Permanent,
}

/// 单次申请尝试的结果，由编排器产生、worker 消费
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub confirmation_url: Option<String>,
    pub screenshot_path: Option<String>,
    pub platform: Option<Platform>,
    pub fields_processed: usize,
}

impl ApplicationResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            failure: Some(kind),
            ..Default::default()
        }
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && self.failure != Some(FailureKind::Permanent)
    }

    /// 失败原因，成功时为空
    pub fn error_text(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "未知错误".to_string())
    }
}
