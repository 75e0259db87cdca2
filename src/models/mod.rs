pub mod application;
pub mod form;
pub mod platform;
pub mod profile;
pub mod result;

pub use application::{idempotency_key, ApplicationJob, ApplicationRecord, ApplicationStatus, StatusUpdate};
pub use form::{FieldPurpose, FormField};
pub use platform::Platform;
pub use profile::{CvSnapshot, Education, Experience, JobPosting};
pub use result::{ApplicationResult, FailureKind};

use serde::{Deserialize, Deserializer};

/// 数据库主键可能是字符串也可能是数字，统一转成字符串
pub(crate) fn de_lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("无效的ID: {}", other))),
    }
}
