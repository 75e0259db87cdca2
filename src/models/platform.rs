use serde::{Deserialize, Serialize};
use std::fmt;

/// 平台分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Greenhouse 模板
    Greenhouse,
    /// Lever 模板
    Lever,
    /// Workday 模板（只完成入口步骤）
    Workday,
    /// 外部职业社交网络，需要人工登录
    LinkedIn,
    /// 未识别的表单，交给 AI 解析
    Generic,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Greenhouse => "greenhouse",
            Platform::Lever => "lever",
            Platform::Workday => "workday",
            Platform::LinkedIn => "linkedin",
            Platform::Generic => "generic",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
