//! 平台适配器
//!
//! 每个平台一个适配器，按 `Platform` 枚举分派。
//! 可选字段失败只记日志；核心字段（姓名、邮箱）失败直接返回错误。

mod greenhouse;
mod lever;
mod linkedin;
mod workday;

pub use greenhouse::GreenhouseAdapter;
pub use lever::LeverAdapter;
pub use linkedin::LinkedInAdapter;
pub use workday::WorkdayAdapter;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::infrastructure::FormPage;
use crate::models::{CvSnapshot, JobPosting, Platform};
use crate::services::FieldMapper;
use crate::workflow::generic::GenericFormHandler;

/// 填写表单所需的上下文
pub struct FillContext<'a> {
    pub cv: &'a CvSnapshot,
    pub job: &'a JobPosting,
    pub resume_path: Option<&'a Path>,
    pub mapper: &'a FieldMapper,
    /// 上传等操作后的等待时间
    pub settle: Duration,
    /// 日志前缀
    pub tag: &'a str,
}

impl FillContext<'_> {
    pub async fn settle(&self) {
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }
    }

    pub fn job_description(&self) -> &str {
        self.job.description.as_deref().unwrap_or_default()
    }
}

/// 适配器填写结果
#[derive(Debug, Clone, Default)]
pub struct AdapterOutcome {
    pub message: String,
    /// 适配器明确给出的确认页地址
    pub confirmation_url: Option<String>,
    pub fields_processed: usize,
}

/// 平台适配能力
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn fill(&self, page: &dyn FormPage, ctx: &FillContext<'_>) -> AppResult<AdapterOutcome>;
}

static GREENHOUSE: GreenhouseAdapter = GreenhouseAdapter;
static LEVER: LeverAdapter = LeverAdapter;
static WORKDAY: WorkdayAdapter = WorkdayAdapter;
static LINKEDIN: LinkedInAdapter = LinkedInAdapter;
static GENERIC: GenericFormHandler = GenericFormHandler;

/// 按平台选择适配器
pub fn adapter_for(platform: Platform) -> &'static dyn Adapter {
    match platform {
        Platform::Greenhouse => &GREENHOUSE,
        Platform::Lever => &LEVER,
        Platform::Workday => &WORKDAY,
        Platform::LinkedIn => &LINKEDIN,
        Platform::Generic => &GENERIC,
    }
}

// ========== 适配器共用的填写辅助 ==========

/// 填写可选字段，失败只记日志
pub(crate) async fn fill_optional(
    page: &dyn FormPage,
    selector: &str,
    value: &str,
    ctx: &FillContext<'_>,
) -> bool {
    match page.fill(selector, value).await {
        Ok(()) => true,
        Err(e) => {
            warn!("{} ⚠️ 可选字段 {} 填写失败: {}", ctx.tag, selector, e);
            false
        }
    }
}

/// 上传简历，找不到上传控件或没有简历时跳过
pub(crate) async fn upload_resume(
    page: &dyn FormPage,
    selector: &str,
    ctx: &FillContext<'_>,
) -> bool {
    let Some(resume_path) = ctx.resume_path else {
        debug!("{} 没有简历文件，跳过上传", ctx.tag);
        return false;
    };

    match page.exists(selector).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("{} 未找到简历上传控件: {}", ctx.tag, selector);
            return false;
        }
        Err(e) => {
            warn!("{} ⚠️ 检查上传控件失败: {}", ctx.tag, e);
            return false;
        }
    }

    match page.upload_file(selector, resume_path).await {
        Ok(()) => {
            ctx.settle().await;
            true
        }
        Err(e) => {
            warn!("{} ⚠️ 简历上传失败: {}", ctx.tag, e);
            false
        }
    }
}

/// 为页面上所有带标签的文本框生成回答并填写，返回成功填写的数量
pub(crate) async fn answer_open_questions(page: &dyn FormPage, ctx: &FillContext<'_>) -> usize {
    let textareas = match page.select_all("textarea").await {
        Ok(selectors) => selectors,
        Err(e) => {
            warn!("{} ⚠️ 查找文本框失败: {}", ctx.tag, e);
            return 0;
        }
    };

    let mut answered = 0;
    for selector in textareas {
        let label = match page.label_for(&selector).await {
            Ok(Some(label)) => label,
            Ok(None) => continue,
            Err(e) => {
                warn!("{} ⚠️ 读取字段标签失败: {}", ctx.tag, e);
                continue;
            }
        };

        debug!("{} 生成回答: {}", ctx.tag, label);
        // 生成失败时填空回答，不影响其他字段
        let answer = ctx
            .mapper
            .answer_question(&label, ctx.cv, ctx.job_description())
            .await
            .unwrap_or_else(|e| {
                warn!("{} ⚠️ 生成回答失败 ({}): {}", ctx.tag, label, e);
                String::new()
            });

        if fill_optional(page, &selector, &answer, ctx).await {
            answered += 1;
        }
    }
    answered
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::models::{CvSnapshot, JobPosting};
    use crate::services::ai_provider::{AiProvider, CompletionBackend};
    use crate::services::FieldMapper;
    use crate::testing::ScriptedBackend;

    pub fn cv() -> CvSnapshot {
        crate::testing::sample_cv()
    }

    pub fn job() -> JobPosting {
        crate::testing::sample_posting("j1", "https://boards.greenhouse.io/acme/jobs/1")
    }

    pub fn mapper(backend: Arc<ScriptedBackend>) -> FieldMapper {
        let ai = AiProvider::new(
            Some(backend as Arc<dyn CompletionBackend>),
            None,
            Duration::from_secs(60),
        );
        FieldMapper::new(Arc::new(ai))
    }
}
