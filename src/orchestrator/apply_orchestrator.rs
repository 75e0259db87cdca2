//! 单次申请编排器 - 编排层
//!
//! ## 职责
//!
//! 执行一次申请尝试：打开隔离页面 → 导航 → 识别平台 → 适配器填写 → 截图 → 关闭页面。
//!
//! ## 约定
//!
//! - 任何错误都在这里转换为 [`ApplicationResult`]，不向 worker 抛出
//! - 无论成功失败都尝试截图，截图失败只记日志
//! - 页面在每条路径上都会关闭，下载的简历随后删除

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, AutomationError, ValidationError};
use crate::infrastructure::{FormPage, PageSource};
use crate::models::{ApplicationJob, ApplicationResult, FailureKind};
use crate::services::{FieldMapper, ResumeFile, ResumeResolver};
use crate::workflow::{adapter_for, classify, AdapterOutcome, FillContext};

/// 单次尝试所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Initializing,
    Navigated,
    Classified,
    Filling,
    Captured,
    Done,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Initializing => "初始化",
            AttemptState::Navigated => "已导航",
            AttemptState::Classified => "已识别平台",
            AttemptState::Filling => "填写中",
            AttemptState::Captured => "已截图",
            AttemptState::Done => "完成",
        };
        f.write_str(name)
    }
}

/// 执行一次申请尝试的能力
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, pages: &dyn PageSource, job: &ApplicationJob) -> ApplicationResult;
}

/// 申请编排器
pub struct ApplyOrchestrator {
    mapper: FieldMapper,
    resumes: ResumeResolver,
    screenshot_dir: PathBuf,
    navigation_timeout: Duration,
    settle: Duration,
}

/// 单次尝试的可变上下文
struct Attempt<'a> {
    job: &'a ApplicationJob,
    tag: String,
    state: AttemptState,
    result: ApplicationResult,
}

impl Attempt<'_> {
    fn advance(&mut self, state: AttemptState) {
        debug!("{} 阶段: {} → {}", self.tag, self.state, state);
        self.state = state;
    }
}

impl ApplyOrchestrator {
    pub fn new(mapper: FieldMapper, resumes: ResumeResolver, config: &Config) -> Self {
        Self {
            mapper,
            resumes,
            screenshot_dir: PathBuf::from(&config.screenshot_dir),
            navigation_timeout: config.navigation_timeout(),
            settle: config.settle_delay(),
        }
    }

    /// 解析简历文件，失败时不带简历继续
    async fn resolve_resume(&self, attempt: &Attempt<'_>) -> Option<ResumeFile> {
        let asset = attempt
            .job
            .resume_asset_ref
            .as_deref()
            .or(attempt.job.cv_snapshot.resume_url.as_deref())
            .filter(|s| !s.trim().is_empty())?;

        match self.resumes.resolve(asset, &attempt.job.application_id).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("{} ⚠️ {}，将不上传简历", attempt.tag, e);
                None
            }
        }
    }

    /// 导航、识别平台并交给适配器填写
    async fn fill_form(
        &self,
        page: &dyn FormPage,
        url: &str,
        resume_path: Option<&Path>,
        attempt: &mut Attempt<'_>,
    ) -> AppResult<AdapterOutcome> {
        info!("{} 🌐 打开申请页面: {}", attempt.tag, url);
        timeout(self.navigation_timeout, page.navigate(url))
            .await
            .map_err(|_| AutomationError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: self.navigation_timeout.as_millis() as u64,
            })??;
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }
        attempt.advance(AttemptState::Navigated);

        let landed_url = page.current_url().await?;
        let html = page.read_html().await?;
        let platform = classify(&landed_url, &html);
        attempt.result.platform = Some(platform);
        attempt.advance(AttemptState::Classified);
        info!("{} 🔍 识别平台: {}", attempt.tag, platform);

        attempt.advance(AttemptState::Filling);
        let ctx = FillContext {
            cv: &attempt.job.cv_snapshot,
            job: &attempt.job.job_posting,
            resume_path,
            mapper: &self.mapper,
            settle: self.settle,
            tag: &attempt.tag,
        };
        adapter_for(platform).fill(page, &ctx).await
    }

    /// 整页截图，失败返回 None
    async fn capture(&self, page: &dyn FormPage, tag: &str) -> Option<String> {
        if let Err(e) = tokio::fs::create_dir_all(&self.screenshot_dir).await {
            warn!("{} ⚠️ 无法创建截图目录: {}", tag, e);
            return None;
        }
        let path = self
            .screenshot_dir
            .join(format!("application_{}.png", Utc::now().timestamp_millis()));

        match page.screenshot(&path).await {
            Ok(()) => {
                debug!("{} 📸 截图已保存: {}", tag, path.display());
                Some(path.to_string_lossy().into_owned())
            }
            Err(e) => {
                warn!("{} ⚠️ 截图失败: {}", tag, e);
                None
            }
        }
    }
}

/// 按错误类型决定是否重试
fn failure_from(error: &AppError) -> ApplicationResult {
    let kind = if error.is_retryable() {
        FailureKind::Retryable
    } else {
        FailureKind::Permanent
    };
    ApplicationResult::failed(error.to_string(), kind)
}

#[async_trait]
impl Applier for ApplyOrchestrator {
    async fn apply(&self, pages: &dyn PageSource, job: &ApplicationJob) -> ApplicationResult {
        let mut attempt = Attempt {
            job,
            tag: format!("[申请 {}]", job.application_id),
            state: AttemptState::Initializing,
            result: ApplicationResult::default(),
        };

        let Some(url) = job.target_url().map(str::to_string) else {
            let err: AppError = ValidationError::MissingApplicationUrl {
                job_id: job.job_id.clone(),
            }
            .into();
            error!("{} ❌ {}", attempt.tag, err);
            return failure_from(&err);
        };

        let page = match pages.open_page().await {
            Ok(page) => page,
            Err(e) => {
                error!("{} ❌ 无法打开页面: {}", attempt.tag, e);
                return failure_from(&e);
            }
        };

        let resume = self.resolve_resume(&attempt).await;
        let filled = self
            .fill_form(
                page.as_ref(),
                &url,
                resume.as_ref().map(ResumeFile::path),
                &mut attempt,
            )
            .await;
        let failed_at = attempt.state;

        let screenshot = self.capture(page.as_ref(), &attempt.tag).await;
        attempt.advance(AttemptState::Captured);
        let final_url = page.current_url().await.ok().filter(|u| !u.is_empty());

        if let Err(e) = page.close().await {
            warn!("{} ⚠️ 关闭页面失败: {}", attempt.tag, e);
        }
        if let Some(resume) = resume {
            resume.discard().await;
        }
        attempt.advance(AttemptState::Done);

        let platform = attempt.result.platform;
        let mut result = match filled {
            Ok(outcome) => {
                info!(
                    "{} ✅ {} (处理 {} 个字段)",
                    attempt.tag, outcome.message, outcome.fields_processed
                );
                ApplicationResult {
                    success: true,
                    message: Some(outcome.message),
                    confirmation_url: outcome.confirmation_url.or(final_url),
                    fields_processed: outcome.fields_processed,
                    ..Default::default()
                }
            }
            Err(e) => {
                error!("{} ❌ 申请失败 (阶段: {}): {}", attempt.tag, failed_at, e);
                failure_from(&e)
            }
        };
        result.platform = platform;
        result.screenshot_path = screenshot;
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::Platform;
    use crate::services::ai_provider::{AiProvider, CompletionBackend};
    use crate::testing::{sample_job, FakePage, FakePageSource, ScriptedBackend};

    fn orchestrator(dir: &str) -> ApplyOrchestrator {
        let backend = Arc::new(ScriptedBackend::new("gemini"));
        let ai = AiProvider::new(
            Some(backend as Arc<dyn CompletionBackend>),
            None,
            Duration::from_secs(60),
        );
        let config = Config {
            screenshot_dir: std::env::temp_dir().join(dir).to_string_lossy().into_owned(),
            settle_delay_ms: 0,
            ..Config::default()
        };
        ApplyOrchestrator::new(
            FieldMapper::new(Arc::new(ai)),
            ResumeResolver::new(std::env::temp_dir()),
            &config,
        )
    }

    fn greenhouse_page() -> FakePage {
        FakePage::new().with_elements(&["#first_name", "#last_name", "#email"])
    }

    #[tokio::test]
    async fn test_successful_attempt() {
        let pages = FakePageSource::new(greenhouse_page());
        let result = orchestrator("auto_apply_orch_ok").apply(&pages, &sample_job("a1")).await;

        assert!(result.success);
        assert_eq!(result.platform, Some(Platform::Greenhouse));
        assert_eq!(result.fields_processed, 3);
        assert_eq!(
            result.confirmation_url.as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/1")
        );
        assert!(result.screenshot_path.unwrap().ends_with(".png"));

        let state = pages.page().state();
        assert_eq!(state.opened, 1);
        assert_eq!(state.closed, 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_still_screenshots_and_closes() {
        let pages = FakePageSource::new(FakePage::new().failing_navigation());
        let result = orchestrator("auto_apply_orch_nav").apply(&pages, &sample_job("a1")).await;

        assert!(!result.success);
        assert!(result.is_retryable());
        assert!(result.platform.is_none());
        assert!(result.error_text().contains("ERR_NAME_NOT_RESOLVED"));

        let state = pages.page().state();
        assert_eq!(state.screenshots.len(), 1);
        assert_eq!(state.closed, 1);
    }

    #[tokio::test]
    async fn test_screenshot_failure_does_not_change_outcome() {
        let pages = FakePageSource::new(greenhouse_page().failing_screenshot());
        let result = orchestrator("auto_apply_orch_shot").apply(&pages, &sample_job("a1")).await;

        assert!(result.success);
        assert!(result.screenshot_path.is_none());
        assert_eq!(pages.page().state().closed, 1);
    }

    #[tokio::test]
    async fn test_linkedin_is_permanent() {
        let pages = FakePageSource::new(FakePage::new());
        let mut job = sample_job("a1");
        job.job_posting.application_url = Some("https://www.linkedin.com/jobs/view/1".to_string());

        let result = orchestrator("auto_apply_orch_li").apply(&pages, &job).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Permanent));
        assert_eq!(result.platform, Some(Platform::LinkedIn));
        assert_eq!(pages.page().state().closed, 1);
    }

    #[tokio::test]
    async fn test_browser_failure_has_no_screenshot() {
        let pages = FakePageSource::failing();
        let result = orchestrator("auto_apply_orch_browser").apply(&pages, &sample_job("a1")).await;

        assert!(!result.success);
        assert!(result.is_retryable());
        assert!(result.screenshot_path.is_none());
    }

    #[tokio::test]
    async fn test_local_resume_is_uploaded_and_kept() {
        let dir = std::env::temp_dir().join("auto_apply_orch_resume");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let cv = dir.join("cv.pdf");
        tokio::fs::write(&cv, b"%PDF-1.4").await.unwrap();

        let pages = FakePageSource::new(
            FakePage::new().with_elements(&[
                "#first_name",
                "#last_name",
                "#email",
                "input[type=\"file\"]",
            ]),
        );
        let mut job = sample_job("a1");
        job.resume_asset_ref = Some(cv.to_string_lossy().into_owned());

        let result = orchestrator("auto_apply_orch_resume_shots").apply(&pages, &job).await;
        assert!(result.success);
        assert_eq!(
            pages.page().state().uploaded.get("input[type=\"file\"]"),
            Some(&cv)
        );
        assert!(tokio::fs::metadata(&cv).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_url_is_permanent() {
        let pages = FakePageSource::new(FakePage::new());
        let mut job = sample_job("a1");
        job.job_posting.application_url = None;
        job.job_posting.job_url = None;

        let result = orchestrator("auto_apply_orch_url").apply(&pages, &job).await;
        assert_eq!(result.failure, Some(FailureKind::Permanent));
        assert_eq!(pages.page().state().opened, 0);
    }
}
