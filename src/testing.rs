//! 测试替身
//!
//! 脚本化的 AI 后端与内存页面，供单元测试和集成测试使用，不依赖浏览器和网络

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AiError, AppError, AppResult};
use crate::infrastructure::{FormPage, PageSource};
use crate::models::{idempotency_key, ApplicationJob, CvSnapshot, JobPosting};
use crate::services::ai_provider::CompletionBackend;

/// 测试用简历
pub fn sample_cv() -> CvSnapshot {
    CvSnapshot {
        full_name: "Ada King Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: Some("+44 20 1234".to_string()),
        summary: Some("Analyst and engine programmer".to_string()),
        skills: vec!["rust".to_string(), "analysis".to_string()],
        ..Default::default()
    }
}

/// 测试用职位
pub fn sample_posting(job_id: &str, url: &str) -> JobPosting {
    JobPosting {
        id: job_id.to_string(),
        job_title: "Engineer".to_string(),
        company_name: "Acme".to_string(),
        description: Some("Build difference engines".to_string()),
        application_url: Some(url.to_string()),
        ..Default::default()
    }
}

/// 测试用队列任务载荷，用户 u1、职位 j1
pub fn sample_job(application_id: &str) -> ApplicationJob {
    ApplicationJob {
        application_id: application_id.to_string(),
        user_id: "u1".to_string(),
        job_id: "j1".to_string(),
        cv_snapshot: sample_cv(),
        job_posting: sample_posting("j1", "https://boards.greenhouse.io/acme/jobs/1"),
        resume_asset_ref: None,
        delay_ms: 0,
        priority: 1,
        idempotency_key: idempotency_key("u1", "j1"),
    }
}

/// 脚本化的补全后端
///
/// 按顺序返回预设的结果，脚本用完后回显 `"<name>: <prompt>"`
pub struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Result<String, AiError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_response(&self, text: &str) {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn push_quota_error(&self) {
        self.script.lock().unwrap().push_back(Err(AiError::QuotaExceeded {
            provider: self.name.clone(),
            message: "429 Too Many Requests".to_string(),
        }));
    }

    pub fn push_error(&self, message: &str) {
        self.script.lock().unwrap().push_back(Err(AiError::Request {
            provider: self.name.clone(),
            message: message.to_string(),
        }));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.script.lock().unwrap().pop_front() {
            Some(scripted) => scripted,
            None => Ok(format!("{}: {}", self.name, prompt)),
        }
    }
}

/// 内存页面的状态，测试结束后可检查
#[derive(Debug, Default)]
pub struct FakePageState {
    pub url: String,
    pub html: String,
    /// 页面上存在的选择器
    pub elements: HashSet<String>,
    /// 选择器 -> 标签
    pub labels: HashMap<String, String>,
    /// 选择器 -> 匹配到的元素选择器列表
    pub groups: HashMap<String, Vec<String>>,
    /// 可点击的按钮文本
    pub buttons: HashSet<String>,
    /// 填写失败的选择器
    pub broken: HashSet<String>,
    pub fail_navigation: bool,
    pub fail_screenshot: bool,
    /// 导航后跳转的地址
    pub redirect_to: Option<String>,

    pub filled: HashMap<String, String>,
    pub uploaded: HashMap<String, PathBuf>,
    pub clicked: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub opened: usize,
    pub closed: usize,
}

/// 内存页面
#[derive(Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakePageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_html(self, html: &str) -> Self {
        self.state.lock().unwrap().html = html.to_string();
        self
    }

    pub fn with_elements(self, selectors: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.elements.extend(selectors.iter().map(|s| s.to_string()));
        }
        self
    }

    pub fn with_label(self, selector: &str, label: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.elements.insert(selector.to_string());
            state.labels.insert(selector.to_string(), label.to_string());
        }
        self
    }

    pub fn with_group(self, selector: &str, members: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.elements.extend(members.iter().map(|s| s.to_string()));
            state
                .groups
                .insert(selector.to_string(), members.iter().map(|s| s.to_string()).collect());
        }
        self
    }

    pub fn with_button(self, text: &str) -> Self {
        self.state.lock().unwrap().buttons.insert(text.to_string());
        self
    }

    pub fn with_broken(self, selector: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.elements.insert(selector.to_string());
            state.broken.insert(selector.to_string());
        }
        self
    }

    pub fn failing_navigation(self) -> Self {
        self.state.lock().unwrap().fail_navigation = true;
        self
    }

    pub fn failing_screenshot(self) -> Self {
        self.state.lock().unwrap().fail_screenshot = true;
        self
    }

    pub fn redirecting_to(self, url: &str) -> Self {
        self.state.lock().unwrap().redirect_to = Some(url.to_string());
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakePageState> {
        self.state.lock().unwrap()
    }

    fn require(&self, selector: &str) -> AppResult<()> {
        let state = self.state.lock().unwrap();
        if !state.elements.contains(selector) {
            return Err(AppError::selector_not_found(selector));
        }
        if state.broken.contains(selector) {
            return Err(AppError::Automation(crate::error::AutomationError::ScriptFailed(
                format!("元素不可编辑: {}", selector),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FormPage for FakePage {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_navigation {
            return Err(AppError::navigation(url, "net::ERR_NAME_NOT_RESOLVED"));
        }
        state.url = state.redirect_to.clone().unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn read_html(&self) -> AppResult<String> {
        Ok(self.state.lock().unwrap().html.clone())
    }

    async fn exists(&self, selector: &str) -> AppResult<bool> {
        Ok(self.state.lock().unwrap().elements.contains(selector))
    }

    async fn fill(&self, selector: &str, value: &str) -> AppResult<()> {
        self.require(selector)?;
        self.state
            .lock()
            .unwrap()
            .filled
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn upload_file(&self, selector: &str, path: &Path) -> AppResult<()> {
        self.require(selector)?;
        self.state
            .lock()
            .unwrap()
            .uploaded
            .insert(selector.to_string(), path.to_path_buf());
        Ok(())
    }

    async fn click_text(&self, tag: &str, text: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.buttons.contains(text) {
            return Err(AppError::selector_not_found(format!("{}:has-text(\"{}\")", tag, text)));
        }
        state.clicked.push(text.to_string());
        Ok(())
    }

    async fn label_for(&self, selector: &str) -> AppResult<Option<String>> {
        Ok(self.state.lock().unwrap().labels.get(selector).cloned())
    }

    async fn select_all(&self, selector: &str) -> AppResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .groups
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn screenshot(&self, path: &Path) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_screenshot {
            return Err(AppError::Automation(
                crate::error::AutomationError::ScreenshotFailed("target closed".to_string()),
            ));
        }
        state.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// 总是返回同一个内存页面的页面来源
#[derive(Clone, Default)]
pub struct FakePageSource {
    page: FakePage,
    fail_open: bool,
}

impl FakePageSource {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            fail_open: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            page: FakePage::new(),
            fail_open: true,
        }
    }

    pub fn page(&self) -> &FakePage {
        &self.page
    }
}

#[async_trait]
impl PageSource for FakePageSource {
    async fn open_page(&self) -> AppResult<Box<dyn FormPage + '_>> {
        if self.fail_open {
            return Err(AppError::Automation(
                crate::error::AutomationError::ContextFailed("browser disconnected".to_string()),
            ));
        }
        self.page.state().opened += 1;
        Ok(Box::new(self.page.clone()))
    }
}
