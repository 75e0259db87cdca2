use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, AutomationError};
use crate::infrastructure::{CdpPage, FormPage, PageSource};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 浏览器会话
///
/// 每个 worker 进程持有一个浏览器进程，每次申请尝试在其中创建独立的隔离上下文
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// 启动无头浏览器
    pub async fn launch(config: &Config) -> AppResult<Self> {
        info!("🚀 启动无头浏览器...");

        let mut builder = BrowserConfig::builder().new_headless_mode().args(vec![
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--disable-setuid-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=1920,1080".to_string(),
            format!("--user-agent={}", USER_AGENT),
        ]);
        if let Some(executable) = &config.chrome_executable {
            debug!("使用浏览器: {}", executable);
            builder = builder.chrome_executable(Path::new(executable));
        }

        let browser_config = builder.build().map_err(|e| {
            error!("配置无头浏览器失败: {}", e);
            AppError::Automation(AutomationError::LaunchFailed(e))
        })?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            error!("启动无头浏览器失败: {}", e);
            AppError::Automation(AutomationError::LaunchFailed(e.to_string()))
        })?;

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 添加短暂延迟以等待浏览器状态同步
        sleep(Duration::from_millis(300)).await;

        info!("✅ 无头浏览器已就绪");
        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// 关闭浏览器进程
    pub async fn shutdown(mut self) {
        info!("🧹 正在关闭浏览器...");
        if let Err(e) = self.browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("等待浏览器进程退出失败: {}", e);
        }
        self.handler_task.abort();
    }
}

#[async_trait]
impl PageSource for BrowserSession {
    async fn open_page(&self) -> AppResult<Box<dyn FormPage + '_>> {
        let context_failed =
            |e: String| AppError::Automation(AutomationError::ContextFailed(e));

        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| context_failed(e.to_string()))?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(context_failed)?;

        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                let _ = self
                    .browser
                    .execute(DisposeBrowserContextParams::new(context_id))
                    .await;
                return Err(context_failed(e.to_string()));
            }
        };

        debug!("已创建隔离上下文: {:?}", context_id);
        Ok(Box::new(CdpPage::new(page, &self.browser, Some(context_id))))
    }
}
