//! 页面驱动 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露表单自动化需要的原语：
//! navigate / fill / upload / screenshot / read html / current url

use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::DisposeBrowserContextParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, AutomationError};

/// 页面自动化原语
///
/// 职责：
/// - 不认识简历 / 职位
/// - 不处理业务流程
/// - 每次尝试独占一个实例，结束时必须 `close`
#[async_trait]
pub trait FormPage: Send + Sync {
    async fn navigate(&self, url: &str) -> AppResult<()>;

    /// 当前页面地址
    async fn current_url(&self) -> AppResult<String>;

    /// 渲染后的完整 HTML
    async fn read_html(&self) -> AppResult<String>;

    async fn exists(&self, selector: &str) -> AppResult<bool>;

    async fn fill(&self, selector: &str, value: &str) -> AppResult<()>;

    async fn upload_file(&self, selector: &str, path: &Path) -> AppResult<()>;

    /// 点击第一个文本包含 `text` 的 `tag` 元素
    async fn click_text(&self, tag: &str, text: &str) -> AppResult<()>;

    /// 字段的可读标签
    async fn label_for(&self, selector: &str) -> AppResult<Option<String>>;

    /// 为每个匹配元素返回一个唯一选择器
    async fn select_all(&self, selector: &str) -> AppResult<Vec<String>>;

    async fn screenshot(&self, path: &Path) -> AppResult<()>;

    /// 关闭页面并释放隔离上下文
    async fn close(self: Box<Self>) -> AppResult<()>;
}

/// 页面来源：为每次尝试提供一个全新的隔离页面
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn open_page(&self) -> AppResult<Box<dyn FormPage + '_>>;
}

/// 基于 CDP 的页面驱动
pub struct CdpPage<'a> {
    page: Page,
    browser: &'a Browser,
    context_id: Option<BrowserContextId>,
}

impl<'a> CdpPage<'a> {
    pub fn new(page: Page, browser: &'a Browser, context_id: Option<BrowserContextId>) -> Self {
        Self {
            page,
            browser,
            context_id,
        }
    }

    /// 执行 JS 代码并反序列化为指定类型
    async fn eval_as<T: DeserializeOwned>(&self, js_code: String) -> AppResult<T> {
        let result = self.page.evaluate(js_code).await?;
        result
            .into_value()
            .map_err(|e| AppError::Automation(AutomationError::ScriptFailed(e.to_string())))
    }
}

/// 把字符串安全地嵌入 JS 源码
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl FormPage for CdpPage<'_> {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::navigation(url, e))?;
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self
            .page
            .url()
            .await?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn read_html(&self) -> AppResult<String> {
        Ok(self.page.content().await?)
    }

    async fn exists(&self, selector: &str) -> AppResult<bool> {
        let js_code = format!("document.querySelector({}) !== null", js_str(selector));
        self.eval_as(js_code).await
    }

    async fn fill(&self, selector: &str, value: &str) -> AppResult<()> {
        // 通过原生 setter 赋值并派发事件，React/Vue 表单才能感知到变化
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                const proto = el.tagName === 'TEXTAREA'
                    ? HTMLTextAreaElement.prototype
                    : HTMLInputElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
                el.focus();
                setter.call(el, {value});
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                el.blur();
                return true;
            }})()
            "#,
            selector = js_str(selector),
            value = js_str(value),
        );

        let filled: bool = self.eval_as(js_code).await?;
        if filled {
            Ok(())
        } else {
            Err(AppError::selector_not_found(selector))
        }
    }

    async fn upload_file(&self, selector: &str, path: &Path) -> AppResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AppError::selector_not_found(selector))?;

        let upload_failed = |reason: String| {
            AppError::Automation(AutomationError::UploadFailed {
                selector: selector.to_string(),
                reason,
            })
        };

        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string_lossy().to_string()])
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(upload_failed)?;

        self.page
            .execute(params)
            .await
            .map_err(|e| upload_failed(e.to_string()))?;
        Ok(())
    }

    async fn click_text(&self, tag: &str, text: &str) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const wanted = {text}.toLowerCase();
                const el = Array.from(document.querySelectorAll({tag}))
                    .find(e => (e.textContent || '').toLowerCase().includes(wanted));
                if (!el) return false;
                el.click();
                return true;
            }})()
            "#,
            tag = js_str(tag),
            text = js_str(text),
        );

        let clicked: bool = self.eval_as(js_code).await?;
        if clicked {
            Ok(())
        } else {
            Err(AppError::selector_not_found(format!("{}:has-text(\"{}\")", tag, text)))
        }
    }

    async fn label_for(&self, selector: &str) -> AppResult<Option<String>> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return null;
                if (el.id) {{
                    const label = document.querySelector(`label[for="${{CSS.escape(el.id)}}"]`);
                    if (label) return label.textContent.trim();
                }}
                const wrapping = el.closest('label');
                if (wrapping) return wrapping.textContent.trim();
                return el.getAttribute('aria-label') || el.getAttribute('placeholder') || null;
            }})()
            "#,
            selector = js_str(selector),
        );

        let label: Option<String> = self.eval_as(js_code).await?;
        Ok(label.filter(|l| !l.is_empty()))
    }

    async fn select_all(&self, selector: &str) -> AppResult<Vec<String>> {
        // 给每个匹配元素打上标记属性，返回可以唯一定位的选择器
        let js_code = format!(
            r#"
            (() => {{
                const stamp = Date.now().toString(36);
                return Array.from(document.querySelectorAll({selector})).map((el, i) => {{
                    const mark = `${{stamp}}-${{i}}`;
                    el.setAttribute('data-auto-apply', mark);
                    return `[data-auto-apply="${{mark}}"]`;
                }});
            }})()
            "#,
            selector = js_str(selector),
        );
        self.eval_as(js_code).await
    }

    async fn screenshot(&self, path: &Path) -> AppResult<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(|e| AppError::Automation(AutomationError::ScreenshotFailed(e.to_string())))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        let CdpPage {
            page,
            browser,
            context_id,
        } = *self;

        if let Err(e) = page.close().await {
            warn!("关闭页面失败: {}", e);
        }

        if let Some(context_id) = context_id {
            browser
                .execute(DisposeBrowserContextParams::new(context_id))
                .await
                .map_err(|e| AppError::Automation(AutomationError::ContextFailed(e.to_string())))?;
            debug!("隔离上下文已释放");
        }

        Ok(())
    }
}
