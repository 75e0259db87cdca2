use async_trait::async_trait;
use tracing::{info, warn};

use super::{fill_optional, Adapter, AdapterOutcome, FillContext};
use crate::error::AppResult;
use crate::infrastructure::FormPage;

const FIRST_NAME: &str = "input[data-automation-id*=\"firstName\"]";
const LAST_NAME: &str = "input[data-automation-id*=\"lastName\"]";

/// Workday 适配器
///
/// 只完成入口和姓名等基础字段，多步流程需要人工接手
pub struct WorkdayAdapter;

#[async_trait]
impl Adapter for WorkdayAdapter {
    async fn fill(&self, page: &dyn FormPage, ctx: &FillContext<'_>) -> AppResult<AdapterOutcome> {
        page.click_text("button", "Apply").await?;
        ctx.settle().await;

        let (first_name, last_name) = ctx.cv.split_name();
        let mut fields_processed = 0;
        for (selector, value) in [(FIRST_NAME, first_name.as_str()), (LAST_NAME, last_name.as_str())] {
            match page.exists(selector).await {
                Ok(true) => {
                    if fill_optional(page, selector, value, ctx).await {
                        fields_processed += 1;
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("{} ⚠️ 检查字段 {} 失败: {}", ctx.tag, selector, e),
            }
        }

        info!("{} ✓ Workday 基础字段已填写 {} 个，剩余步骤需人工完成", ctx.tag, fields_processed);
        Ok(AdapterOutcome {
            message: "Workday 申请已开始，需要人工完成剩余步骤".to_string(),
            confirmation_url: None,
            fields_processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakePage, ScriptedBackend};
    use crate::workflow::adapters::test_support;

    #[tokio::test]
    async fn test_clicks_apply_and_fills_names() {
        let page = FakePage::new()
            .with_button("Apply")
            .with_elements(&[FIRST_NAME, LAST_NAME]);
        let mapper = test_support::mapper(Arc::new(ScriptedBackend::new("gemini")));
        let (cv, job) = (test_support::cv(), test_support::job());
        let ctx = FillContext {
            cv: &cv,
            job: &job,
            resume_path: None,
            mapper: &mapper,
            settle: Duration::ZERO,
            tag: "[test]",
        };

        let outcome = WorkdayAdapter.fill(&page, &ctx).await.unwrap();

        let state = page.state();
        assert_eq!(state.clicked, vec!["Apply".to_string()]);
        assert_eq!(state.filled[FIRST_NAME], "Ada");
        assert_eq!(outcome.fields_processed, 2);
        assert!(outcome.message.contains("人工"));
    }

    #[tokio::test]
    async fn test_missing_apply_button_fails() {
        let page = FakePage::new();
        let mapper = test_support::mapper(Arc::new(ScriptedBackend::new("gemini")));
        let (cv, job) = (test_support::cv(), test_support::job());
        let ctx = FillContext {
            cv: &cv,
            job: &job,
            resume_path: None,
            mapper: &mapper,
            settle: Duration::ZERO,
            tag: "[test]",
        };

        assert!(WorkdayAdapter.fill(&page, &ctx).await.is_err());
    }
}
