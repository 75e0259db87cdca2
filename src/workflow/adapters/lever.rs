use async_trait::async_trait;
use tracing::info;

use super::{answer_open_questions, fill_optional, upload_resume, Adapter, AdapterOutcome, FillContext};
use crate::error::AppResult;
use crate::infrastructure::FormPage;

/// Lever 适配器，姓名为单个输入框
pub struct LeverAdapter;

#[async_trait]
impl Adapter for LeverAdapter {
    async fn fill(&self, page: &dyn FormPage, ctx: &FillContext<'_>) -> AppResult<AdapterOutcome> {
        page.fill("input[name=\"name\"]", &ctx.cv.full_name).await?;
        page.fill("input[name=\"email\"]", &ctx.cv.email).await?;
        let mut fields_processed = 2;

        if fill_optional(page, "input[name=\"phone\"]", ctx.cv.phone_or_empty(), ctx).await {
            fields_processed += 1;
        }
        if upload_resume(page, "input[type=\"file\"][name=\"resume\"]", ctx).await {
            fields_processed += 1;
        }
        fields_processed += answer_open_questions(page, ctx).await;

        info!("{} ✓ Lever 表单已填写 {} 个字段", ctx.tag, fields_processed);
        Ok(AdapterOutcome {
            message: "Lever 表单填写成功".to_string(),
            confirmation_url: page.current_url().await.ok(),
            fields_processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakePage, ScriptedBackend};
    use crate::workflow::adapters::test_support;

    #[tokio::test]
    async fn test_fills_full_name_and_resume() {
        let page = FakePage::new().with_elements(&[
            "input[name=\"name\"]",
            "input[name=\"email\"]",
            "input[name=\"phone\"]",
            "input[type=\"file\"][name=\"resume\"]",
        ]);
        let mapper = test_support::mapper(Arc::new(ScriptedBackend::new("gemini")));
        let (cv, job) = (test_support::cv(), test_support::job());
        let ctx = FillContext {
            cv: &cv,
            job: &job,
            resume_path: Some(Path::new("/tmp/ada.pdf")),
            mapper: &mapper,
            settle: Duration::ZERO,
            tag: "[test]",
        };

        let outcome = LeverAdapter.fill(&page, &ctx).await.unwrap();

        let state = page.state();
        assert_eq!(state.filled["input[name=\"name\"]"], "Ada King Lovelace");
        assert_eq!(state.filled["input[name=\"phone\"]"], "+44 20 1234");
        assert_eq!(state.uploaded.len(), 1);
        assert_eq!(outcome.fields_processed, 4);
    }

    #[tokio::test]
    async fn test_without_resume_skips_upload() {
        let page = FakePage::new().with_elements(&[
            "input[name=\"name\"]",
            "input[name=\"email\"]",
            "input[type=\"file\"][name=\"resume\"]",
        ]);
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

        let outcome = LeverAdapter.fill(&page, &ctx).await.unwrap();
        assert!(page.state().uploaded.is_empty());
        assert_eq!(outcome.fields_processed, 2);
    }
}
