use async_trait::async_trait;
use tracing::info;

use super::{answer_open_questions, fill_optional, upload_resume, Adapter, AdapterOutcome, FillContext};
use crate::error::AppResult;
use crate::infrastructure::FormPage;

/// Greenhouse 适配器
pub struct GreenhouseAdapter;

#[async_trait]
impl Adapter for GreenhouseAdapter {
    async fn fill(&self, page: &dyn FormPage, ctx: &FillContext<'_>) -> AppResult<AdapterOutcome> {
        let (first_name, last_name) = ctx.cv.split_name();

        // 核心字段
        page.fill("#first_name", &first_name).await?;
        page.fill("#last_name", &last_name).await?;
        page.fill("#email", &ctx.cv.email).await?;
        let mut fields_processed = 3;

        if fill_optional(page, "#phone", ctx.cv.phone_or_empty(), ctx).await {
            fields_processed += 1;
        }
        if upload_resume(page, "input[type=\"file\"]", ctx).await {
            fields_processed += 1;
        }
        fields_processed += answer_open_questions(page, ctx).await;

        info!("{} ✓ Greenhouse 表单已填写 {} 个字段", ctx.tag, fields_processed);
        Ok(AdapterOutcome {
            message: "Greenhouse 表单填写成功".to_string(),
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
    async fn test_fills_core_fields_and_answers_questions() {
        let page = FakePage::new()
            .with_elements(&["#first_name", "#last_name", "#email", "#phone", "input[type=\"file\"]"])
            .with_group("textarea", &["#q1", "#q2"])
            .with_label("#q1", "Why do you want to work here?");
        let backend = Arc::new(ScriptedBackend::new("gemini"));
        backend.push_response(r#"[{"answer": "I love building things."}]"#);
        let mapper = test_support::mapper(backend);
        let (cv, job) = (test_support::cv(), test_support::job());
        let ctx = FillContext {
            cv: &cv,
            job: &job,
            resume_path: Some(Path::new("/tmp/ada.pdf")),
            mapper: &mapper,
            settle: Duration::ZERO,
            tag: "[test]",
        };

        let outcome = GreenhouseAdapter.fill(&page, &ctx).await.unwrap();

        let state = page.state();
        assert_eq!(state.filled["#first_name"], "Ada");
        assert_eq!(state.filled["#last_name"], "King Lovelace");
        assert_eq!(state.filled["#email"], "ada@example.com");
        assert_eq!(state.filled["#q1"], "I love building things.");
        // 没有标签的文本框不处理
        assert!(!state.filled.contains_key("#q2"));
        assert_eq!(state.uploaded["input[type=\"file\"]"], Path::new("/tmp/ada.pdf"));
        assert_eq!(outcome.fields_processed, 6);
    }

    #[tokio::test]
    async fn test_missing_core_field_is_an_error() {
        let page = FakePage::new().with_elements(&["#first_name", "#last_name"]);
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

        assert!(GreenhouseAdapter.fill(&page, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_answer_failure_is_swallowed() {
        let page = FakePage::new()
            .with_elements(&["#first_name", "#last_name", "#email"])
            .with_group("textarea", &["#q1"])
            .with_label("#q1", "Tell us about yourself");
        let backend = Arc::new(ScriptedBackend::new("gemini"));
        backend.push_error("model overloaded");
        let mapper = test_support::mapper(backend);
        let (cv, job) = (test_support::cv(), test_support::job());
        let ctx = FillContext {
            cv: &cv,
            job: &job,
            resume_path: None,
            mapper: &mapper,
            settle: Duration::ZERO,
            tag: "[test]",
        };

        let outcome = GreenhouseAdapter.fill(&page, &ctx).await.unwrap();
        assert_eq!(page.state().filled["#q1"], "");
        // 电话字段不存在，姓名邮箱 3 个 + 空回答 1 个
        assert_eq!(outcome.fields_processed, 4);
    }
}
