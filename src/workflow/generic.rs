//! 通用表单处理
//!
//! 未识别平台时，由 AI 分析表单结构，再逐个字段填写。
//! 每个字段相互独立：单个字段失败只记日志，继续处理后面的字段。

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::FormPage;
use crate::models::{FieldPurpose, FormField};
use crate::workflow::adapters::{upload_resume, Adapter, AdapterOutcome, FillContext};

/// 通用表单处理器
pub struct GenericFormHandler;

impl GenericFormHandler {
    /// 填写单个字段，返回是否实际填写
    async fn fill_field(
        &self,
        page: &dyn FormPage,
        field: &FormField,
        ctx: &FillContext<'_>,
    ) -> AppResult<bool> {
        let (first_name, last_name) = ctx.cv.split_name();
        let value = match field.purpose {
            FieldPurpose::FirstName => first_name,
            FieldPurpose::LastName => last_name,
            FieldPurpose::Email => ctx.cv.email.clone(),
            FieldPurpose::Phone => ctx.cv.phone_or_empty().to_string(),
            FieldPurpose::Resume => {
                if !field.is_file_input() {
                    debug!("{} 简历字段不是文件控件，跳过: {}", ctx.tag, field.selector);
                    return Ok(false);
                }
                return Ok(upload_resume(page, &field.selector, ctx).await);
            }
            FieldPurpose::CoverLetter => ctx.mapper.cover_letter(ctx.cv, ctx.job).await?,
            FieldPurpose::CustomQuestion => {
                ctx.mapper
                    .answer_question(&field.label, ctx.cv, ctx.job_description())
                    .await?
            }
            FieldPurpose::Unknown => {
                debug!("{} 未知用途字段，跳过: {}", ctx.tag, field.selector);
                return Ok(false);
            }
        };

        page.fill(&field.selector, &value).await?;
        Ok(true)
    }
}

#[async_trait]
impl Adapter for GenericFormHandler {
    async fn fill(&self, page: &dyn FormPage, ctx: &FillContext<'_>) -> AppResult<AdapterOutcome> {
        let html = page.read_html().await?;
        let fields = ctx.mapper.analyze_form(&html).await?;
        info!("{} 🔍 AI 识别出 {} 个表单字段", ctx.tag, fields.len());

        let mut fields_processed = 0;
        for field in &fields {
            match self.fill_field(page, field, ctx).await {
                Ok(true) => fields_processed += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "{} ⚠️ 字段 {} ({}) 处理失败: {}",
                    ctx.tag, field.label, field.selector, e
                ),
            }
        }

        info!("{} ✓ 通用表单已填写 {}/{} 个字段", ctx.tag, fields_processed, fields.len());
        Ok(AdapterOutcome {
            message: format!("通用表单已处理 {} 个字段", fields_processed),
            confirmation_url: None,
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

    const FIELDS: &str = r##"```json
[
  {"fieldName": "#fname", "label": "First name", "type": "text", "required": true, "purpose": "firstName"},
  {"fieldName": "#lname", "label": "Last name", "type": "text", "required": true, "purpose": "lastName"},
  {"fieldName": "#mail", "label": "Email", "type": "email", "required": true, "purpose": "email"},
  {"fieldName": "#tel", "label": "Phone", "type": "tel", "required": false, "purpose": "phone"},
  {"fieldName": "#cv", "label": "Resume", "type": "file", "required": true, "purpose": "resume"}
]
```"##;

    #[tokio::test]
    async fn test_one_broken_field_does_not_stop_others() {
        let page = FakePage::new()
            .with_html("<form>...</form>")
            .with_elements(&["#fname", "#lname", "#mail", "#cv"])
            .with_broken("#tel");
        let backend = Arc::new(ScriptedBackend::new("gemini"));
        backend.push_response(FIELDS);
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

        let outcome = GenericFormHandler.fill(&page, &ctx).await.unwrap();

        assert_eq!(outcome.fields_processed, 4);
        let state = page.state();
        assert_eq!(state.filled["#fname"], "Ada");
        assert_eq!(state.filled["#mail"], "ada@example.com");
        assert!(!state.filled.contains_key("#tel"));
        assert!(state.uploaded.contains_key("#cv"));
    }

    #[tokio::test]
    async fn test_generated_text_fields() {
        let page = FakePage::new().with_elements(&["#letter", "#why", "#misc"]);
        let backend = Arc::new(ScriptedBackend::new("gemini"));
        backend.push_response(
            r##"[
              {"fieldName": "#letter", "label": "Cover letter", "type": "textarea", "purpose": "coverLetter"},
              {"fieldName": "#why", "label": "Why Acme?", "type": "textarea", "purpose": "customQuestion"},
              {"fieldName": "#misc", "label": "Pronouns", "type": "text", "purpose": "somethingElse"}
            ]"##,
        );
        backend.push_response("  Dear Acme team, ...  ");
        backend.push_response(r#"[{"answer": "Because I like anvils."}]"#);
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

        let outcome = GenericFormHandler.fill(&page, &ctx).await.unwrap();

        let state = page.state();
        assert_eq!(state.filled["#letter"], "Dear Acme team, ...");
        assert_eq!(state.filled["#why"], "Because I like anvils.");
        assert!(!state.filled.contains_key("#misc"));
        assert_eq!(outcome.fields_processed, 2);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_fatal() {
        let page = FakePage::new();
        let backend = Arc::new(ScriptedBackend::new("gemini"));
        backend.push_response("no form here");
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

        assert!(GenericFormHandler.fill(&page, &ctx).await.is_err());
    }
}
