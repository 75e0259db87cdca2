use async_trait::async_trait;
use tracing::warn;

use super::{Adapter, AdapterOutcome, FillContext};
use crate::error::{AppResult, AutomationError};
use crate::infrastructure::FormPage;

/// LinkedIn Easy Apply 需要登录态，不做自动填写
pub struct LinkedInAdapter;

#[async_trait]
impl Adapter for LinkedInAdapter {
    async fn fill(&self, _page: &dyn FormPage, ctx: &FillContext<'_>) -> AppResult<AdapterOutcome> {
        warn!("{} LinkedIn Easy Apply 需要人工登录，跳过", ctx.tag);
        Err(AutomationError::Unsupported(
            "LinkedIn Easy Apply requires manual authentication".to_string(),
        )
        .into())
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
    async fn test_linkedin_is_permanent_failure() {
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

        let err = LinkedInAdapter.fill(&page, &ctx).await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(page.state().filled.is_empty());
    }
}
