//! AI 服务选择 - 业务能力层
//!
//! 主服务 + 备用服务两套可互换的后端。
//! 主服务报告配额错误后，冷却期内直接使用备用服务；冷却期结束后重新优先主服务。
//! 主服务的非配额错误直接向上抛出，不触发切换。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::AiError;

/// 补全服务后端
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

/// 当前使用的服务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveProvider {
    Primary,
    Fallback,
}

#[derive(Debug)]
struct ProviderState {
    active: ActiveProvider,
    cooldown_until: Option<Instant>,
}

/// 服务状态报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub primary_configured: bool,
    pub fallback_configured: bool,
    pub current_provider: ActiveProvider,
    pub quota_exceeded_until: Option<chrono::DateTime<chrono::Utc>>,
}

/// AI 服务选择器
pub struct AiProvider {
    primary: Option<Arc<dyn CompletionBackend>>,
    fallback: Option<Arc<dyn CompletionBackend>>,
    cooldown: Duration,
    state: Mutex<ProviderState>,
}

impl AiProvider {
    pub fn new(
        primary: Option<Arc<dyn CompletionBackend>>,
        fallback: Option<Arc<dyn CompletionBackend>>,
        cooldown: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            cooldown,
            state: Mutex::new(ProviderState {
                active: ActiveProvider::Primary,
                cooldown_until: None,
            }),
        }
    }

    /// 冷却期是否仍然有效，过期时顺带清除
    fn in_cooldown(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.cooldown_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                state.cooldown_until = None;
                state.active = ActiveProvider::Primary;
                false
            }
            None => false,
        }
    }

    fn mark_quota_exceeded(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cooldown_until = Some(Instant::now() + self.cooldown);
        state.active = ActiveProvider::Fallback;
        warn!(
            "⚠️ 主 AI 服务配额已用尽，{} 秒内切换到备用服务",
            self.cooldown.as_secs()
        );
    }

    /// 生成文本
    pub async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        if let Some(fallback) = &self.fallback {
            if self.in_cooldown() {
                info!("🔄 使用备用服务 {}（主服务配额冷却中）", fallback.name());
                return fallback.complete(prompt).await;
            }
        }

        if let Some(primary) = &self.primary {
            return match primary.complete(prompt).await {
                Ok(text) => Ok(text),
                Err(e) if e.is_quota() => {
                    self.mark_quota_exceeded();
                    match &self.fallback {
                        Some(fallback) => {
                            info!("🔄 切换到备用服务 {}", fallback.name());
                            fallback.complete(prompt).await
                        }
                        None => Err(e),
                    }
                }
                Err(e) => Err(e),
            };
        }

        match &self.fallback {
            Some(fallback) => fallback.complete(prompt).await,
            None => Err(AiError::NotConfigured),
        }
    }

    /// 搜索职位列表
    ///
    /// 优先使用备用服务（具备实时搜索能力），失败时退回主服务
    pub async fn search_listings(&self, query: &str) -> Result<String, AiError> {
        let search_prompt = format!(
            "{}\n\nPlease provide a list of current job openings with the following format for each job:\n\
             - Company Name\n- Job Title\n- Location\n- Job Description (brief)\n- Application URL (if available)\n\n\
             Focus on recent and active postings.",
            query
        );

        if let Some(fallback) = &self.fallback {
            info!("🔍 使用 {} 搜索职位...", fallback.name());
            match fallback.complete(&search_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("⚠️ {} 职位搜索失败: {}", fallback.name(), e);
                    match &self.primary {
                        Some(primary) => {
                            info!("🔄 退回 {} 搜索职位", primary.name());
                            return primary.complete(query).await;
                        }
                        None => return Err(e),
                    }
                }
            }
        }

        match &self.primary {
            Some(primary) => {
                warn!("⚠️ 使用 {} 搜索职位（可能不是实时数据）", primary.name());
                primary.complete(query).await
            }
            None => Err(AiError::NotConfigured),
        }
    }

    /// 当前状态
    pub fn status(&self) -> ProviderStatus {
        let in_cooldown = self.in_cooldown();
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let quota_exceeded_until = state.cooldown_until.map(|until| {
            let remaining = until.saturating_duration_since(Instant::now());
            chrono::Utc::now()
                + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
        });

        ProviderStatus {
            primary_configured: self.primary.is_some(),
            fallback_configured: self.fallback.is_some(),
            current_provider: if in_cooldown && self.fallback.is_some() {
                ActiveProvider::Fallback
            } else {
                state.active
            },
            quota_exceeded_until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use tokio_test::{assert_err, assert_ok};

    fn provider(
        primary: Option<Arc<ScriptedBackend>>,
        fallback: Option<Arc<ScriptedBackend>>,
    ) -> AiProvider {
        AiProvider::new(
            primary.map(|p| p as Arc<dyn CompletionBackend>),
            fallback.map(|f| f as Arc<dyn CompletionBackend>),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_error_switches_to_fallback_for_cooldown() {
        let primary = Arc::new(ScriptedBackend::new("gemini"));
        let fallback = Arc::new(ScriptedBackend::new("perplexity"));
        primary.push_quota_error();
        let ai = provider(Some(primary.clone()), Some(fallback.clone()));

        assert_eq!(assert_ok!(ai.generate("hi").await), "perplexity: hi");
        assert_eq!(primary.calls(), 1);

        // 冷却期内不再尝试主服务
        tokio::time::advance(Duration::from_secs(1800)).await;
        assert_eq!(assert_ok!(ai.generate("again").await), "perplexity: again");
        assert_eq!(primary.calls(), 1);
        assert_eq!(ai.status().current_provider, ActiveProvider::Fallback);

        // 冷却期结束后重新优先主服务
        tokio::time::advance(Duration::from_secs(1801)).await;
        assert_eq!(assert_ok!(ai.generate("later").await), "gemini: later");
        assert_eq!(primary.calls(), 2);
        assert_eq!(ai.status().current_provider, ActiveProvider::Primary);
    }

    #[tokio::test]
    async fn test_non_quota_error_propagates_without_fallback() {
        let primary = Arc::new(ScriptedBackend::new("gemini"));
        let fallback = Arc::new(ScriptedBackend::new("perplexity"));
        primary.push_error("invalid api key");
        let ai = provider(Some(primary.clone()), Some(fallback.clone()));

        let err = assert_err!(ai.generate("hi").await);
        assert!(matches!(err, AiError::Request { .. }));
        assert_eq!(fallback.calls(), 0);
        assert!(ai.status().quota_exceeded_until.is_none());
    }

    #[tokio::test]
    async fn test_uses_whichever_backend_is_configured() {
        let only_fallback = provider(None, Some(Arc::new(ScriptedBackend::new("perplexity"))));
        assert_eq!(assert_ok!(only_fallback.generate("x").await), "perplexity: x");

        let only_primary = provider(Some(Arc::new(ScriptedBackend::new("gemini"))), None);
        assert_eq!(assert_ok!(only_primary.generate("x").await), "gemini: x");

        let none = provider(None, None);
        assert!(matches!(none.generate("x").await, Err(AiError::NotConfigured)));
        assert!(matches!(none.search_listings("x").await, Err(AiError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_quota_error_without_fallback_surfaces_quota() {
        let primary = Arc::new(ScriptedBackend::new("gemini"));
        primary.push_quota_error();
        let ai = provider(Some(primary), None);

        let err = assert_err!(ai.generate("hi").await);
        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_search_listings_prefers_fallback_then_primary() {
        let primary = Arc::new(ScriptedBackend::new("gemini"));
        let fallback = Arc::new(ScriptedBackend::new("perplexity"));
        let ai = provider(Some(primary.clone()), Some(fallback.clone()));

        let listing = assert_ok!(ai.search_listings("rust jobs in berlin").await);
        assert!(listing.starts_with("perplexity: rust jobs in berlin"));
        assert_eq!(primary.calls(), 0);

        fallback.push_error("search backend down");
        let listing = assert_ok!(ai.search_listings("rust jobs").await);
        assert_eq!(listing, "gemini: rust jobs");
    }
}
