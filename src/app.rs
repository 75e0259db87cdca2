//! 进程装配
//!
//! worker 与 HTTP 服务共用的初始化逻辑：AI 服务、记录存储、停止信号

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::clients::{LlmClient, SupabaseStore};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::{AiProvider, CompletionBackend, MemoryStore, RecordStore};

/// 按配置创建 AI 服务：Gemini 为主，Perplexity 为备用
pub fn build_ai_provider(config: &Config) -> Arc<AiProvider> {
    let primary = config.gemini_api_key.as_deref().map(|key| {
        Arc::new(LlmClient::new(
            "Gemini",
            key,
            &config.gemini_api_base,
            config.gemini_model.clone(),
        )) as Arc<dyn CompletionBackend>
    });
    let fallback = config.perplexity_api_key.as_deref().map(|key| {
        Arc::new(LlmClient::new(
            "Perplexity",
            key,
            &config.perplexity_api_base,
            config.perplexity_model.clone(),
        )) as Arc<dyn CompletionBackend>
    });

    if primary.is_none() && fallback.is_none() {
        warn!("⚠️ 未配置任何 AI 服务，通用表单与职位搜索将不可用");
    }
    Arc::new(AiProvider::new(
        primary,
        fallback,
        Duration::from_secs(config.ai_quota_cooldown_secs),
    ))
}

/// 按配置创建记录存储，未配置 Supabase 时使用内存存储
pub fn build_record_store(config: &Config) -> Arc<dyn RecordStore> {
    match (&config.supabase_url, &config.supabase_service_key) {
        (Some(url), Some(key)) => {
            info!("🗄️ 使用 Supabase 存储申请记录: {}", url);
            Arc::new(SupabaseStore::new(url, key.clone()))
        }
        _ => {
            warn!("⚠️ 未配置 SUPABASE_URL / SUPABASE_SERVICE_KEY，申请记录只保存在内存中");
            Arc::new(MemoryStore::new())
        }
    }
}

/// worker 必须与 HTTP 服务共享同一个记录存储
pub fn require_shared_store(config: &Config) -> AppResult<()> {
    if config.supabase_url.is_some() && config.supabase_service_key.is_some() {
        return Ok(());
    }
    Err(AppError::Config(
        "worker 需要配置 SUPABASE_URL 和 SUPABASE_SERVICE_KEY".to_string(),
    ))
}

/// 启动时打印的配置摘要
pub fn startup_details(config: &Config) -> Vec<(&'static str, String)> {
    vec![
        ("队列", format!("{} @ {}", config.queue_name, config.redis_url)),
        (
            "重试策略",
            format!("最多 {} 次，退避基准 {}ms", config.queue_max_attempts, config.queue_backoff_ms),
        ),
        ("每日上限", config.max_applications_per_day.to_string()),
        (
            "AI 服务",
            format!(
                "Gemini: {} | Perplexity: {}",
                configured(config.gemini_api_key.is_some()),
                configured(config.perplexity_api_key.is_some())
            ),
        ),
    ]
}

fn configured(yes: bool) -> &'static str {
    if yes {
        "✅"
    } else {
        "❌"
    }
}

/// 收到 Ctrl+C 或 SIGTERM 时把停止信号置为 `true`
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("🛑 收到停止信号，等待当前任务完成...");
        let _ = tx.send(true);
    });
    rx
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("监听 Ctrl+C 失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("监听 SIGTERM 失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
