//! 申请入队 HTTP 服务
//!
//! 只负责校验与入队，实际申请由 worker 进程执行

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use auto_apply::api::{router, AppState};
use auto_apply::app::{build_ai_provider, build_record_store, shutdown_channel, startup_details};
use auto_apply::orchestrator::ApplyService;
use auto_apply::queue::{JobQueue, RedisQueue};
use auto_apply::{logger, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    logger::init(config.verbose_logging);

    let mut details = startup_details(&config);
    details.push(("监听地址", config.listen_addr.clone()));
    logger::log_startup("申请服务", &details);

    let ai = build_ai_provider(&config);
    let store = build_record_store(&config);
    let queue: Arc<dyn JobQueue> = Arc::new(RedisQueue::connect(&config).await?);
    let service = Arc::new(ApplyService::new(store, queue.clone(), &config));

    let app = router(AppState { service, ai });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("无法监听 {}", config.listen_addr))?;
    info!("🌐 HTTP 服务已启动: http://{}", config.listen_addr);

    let mut shutdown = shutdown_channel();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("HTTP 服务异常退出")?;

    queue.close().await;
    logger::log_shutdown("申请服务");
    Ok(())
}
