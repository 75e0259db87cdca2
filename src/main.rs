//! 申请 worker 进程
//!
//! 连接队列、启动浏览器，持续消费申请任务直到收到停止信号

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use auto_apply::app::{
    build_ai_provider, build_record_store, require_shared_store, shutdown_channel,
    startup_details,
};
use auto_apply::browser::BrowserSession;
use auto_apply::orchestrator::{ApplyOrchestrator, Worker};
use auto_apply::queue::{JobQueue, RedisQueue};
use auto_apply::services::{notifier, FieldMapper, ResumeResolver};
use auto_apply::{logger, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    logger::init(config.verbose_logging);

    let mut details = startup_details(&config);
    details.push(("截图目录", config.screenshot_dir.clone()));
    logger::log_startup("申请 Worker", &details);
    require_shared_store(&config)?;

    let ai = build_ai_provider(&config);
    let store = build_record_store(&config);
    // 连接失败时进入降级模式并在后台重连，不阻止启动
    let queue: Arc<dyn JobQueue> = Arc::new(RedisQueue::connect(&config).await?);
    let session = BrowserSession::launch(&config).await?;

    let (events, receiver) = notifier::channel();
    let notifier_task = notifier::spawn_notifier(receiver);

    let orchestrator = ApplyOrchestrator::new(
        FieldMapper::new(ai),
        ResumeResolver::new(std::env::temp_dir().join("auto_apply_resumes")),
        &config,
    );
    let worker = Worker::new(queue.clone(), store, Arc::new(orchestrator), events, &config);

    worker.run(&session, shutdown_channel()).await;

    info!("🧹 正在释放资源...");
    drop(worker);
    session.shutdown().await;
    queue.close().await;
    let _ = notifier_task.await;

    logger::log_shutdown("申请 Worker");
    Ok(())
}
