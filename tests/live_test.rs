//! 需要真实浏览器 / Redis 的测试
//!
//! 默认忽略，需要手动运行：cargo test -- --ignored

use auto_apply::browser::BrowserSession;
use auto_apply::config::Config;
use auto_apply::infrastructure::{FormPage, PageSource};
use auto_apply::logger;
use auto_apply::queue::{JobQueue, RedisQueue};
use auto_apply::workflow::classify;

#[tokio::test]
#[ignore]
async fn test_browser_opens_isolated_page() {
    logger::init(true);
    let config = Config::from_env();

    let session = BrowserSession::launch(&config).await.expect("启动浏览器失败");
    let page = session.open_page().await.expect("打开页面失败");
    page.navigate("https://boards.greenhouse.io/").await.expect("导航失败");

    let url = page.current_url().await.expect("读取地址失败");
    let html = page.read_html().await.expect("读取页面失败");
    println!("识别结果: {}", classify(&url, &html));

    page.close().await.expect("关闭页面失败");
    session.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn test_redis_queue_counts() {
    logger::init(true);
    let config = Config::from_env();

    let queue = RedisQueue::connect(&config).await.expect("创建队列失败");
    assert!(queue.is_available(), "Redis 应该可以连接: {}", config.redis_url);
    let counts = queue.counts().await.expect("读取队列计数失败");
    println!("队列状态: {:?}", counts);
    queue.close().await;
}
