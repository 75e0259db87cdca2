//! 日志工具模块
//!
//! 初始化 tracing 订阅器，并提供日志格式化的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`，否则默认 `info`；`verbose` 时本 crate 输出 debug 日志
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "info,auto_apply=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // 测试中可能被多次调用
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录进程启动信息
pub fn log_startup(process: &str, details: &[(&str, String)]) {
    info!("{}", "=".repeat(60));
    info!("🚀 {} 启动", process);
    for (key, value) in details {
        info!("📊 {}: {}", key, value);
    }
    info!("{}", "=".repeat(60));
}

/// 记录进程退出信息
pub fn log_shutdown(process: &str) {
    info!("\n{}", "─".repeat(60));
    info!("📴 {} 已安全退出", process);
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("申请职位自动化", 2), "申请...");
    }
}
