use std::str::FromStr;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP 服务监听地址
    pub listen_addr: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,

    // --- 队列配置 ---
    pub redis_url: String,
    pub queue_name: String,
    /// 最大尝试次数（含首次）
    pub queue_max_attempts: u32,
    /// 指数退避的基准延迟
    pub queue_backoff_ms: u64,
    /// 保留最近完成的任务数
    pub queue_keep_completed: usize,
    /// 保留最近失败的任务数
    pub queue_keep_failed: usize,
    /// 任务租约时长，worker 失联超过该时长后任务会被重新投递
    pub queue_lease_ms: u64,
    /// 空闲轮询间隔
    pub queue_poll_ms: u64,
    /// Redis 连接超时
    pub queue_connect_timeout_ms: u64,
    /// 队列错误日志的节流窗口
    pub queue_error_log_window_ms: u64,

    // --- 申请配置 ---
    /// 单个申请入队后的延迟
    pub apply_delay_ms: u64,
    /// 批量申请时相邻任务的错开间隔
    pub bulk_stagger_ms: u64,
    pub max_applications_per_day: usize,

    // --- 申请记录存储 ---
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,

    // --- AI 配置 ---
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub perplexity_api_key: Option<String>,
    pub perplexity_api_base: String,
    pub perplexity_model: String,
    /// 主服务配额耗尽后使用备用服务的时长
    pub ai_quota_cooldown_secs: u64,

    // --- 浏览器配置 ---
    pub chrome_executable: Option<String>,
    pub screenshot_dir: String,
    pub navigation_timeout_ms: u64,
    /// 页面操作后的等待时间
    pub settle_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            verbose_logging: false,
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "job-applications".to_string(),
            queue_max_attempts: 3,
            queue_backoff_ms: 60_000,
            queue_keep_completed: 100,
            queue_keep_failed: 200,
            queue_lease_ms: 120_000,
            queue_poll_ms: 1_000,
            queue_connect_timeout_ms: 10_000,
            queue_error_log_window_ms: 60_000,
            apply_delay_ms: 5_000,
            bulk_stagger_ms: 2_000,
            max_applications_per_day: 20,
            supabase_url: None,
            supabase_service_key: None,
            gemini_api_key: None,
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            perplexity_api_key: None,
            perplexity_api_base: "https://api.perplexity.ai".to_string(),
            perplexity_model: "sonar-pro".to_string(),
            ai_quota_cooldown_secs: 60 * 60,
            chrome_executable: None,
            screenshot_dir: "screenshots".to_string(),
            navigation_timeout_ms: 30_000,
            settle_delay_ms: 2_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            listen_addr: env_or("LISTEN_ADDR", default.listen_addr),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            redis_url: env_or("REDIS_URL", default.redis_url),
            queue_name: env_or("QUEUE_NAME", default.queue_name),
            queue_max_attempts: env_parse("QUEUE_MAX_ATTEMPTS", default.queue_max_attempts),
            queue_backoff_ms: env_parse("QUEUE_BACKOFF_MS", default.queue_backoff_ms),
            queue_keep_completed: env_parse("QUEUE_KEEP_COMPLETED", default.queue_keep_completed),
            queue_keep_failed: env_parse("QUEUE_KEEP_FAILED", default.queue_keep_failed),
            queue_lease_ms: env_parse("QUEUE_LEASE_MS", default.queue_lease_ms),
            queue_poll_ms: env_parse("QUEUE_POLL_MS", default.queue_poll_ms),
            queue_connect_timeout_ms: env_parse("QUEUE_CONNECT_TIMEOUT_MS", default.queue_connect_timeout_ms),
            queue_error_log_window_ms: env_parse("QUEUE_ERROR_LOG_WINDOW_MS", default.queue_error_log_window_ms),
            apply_delay_ms: env_parse("APPLY_DELAY_MS", default.apply_delay_ms),
            bulk_stagger_ms: env_parse("BULK_STAGGER_MS", default.bulk_stagger_ms),
            max_applications_per_day: env_parse("MAX_APPLICATIONS_PER_DAY", default.max_applications_per_day),
            supabase_url: env_opt("SUPABASE_URL"),
            supabase_service_key: env_opt("SUPABASE_SERVICE_KEY"),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            gemini_api_base: env_or("GEMINI_API_BASE", default.gemini_api_base),
            gemini_model: env_or("GEMINI_MODEL", default.gemini_model),
            perplexity_api_key: env_opt("PERPLEXITY_API_KEY"),
            perplexity_api_base: env_or("PERPLEXITY_API_BASE", default.perplexity_api_base),
            perplexity_model: env_or("PERPLEXITY_MODEL", default.perplexity_model),
            ai_quota_cooldown_secs: env_parse("AI_QUOTA_COOLDOWN_SECS", default.ai_quota_cooldown_secs),
            chrome_executable: env_opt("CHROME_EXECUTABLE"),
            screenshot_dir: env_or("SCREENSHOT_DIR", default.screenshot_dir),
            navigation_timeout_ms: env_parse("NAVIGATION_TIMEOUT_MS", default.navigation_timeout_ms),
            settle_delay_ms: env_parse("SETTLE_DELAY_MS", default.settle_delay_ms),
        }
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.queue_lease_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn apply_delay(&self) -> Duration {
        Duration::from_millis(self.apply_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

/// 空字符串视为未配置
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_queue_policy() {
        let config = Config::default();
        assert_eq!(config.queue_max_attempts, 3);
        assert_eq!(config.queue_backoff_ms, 60_000);
        assert_eq!(config.apply_delay(), Duration::from_secs(5));
        assert!(config.gemini_api_key.is_none());
    }
}
