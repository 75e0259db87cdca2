use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求参数校验失败（同步拒绝，永不入队）
    #[error("校验失败: {0}")]
    Validation(#[from] ValidationError),
    /// 队列不可用（快速失败，调用方稍后重试）
    #[error("队列不可用: {0}")]
    QueueUnavailable(String),
    /// 队列命令错误
    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),
    /// 浏览器自动化错误
    #[error("自动化错误: {0}")]
    Automation(#[from] AutomationError),
    /// AI 服务错误
    #[error("AI错误: {0}")]
    Ai(#[from] AiError),
    /// 申请记录存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// 入队请求校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("缺少必填字段: {field}")]
    MissingField { field: &'static str },
    #[error("已申请过该职位 (申请 {application_id}, 状态: {status})")]
    AlreadyApplied {
        application_id: String,
        status: String,
    },
    #[error("未找到简历，请先上传简历 (用户 {user_id})")]
    CvNotFound { user_id: String },
    #[error("职位不存在: {job_id}")]
    JobNotFound { job_id: String },
    #[error("职位 {job_id} 没有可用的申请链接")]
    MissingApplicationUrl { job_id: String },
    #[error("已达到每日申请上限 ({limit})")]
    DailyLimitReached { limit: usize, applied: usize },
}

/// 队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis 命令失败: {0}")]
    Command(#[from] deadpool_redis::redis::RedisError),
    #[error("获取 Redis 连接失败: {0}")]
    Pool(String),
    #[error("任务数据损坏 ({job_id}): {source}")]
    CorruptPayload {
        job_id: String,
        source: serde_json::Error,
    },
    #[error("任务不存在: {0}")]
    UnknownJob(String),
    /// 租约已过期或任务已被其他 worker 取走
    #[error("任务 {job_id} 的租约已失效")]
    LeaseLost { job_id: String },
}

/// 浏览器自动化错误
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("启动浏览器失败: {0}")]
    LaunchFailed(String),
    #[error("创建隔离上下文失败: {0}")]
    ContextFailed(String),
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    #[error("导航到 {url} 超时 ({timeout_ms}ms)")]
    NavigationTimeout { url: String, timeout_ms: u64 },
    #[error("未找到元素: {selector}")]
    SelectorNotFound { selector: String },
    #[error("执行脚本失败: {0}")]
    ScriptFailed(String),
    #[error("上传文件失败 ({selector}): {reason}")]
    UploadFailed { selector: String, reason: String },
    #[error("截图失败: {0}")]
    ScreenshotFailed(String),
    #[error("简历文件不可用 ({asset}): {reason}")]
    ResumeUnavailable { asset: String, reason: String },
    #[error("{0}")]
    Unsupported(String),
}

/// AI 服务错误
#[derive(Debug, Error)]
pub enum AiError {
    /// 配额耗尽 / 请求频率限制，会触发备用服务切换
    #[error("{provider} 配额已用尽: {message}")]
    QuotaExceeded { provider: String, message: String },
    #[error("未配置任何 AI 服务，请设置 GEMINI_API_KEY 或 PERPLEXITY_API_KEY")]
    NotConfigured,
    #[error("{provider} 调用失败: {message}")]
    Request { provider: String, message: String },
    #[error("{provider} 返回内容为空")]
    EmptyResponse { provider: String },
    #[error("无法解析 AI 返回的 JSON: {source} (响应: {response})")]
    MalformedJson {
        response: String,
        source: serde_json::Error,
    },
}

impl AiError {
    pub fn is_quota(&self) -> bool {
        matches!(self, AiError::QuotaExceeded { .. })
    }
}

/// 申请记录存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("请求存储服务失败 ({endpoint}): {source}")]
    Request {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("存储服务返回错误 ({endpoint}): {status} {body}")]
    BadResponse {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("申请记录不存在: {0}")]
    NotFound(String),
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Automation(AutomationError::ScriptFailed(err.to_string()))
    }
}

impl From<deadpool_redis::redis::RedisError> for AppError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        AppError::Queue(QueueError::Command(err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn missing_field(field: &'static str) -> Self {
        AppError::Validation(ValidationError::MissingField { field })
    }

    pub fn navigation(url: impl Into<String>, reason: impl ToString) -> Self {
        AppError::Automation(AutomationError::NavigationFailed {
            url: url.into(),
            reason: reason.to_string(),
        })
    }

    pub fn selector_not_found(selector: impl Into<String>) -> Self {
        AppError::Automation(AutomationError::SelectorNotFound {
            selector: selector.into(),
        })
    }

    pub fn store_request(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Store(StoreError::Request {
            endpoint: endpoint.into(),
            source,
        })
    }

    pub fn lease_lost(job_id: impl Into<String>) -> Self {
        AppError::Queue(QueueError::LeaseLost {
            job_id: job_id.into(),
        })
    }

    pub fn is_lease_lost(&self) -> bool {
        matches!(self, AppError::Queue(QueueError::LeaseLost { .. }))
    }

    /// 是否值得交给队列重试
    ///
    /// 校验错误和"不支持的平台"重试也不会成功
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::Validation(_)
                | AppError::Config(_)
                | AppError::Automation(AutomationError::Unsupported(_))
                | AppError::Ai(AiError::NotConfigured)
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
