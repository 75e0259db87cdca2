//! # Auto Apply
//!
//! 自动投递职位申请：入队服务接收请求，worker 在无头浏览器中填写各招聘平台的申请表单
//!
//! ## 架构设计
//!
//! 本系统沿用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 页面能力抽象 [`FormPage`](infrastructure::FormPage)，唯一持有浏览器页面
//! - `browser/` - 浏览器进程与隔离上下文
//! - `queue/` - Redis / 内存任务队列，延迟、优先级、退避重试、租约
//! - `clients/` - AI 与记录存储的 HTTP 客户端
//!
//! ### ② 业务能力层（Services）
//! - `AiProvider` - 主备 AI 服务与配额冷却
//! - `FieldMapper` - 表单字段识别、问答、求职信
//! - `RecordStore` - 申请记录
//! - `ResumeResolver` - 简历文件解析
//! - `notifier` - 生命周期事件
//!
//! ### ③ 流程层（Workflow）
//! - `classifier` - 根据 URL 与页面内容识别招聘平台
//! - `adapters/` - Greenhouse / Lever / Workday / LinkedIn 模板适配器
//! - `generic` - AI 驱动的通用表单处理
//!
//! ### ④ 编排层（Orchestration）
//! - `ApplyService` - 校验、去重、每日上限、入队
//! - `ApplyOrchestrator` - 单次申请尝试
//! - `Worker` - 消费队列并写入终态
//!
//! ## 模块结构

pub mod api;
pub mod app;
pub mod browser;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod services;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ApplicationJob, ApplicationRecord, ApplicationResult, ApplicationStatus, Platform};
pub use orchestrator::{ApplyOrchestrator, ApplyService, Worker};
pub use queue::{JobQueue, MemoryQueue, RedisQueue};
