//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `apply_service` - 入队服务
//! - 校验请求、去重、创建申请记录、投递队列
//! - 批量申请的每日额度与错开延迟
//!
//! ### `worker` - 队列消费者
//! - 取任务、标记 processing、续租
//! - 写入终态并把重试决策交给队列
//!
//! ### `apply_orchestrator` - 单次申请编排器
//! - 导航 → 平台识别 → 适配器填写 → 截图
//!
//! ## 层次关系
//!
//! ```text
//! apply_service ──(队列)──> worker
//!                              ↓
//!                     apply_orchestrator (单次尝试)
//!                              ↓
//!               workflow (classifier / adapters / generic)
//!                              ↓
//!               services (AI / 记录存储 / 简历)
//!                              ↓
//!               infrastructure (FormPage)
//! ```

pub mod apply_orchestrator;
pub mod apply_service;
pub mod worker;

pub use apply_orchestrator::{Applier, ApplyOrchestrator, AttemptState};
pub use apply_service::{ApplyReceipt, ApplyService, BulkReport, EnqueueRequest};
pub use worker::Worker;
