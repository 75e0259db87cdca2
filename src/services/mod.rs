//! 业务能力层
//!
//! 每个服务只描述一种能力，不关心调度顺序

pub mod ai_provider;
pub mod field_mapper;
pub mod notifier;
pub mod record_store;
pub mod resume;

pub use ai_provider::{AiProvider, CompletionBackend, ProviderStatus};
pub use field_mapper::FieldMapper;
pub use notifier::{LifecycleEvent, LifecycleKind};
pub use record_store::{MemoryStore, RecordStore};
pub use resume::{ResumeFile, ResumeResolver};
