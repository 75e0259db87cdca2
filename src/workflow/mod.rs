pub mod adapters;
pub mod classifier;
pub mod generic;

pub use adapters::{adapter_for, Adapter, AdapterOutcome, FillContext};
pub use classifier::classify;
pub use generic::GenericFormHandler;
