pub mod llm_client;
pub mod records_client;

pub use llm_client::LlmClient;
pub use records_client::SupabaseStore;
