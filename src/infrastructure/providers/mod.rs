//! Outbound reasoning provider infrastructure
//!
//! - OpenAI-compatible HTTP client with per-provider rate limiting
//! - Retry policy with exponential backoff

pub mod chat_completions;
pub mod retry;

pub use chat_completions::{error_from_status, ChatCompletionsProvider};
pub use retry::RetryPolicy;
