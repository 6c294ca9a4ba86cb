//! Port traits implemented by infrastructure and adapters

pub mod reasoning_provider;
pub mod stat_source;

pub use reasoning_provider::{
    Credential, ProviderCall, ProviderError, ProviderReply, ReasoningProvider,
};
pub use stat_source::StatSource;
