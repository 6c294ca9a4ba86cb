//! Reasoning provider adapters

pub mod mock;
pub mod registry;

pub use mock::{MockProvider, MockResponse, RecordedCall};
pub use registry::{ProviderMap, ProviderRegistry};
