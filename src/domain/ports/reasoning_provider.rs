//! Reasoning Provider Port
//!
//! Abstraction over a remote language-model backend that answers one prompt
//! at a time. The dispatcher owns retry, rotation and fallback; a provider
//! only performs a single call with the model and credential it is handed.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// An API credential. The secret never appears in `Debug` output.
#[derive(Clone)]
pub struct Credential {
    /// Stable identifier, safe to log
    pub id: String,
    /// Provider this credential belongs to
    pub provider: String,
    secret: Arc<str>,
}

impl Credential {
    pub fn new(id: impl Into<String>, provider: impl Into<String>, secret: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            secret: secret.into(),
        }
    }

    /// Raw secret, only for building request headers.
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// One provider call.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    /// Persona the call is made for (log tag only)
    pub tag: String,
    pub model: String,
    pub credential: Credential,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Raw text returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub text: String,
}

/// Failure of a single provider call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Transient failures are retried on the same route with backoff.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_)
                | Self::Timeout(_)
                | Self::Server { .. }
                | Self::Network(_)
                | Self::Malformed(_)
        )
    }

    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Short label for structured logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::Server { .. } => "server_error",
            Self::Network(_) => "network_error",
            Self::Malformed(_) => "malformed",
            Self::Auth(_) => "auth_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

/// Port trait for reasoning provider implementations
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// concurrent dispatch task.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Provider name as referenced by fallback targets (e.g. "groq")
    fn name(&self) -> &str;

    /// Perform one completion call.
    ///
    /// # Errors
    /// - `ProviderError::RateLimited` - caller should back off and retry
    /// - `ProviderError::Timeout` / `Network` / `Server` / `Malformed` - transient
    /// - `ProviderError::Auth` / `InvalidRequest` - permanent for this route
    async fn complete(&self, call: ProviderCall) -> Result<ProviderReply, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_hides_secret() {
        let credential = Credential::new("groq-primary", "groq", "gsk_supersecretvalue1234567890");
        let debug = format!("{credential:?}");
        assert!(debug.contains("groq-primary"));
        assert!(!debug.contains("gsk_"));
        assert_eq!(credential.expose_secret(), "gsk_supersecretvalue1234567890");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::RateLimited("slow down".into()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(60)).is_transient());
        assert!(ProviderError::Malformed("no choices".into()).is_transient());
        assert!(!ProviderError::Auth("bad key".into()).is_transient());
        assert!(!ProviderError::InvalidRequest("unknown model".into()).is_transient());
    }
}
