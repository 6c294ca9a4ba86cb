use regex::{Captures, Regex};
use std::fmt;
use std::sync::LazyLock;

/// Patterns for credentials that may appear in provider error bodies.
const PATTERNS: &[(&str, &str)] = &[
    // Groq keys: gsk_...
    (r"gsk_[A-Za-z0-9]{16,}", "[API_KEY_REDACTED]"),
    // OpenAI-style keys: sk-..., sk-proj-...
    (r"sk-[A-Za-z0-9_\-]{16,}", "[API_KEY_REDACTED]"),
    // Authorization headers
    (r"Bearer\s+[A-Za-z0-9_\-\.=]+", "Bearer [TOKEN_REDACTED]"),
];

static DEFAULT_SCRUBBER: LazyLock<SecretScrubber> = LazyLock::new(SecretScrubber::new);

/// Removes credentials from text before it is logged or stored.
#[derive(Clone)]
pub struct SecretScrubber {
    patterns: Vec<(Regex, &'static str)>,
    field_pattern: Option<Regex>,
}

impl SecretScrubber {
    pub fn new() -> Self {
        Self {
            patterns: PATTERNS
                .iter()
                .filter_map(|(pattern, replacement)| {
                    Regex::new(pattern).ok().map(|re| (re, *replacement))
                })
                .collect(),
            field_pattern: Regex::new(
                r#"(["']?(?:api_key|apikey|token|secret)["']?\s*[:=]\s*)["']?[A-Za-z0-9_\-\.]{12,}["']?"#,
            )
            .ok(),
        }
    }

    /// Shared instance with the default patterns.
    pub fn global() -> &'static Self {
        &DEFAULT_SCRUBBER
    }

    /// Scrub a message of sensitive data
    pub fn scrub(&self, message: &str) -> String {
        let mut scrubbed = message.to_string();
        for (pattern, replacement) in &self.patterns {
            scrubbed = pattern.replace_all(&scrubbed, *replacement).into_owned();
        }
        if let Some(field) = &self.field_pattern {
            scrubbed = field
                .replace_all(&scrubbed, |caps: &Captures| format!("{}[REDACTED]", &caps[1]))
                .into_owned();
        }
        scrubbed
    }

    /// Scrub a message and additionally blank out one known secret.
    pub fn scrub_with_secret(&self, message: &str, secret: &str) -> String {
        let scrubbed = self.scrub(message);
        if secret.is_empty() {
            scrubbed
        } else {
            scrubbed.replace(secret, "[REDACTED]")
        }
    }
}

impl Default for SecretScrubber {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SecretScrubber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretScrubber")
            .field("patterns", &self.patterns.len())
            .finish()
    }
}
