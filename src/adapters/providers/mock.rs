//! Mock reasoning provider for tests and offline runs.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::models::CANDIDATES_HEADER;
use crate::domain::ports::{ProviderCall, ProviderError, ProviderReply, ReasoningProvider};

/// What the mock does for one call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return this text verbatim.
    Reply(String),
    /// Fail with this error.
    Fail(ProviderError),
    /// Answer every candidate in the prompt with a distribution derived from
    /// its ranker score.
    Synthetic,
}

impl MockResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self::Reply(output.into())
    }

    pub const fn failure(error: ProviderError) -> Self {
        Self::Fail(error)
    }
}

/// One call as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub tag: String,
    pub model: String,
    pub credential: String,
}

/// Mock provider with scripted per-route and per-persona behaviour.
///
/// Lookup order per call: queued script for the `(model, credential)` route,
/// persona override, route override, default.
pub struct MockProvider {
    name: String,
    default_response: MockResponse,
    delay: Duration,
    scripts: Arc<RwLock<HashMap<(String, String), VecDeque<MockResponse>>>>,
    route_overrides: Arc<RwLock<HashMap<(String, String), MockResponse>>>,
    tag_overrides: Arc<RwLock<HashMap<String, MockResponse>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_default_response(name, MockResponse::Synthetic)
    }

    pub fn with_default_response(name: impl Into<String>, response: MockResponse) -> Self {
        Self {
            name: name.into(),
            default_response: response,
            delay: Duration::ZERO,
            scripts: Arc::new(RwLock::new(HashMap::new())),
            route_overrides: Arc::new(RwLock::new(HashMap::new())),
            tag_overrides: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Simulated latency per call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue responses for one route, consumed in order.
    pub async fn script(&self, model: &str, credential: &str, responses: Vec<MockResponse>) {
        let mut scripts = self.scripts.write().await;
        scripts
            .entry((model.to_string(), credential.to_string()))
            .or_default()
            .extend(responses);
    }

    /// Every call on this route gets `response`.
    pub async fn set_response_for_route(&self, model: &str, credential: &str, response: MockResponse) {
        let mut overrides = self.route_overrides.write().await;
        overrides.insert((model.to_string(), credential.to_string()), response);
    }

    /// Every call tagged with `tag` (a persona id) gets `response`.
    pub async fn set_response_for_tag(&self, tag: &str, response: MockResponse) {
        let mut overrides = self.tag_overrides.write().await;
        overrides.insert(tag.to_string(), response);
    }

    /// All calls received so far, in arrival order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Highest number of calls that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn response_for(&self, call: &ProviderCall) -> MockResponse {
        let route = (call.model.clone(), call.credential.id.clone());
        if let Some(next) = self
            .scripts
            .write()
            .await
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
        {
            return next;
        }
        if let Some(response) = self.tag_overrides.read().await.get(&call.tag) {
            return response.clone();
        }
        if let Some(response) = self.route_overrides.read().await.get(&route) {
            return response.clone();
        }
        self.default_response.clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReasoningProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, call: ProviderCall) -> Result<ProviderReply, ProviderError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.calls.write().await.push(RecordedCall {
            tag: call.tag.clone(),
            model: call.model.clone(),
            credential: call.credential.id.clone(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.response_for(&call).await {
            MockResponse::Reply(text) => Ok(ProviderReply { text }),
            MockResponse::Fail(error) => Err(error),
            MockResponse::Synthetic => synthetic_reply(&call),
        }
    }
}

/// Build a well-formed panel answer for every candidate in the prompt.
fn synthetic_reply(call: &ProviderCall) -> Result<ProviderReply, ProviderError> {
    let body = call
        .user
        .split_once(CANDIDATES_HEADER)
        .map_or(call.user.as_str(), |(_, rest)| rest);
    let candidates: Vec<Value> = serde_json::from_str(body.trim())
        .map_err(|e| ProviderError::InvalidRequest(format!("No candidate list in prompt: {e}")))?;

    // Personas lean slightly differently so agreement is not trivially 1.0.
    let lean = (call.tag.bytes().map(u32::from).sum::<u32>() % 5) as f64 * 0.01;

    let answers: Vec<Value> = candidates
        .iter()
        .filter_map(|candidate| {
            let id = candidate.get("player_id").and_then(Value::as_u64)?;
            let score = candidate
                .get("ranker_score")
                .and_then(Value::as_f64)
                .unwrap_or(0.5)
                .clamp(0.0, 1.0);
            let haulers = 0.05 + 0.35 * score + lean;
            let tickers = 0.30 + 0.20 * score;
            let blanks = 0.35 - 0.35 * score;
            let zeros = (1.0 - haulers - tickers - blanks).max(0.0);
            Some(json!({
                "player_id": id,
                "probs": {
                    "Zeros": zeros,
                    "Blanks": blanks,
                    "Tickers": tickers,
                    "Haulers": haulers,
                },
                "justification": format!("{} view: ranker score {score:.2}", call.tag),
            }))
        })
        .collect();

    Ok(ProviderReply {
        text: Value::Array(answers).to_string(),
    })
}
