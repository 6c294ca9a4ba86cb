//! Dispatcher service.
//!
//! Runs evaluation requests against the configured reasoning providers:
//! - Shared admission semaphore bounding in-flight provider calls
//! - Per-call deadline
//! - Retry with exponential backoff on transient failures
//! - Credential rotation, then model fallback, via the rotation context
//! - Cooperative cancellation
//!
//! Every request yields exactly one [`DispatchOutcome`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::ParseError;
use crate::domain::models::{DispatchConfig, EvaluationRequest, PersonaId};
use crate::domain::ports::{ProviderCall, ProviderError, ReasoningProvider};
use crate::infrastructure::logging::SecretScrubber;
use crate::infrastructure::providers::RetryPolicy;

use super::rotation::{Route, RotationContext};

/// Failure reason recorded for requests abandoned by cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Ceiling on in-flight provider calls (default: 4).
    pub max_concurrency: usize,
    /// Deadline for one provider call (default: 60s).
    pub call_timeout: Duration,
    /// Retry policy applied per route.
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl DispatcherConfig {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Completed {
        text: String,
        provider: String,
        model: String,
        credential: String,
    },
    Failed {
        reason: String,
    },
}

/// Result of dispatching one evaluation request.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub request_id: Uuid,
    pub persona: PersonaId,
    pub candidate_ids: Vec<u32>,
    pub status: DispatchStatus,
    /// Provider calls made for this request.
    pub attempts: u32,
}

impl DispatchOutcome {
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, DispatchStatus::Completed { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.status {
            DispatchStatus::Completed { text, .. } => Some(text),
            DispatchStatus::Failed { .. } => None,
        }
    }
}

/// Locate and parse the JSON array in a model response.
///
/// Models wrap answers in prose or code fences. Parsing is tried from each
/// `[` in turn; the first array of objects wins, else the first array that
/// parses at all.
pub fn parse_json_array(text: &str) -> Result<Vec<Value>, ParseError> {
    let mut first_array = None;
    let mut first_error = None;
    for (start, _) in text.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Vec<Value>>();
        match stream.next() {
            Some(Ok(items)) if items.iter().all(Value::is_object) => return Ok(items),
            Some(Ok(items)) => {
                first_array.get_or_insert(items);
            }
            Some(Err(e)) if !e.is_eof() => {
                first_error.get_or_insert_with(|| e.to_string());
            }
            _ => {}
        }
    }
    match (first_array, first_error) {
        (Some(items), _) => Ok(items),
        (None, Some(error)) => Err(ParseError::InvalidJson(error)),
        (None, None) => Err(ParseError::NoJsonArray),
    }
}

enum AttemptEnd {
    Cancelled,
    Done(Result<String, ProviderError>),
}

/// Concurrent, fault-tolerant dispatcher over a set of providers.
pub struct Dispatcher {
    providers: HashMap<String, Arc<dyn ReasoningProvider>>,
    rotation: Arc<RotationContext>,
    admission: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher with its own admission semaphore.
    pub fn new(
        providers: HashMap<String, Arc<dyn ReasoningProvider>>,
        rotation: Arc<RotationContext>,
        config: DispatcherConfig,
    ) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            providers,
            rotation,
            admission,
            config,
        }
    }

    /// Share an admission semaphore with other dispatchers.
    #[must_use]
    pub fn with_admission(mut self, admission: Arc<Semaphore>) -> Self {
        self.admission = admission;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Currently free admission slots.
    pub fn available_slots(&self) -> usize {
        self.admission.available_permits()
    }

    /// Dispatch a batch. Outcomes come back in request order, one per request.
    pub async fn dispatch(
        &self,
        requests: Vec<EvaluationRequest>,
        cancel: &CancellationToken,
    ) -> Vec<DispatchOutcome> {
        join_all(requests.into_iter().map(|r| self.dispatch_one(r, cancel))).await
    }

    /// Walk the route plan until one call succeeds or every route is spent.
    pub async fn dispatch_one(
        &self,
        request: EvaluationRequest,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let routes = self.rotation.plan().await;
        let route_count = routes.len();
        let mut attempts = 0u32;
        let mut last_error: Option<String> = None;

        for route in routes {
            let Some(provider) = self.providers.get(&route.provider) else {
                warn!(provider = %route.provider, "No provider registered for route");
                last_error = Some(ProviderError::NotConfigured(route.provider.clone()).to_string());
                continue;
            };

            let mut schedule = self.config.retry.schedule();
            for attempt in 0..self.config.retry.max_attempts() {
                let started = Instant::now();
                let result = match self.attempt(provider, &route, &request, cancel).await {
                    AttemptEnd::Cancelled => return cancelled(request, attempts),
                    AttemptEnd::Done(result) => result,
                };
                attempts += 1;
                let latency_ms = started.elapsed().as_millis() as u64;

                match result {
                    Ok(text) => {
                        info!(
                            request_id = %request.id,
                            persona = %request.persona,
                            provider = %route.provider,
                            model = %route.model,
                            credential = %route.credential.id,
                            attempt = attempts,
                            latency_ms,
                            outcome = "success",
                            "Provider attempt"
                        );
                        self.rotation.record_success(&route).await;
                        return DispatchOutcome {
                            request_id: request.id,
                            persona: request.persona,
                            candidate_ids: request.candidate_ids,
                            status: DispatchStatus::Completed {
                                text,
                                provider: route.provider,
                                model: route.model,
                                credential: route.credential.id,
                            },
                            attempts,
                        };
                    }
                    Err(error) => {
                        let detail = SecretScrubber::global()
                            .scrub_with_secret(&error.to_string(), route.credential.expose_secret());
                        info!(
                            request_id = %request.id,
                            persona = %request.persona,
                            provider = %route.provider,
                            model = %route.model,
                            credential = %route.credential.id,
                            attempt = attempts,
                            latency_ms,
                            outcome = error.kind(),
                            error = %detail,
                            "Provider attempt"
                        );

                        if self.config.retry.should_retry(&error, attempt) {
                            let delay = self.config.retry.next_delay(&mut schedule);
                            debug!(request_id = %request.id, delay_ms = delay.as_millis() as u64, "Backing off");
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => return cancelled(request, attempts),
                                () = sleep(delay) => {}
                            }
                            continue;
                        }

                        self.rotation
                            .record_failure(&route, error.is_rate_limit())
                            .await;
                        last_error = Some(detail);
                        break;
                    }
                }
            }
        }

        let reason = match last_error {
            Some(detail) => format!(
                "all {route_count} routes exhausted after {attempts} attempts; last error: {detail}"
            ),
            None => format!("no routes available after {attempts} attempts"),
        };
        warn!(
            request_id = %request.id,
            persona = %request.persona,
            attempts,
            reason = %reason,
            "Evaluation request failed"
        );
        DispatchOutcome {
            request_id: request.id,
            persona: request.persona,
            candidate_ids: request.candidate_ids,
            status: DispatchStatus::Failed { reason },
            attempts,
        }
    }

    /// One admitted, time-boxed provider call.
    async fn attempt(
        &self,
        provider: &Arc<dyn ReasoningProvider>,
        route: &Route,
        request: &EvaluationRequest,
        cancel: &CancellationToken,
    ) -> AttemptEnd {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return AttemptEnd::Cancelled,
            permit = Arc::clone(&self.admission).acquire_owned() => permit,
        };
        let Ok(_permit) = permit else {
            return AttemptEnd::Done(Err(ProviderError::NotConfigured(
                "admission closed".to_string(),
            )));
        };

        let call = ProviderCall {
            tag: request.persona.clone(),
            model: route.model.clone(),
            credential: route.credential.clone(),
            system: request.payload.system.clone(),
            user: request.payload.user.clone(),
            max_tokens: request.payload.max_tokens,
            temperature: request.payload.temperature,
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return AttemptEnd::Cancelled,
            result = timeout(self.config.call_timeout, provider.complete(call)) => result,
        };

        let result = match result {
            Ok(Ok(reply)) => match parse_json_array(&reply.text) {
                Ok(_) => Ok(reply.text),
                Err(e) => Err(ProviderError::Malformed(e.to_string())),
            },
            Ok(Err(error)) => Err(error),
            Err(_) => Err(ProviderError::Timeout(self.config.call_timeout)),
        };
        AttemptEnd::Done(result)
    }
}

fn cancelled(request: EvaluationRequest, attempts: u32) -> DispatchOutcome {
    debug!(request_id = %request.id, persona = %request.persona, "Request abandoned on cancellation");
    DispatchOutcome {
        request_id: request.id,
        persona: request.persona,
        candidate_ids: request.candidate_ids,
        status: DispatchStatus::Failed {
            reason: CANCELLED_REASON.to_string(),
        },
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::{MockProvider, MockResponse};
    use crate::domain::models::{FallbackTarget, PromptPayload};
    use crate::domain::ports::Credential;

    const VALID: &str = r#"[{"player_id": 1, "probs": {"Zeros": 0.25, "Blanks": 0.25, "Tickers": 0.25, "Haulers": 0.25}}]"#;

    fn request(persona: &str) -> EvaluationRequest {
        EvaluationRequest::new(
            persona,
            vec![1],
            PromptPayload {
                system: "sys".to_string(),
                user: "Candidates:\n[{\"player_id\":1}]".to_string(),
                max_tokens: 77,
                temperature: 0.0,
            },
        )
    }

    fn dispatcher(provider: Arc<MockProvider>, max_retries: u32) -> Dispatcher {
        let chain = vec![
            FallbackTarget::new("mock", "small", "k1"),
            FallbackTarget::new("mock", "small", "k2"),
            FallbackTarget::new("mock", "large", "k1"),
        ];
        let credentials = vec![
            Credential::new("k1", "mock", "secret-one"),
            Credential::new("k2", "mock", "secret-two"),
        ];
        let rotation =
            Arc::new(RotationContext::new(&chain, &credentials, Duration::from_secs(30)).unwrap());
        let mut providers: HashMap<String, Arc<dyn ReasoningProvider>> = HashMap::new();
        providers.insert("mock".to_string(), provider);
        Dispatcher::new(
            providers,
            rotation,
            DispatcherConfig {
                max_concurrency: 2,
                call_timeout: Duration::from_secs(5),
                retry: RetryPolicy::new(max_retries, 100, 1_000),
            },
        )
    }

    #[test]
    fn test_parse_json_array_in_prose() {
        let text = "Here you go:\n```json\n[{\"player_id\": 3}]\n```";
        assert_eq!(parse_json_array(text).unwrap().len(), 1);
        assert_eq!(parse_json_array("no json"), Err(ParseError::NoJsonArray));
        assert!(matches!(parse_json_array("[1,"), Err(ParseError::NoJsonArray)));
        assert!(matches!(
            parse_json_array("[oops]"),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_json_array_skips_bracketed_prose() {
        let text = "Scores [see notes] below:\n[{\"player_id\": 3}, {\"player_id\": 4}]\n[end]";
        let items = parse_json_array(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["player_id"], 3);

        // A bare list in prose yields to the array of objects after it.
        let text = "Top [1, 2] picks: [{\"player_id\": 1}]";
        assert_eq!(parse_json_array(text).unwrap()[0]["player_id"], 1);

        assert_eq!(parse_json_array("ranked [1, 2]").unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds_on_same_route() {
        let provider = Arc::new(MockProvider::with_default_response(
            "mock",
            MockResponse::success(VALID),
        ));
        provider
            .script(
                "small",
                "k1",
                vec![MockResponse::failure(ProviderError::Server {
                    status: 503,
                    message: "busy".into(),
                })],
            )
            .await;
        let dispatcher = dispatcher(Arc::clone(&provider), 2);

        let outcome = dispatcher
            .dispatch_one(request("safe_bet"), &CancellationToken::new())
            .await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(
            outcome.status,
            DispatchStatus::Completed { ref credential, ref model, .. } if credential == "k1" && model == "small"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_rotates_credential_immediately() {
        let provider = Arc::new(MockProvider::with_default_response(
            "mock",
            MockResponse::success(VALID),
        ));
        provider
            .set_response_for_route(
                "small",
                "k1",
                MockResponse::failure(ProviderError::Auth("bad key".into())),
            )
            .await;
        let dispatcher = dispatcher(Arc::clone(&provider), 2);

        let outcome = dispatcher
            .dispatch_one(request("safe_bet"), &CancellationToken::new())
            .await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(
            outcome.status,
            DispatchStatus::Completed { ref credential, .. } if credential == "k2"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reply_is_retried() {
        let provider = Arc::new(MockProvider::with_default_response(
            "mock",
            MockResponse::success(VALID),
        ));
        provider
            .script("small", "k1", vec![MockResponse::success("I cannot help with that")])
            .await;
        let dispatcher = dispatcher(Arc::clone(&provider), 1);

        let outcome = dispatcher
            .dispatch_one(request("value_hunter"), &CancellationToken::new())
            .await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_chain_yields_failed_outcome() {
        let provider = Arc::new(MockProvider::with_default_response(
            "mock",
            MockResponse::failure(ProviderError::RateLimited("429 secret-one".into())),
        ));
        let dispatcher = dispatcher(Arc::clone(&provider), 1);

        let outcome = dispatcher
            .dispatch_one(request("value_hunter"), &CancellationToken::new())
            .await;

        // three routes, two attempts each
        assert_eq!(outcome.attempts, 6);
        assert_eq!(provider.call_count().await, 6);
        let DispatchStatus::Failed { reason } = outcome.status else {
            panic!("expected failure");
        };
        assert!(reason.contains("exhausted"));
        assert!(!reason.contains("secret-one"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let provider = Arc::new(MockProvider::with_default_response(
            "mock",
            MockResponse::success(VALID),
        ));
        let dispatcher = dispatcher(Arc::clone(&provider), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = dispatcher
            .dispatch(vec![request("a"), request("b")], &cancel)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.text().is_none()));
        assert_eq!(provider.call_count().await, 0);
    }
}
