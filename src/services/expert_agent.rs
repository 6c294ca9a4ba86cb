//! Expert panel evaluation engine.
//!
//! One engine, parameterised by a persona descriptor. Each persona chunks the
//! shortlist, sends one evaluation request per chunk through the shared
//! dispatcher and turns the raw answers into one [`EvaluationResult`] per
//! candidate. Malformed answers become invalid results; nothing here fails
//! the run.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::ParseError;
use crate::domain::models::{
    EvaluationRequest, EvaluationResult, OutcomeDistribution, PanelConfig, PersonaConfig,
    PersonaId, PromptPayload, RankedCandidate, CANDIDATES_HEADER,
};

use super::dispatcher::{parse_json_array, DispatchOutcome, DispatchStatus, Dispatcher};

/// Justification used when a persona leaves it blank.
pub const EMPTY_JUSTIFICATION: &str = "No justification provided.";

/// Headroom over the per-candidate token budget, in tenths (11 = 110%).
const TOKEN_HEADROOM_TENTHS: u64 = 11;

const BUCKETS: [&str; 4] = ["Zeros", "Blanks", "Tickers", "Haulers"];

const OUTPUT_INSTRUCTIONS: &str = "For each candidate, assign probabilities to four outcomes \
for the next gameweek: Zeros (0 pts), Blanks (1-2 pts), Tickers (3-7 pts), Haulers (8+ pts). \
The four probabilities must sum to 1. Add a short justification of at most 20 words.

Return ONLY a JSON array with one object per candidate:
[
  {
    \"player_id\": 123,
    \"probs\": {\"Zeros\": 0.1, \"Blanks\": 0.2, \"Tickers\": 0.4, \"Haulers\": 0.3},
    \"justification\": \"nailed starter, strong fixture\"
  }
]";

/// Everything one persona produced for the shortlist.
#[derive(Debug, Clone)]
pub struct PersonaReport {
    pub persona: PersonaId,
    /// One result per shortlisted candidate, in shortlist order.
    pub results: Vec<EvaluationResult>,
    pub requests: usize,
    pub failed_requests: usize,
    pub attempts: u32,
}

impl PersonaReport {
    pub fn valid_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_valid()).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.results.len() - self.valid_count()
    }
}

/// Output of the whole panel, one report per persona in configured order.
#[derive(Debug, Clone, Default)]
pub struct PanelReport {
    pub personas: Vec<PersonaReport>,
}

impl PanelReport {
    /// Every result from every persona.
    pub fn results(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.personas.iter().flat_map(|p| p.results.iter())
    }

    pub fn requests(&self) -> usize {
        self.personas.iter().map(|p| p.requests).sum()
    }

    pub fn failed_requests(&self) -> usize {
        self.personas.iter().map(|p| p.failed_requests).sum()
    }
}

/// The shared evaluation engine bound to one persona.
pub struct ExpertAgent {
    persona: PersonaConfig,
    settings: PanelConfig,
    dispatcher: Arc<Dispatcher>,
}

impl ExpertAgent {
    pub fn new(persona: PersonaConfig, settings: &PanelConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            persona,
            settings: settings.clone(),
            dispatcher,
        }
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "{}\n\nWeigh these signals: {}\n\n{OUTPUT_INSTRUCTIONS}",
            self.persona.prompt_template, self.persona.rubric
        )
    }

    /// One request per chunk of the shortlist.
    pub fn build_requests(&self, candidates: &[RankedCandidate]) -> Vec<EvaluationRequest> {
        let system = self.system_prompt();
        candidates
            .chunks(self.settings.chunk_size.max(1))
            .map(|chunk| {
                let compact: Vec<Value> = chunk.iter().map(compact_candidate).collect();
                let user = format!("{CANDIDATES_HEADER}\n{}", Value::Array(compact));
                let max_tokens = token_budget(chunk.len(), self.settings.max_tokens_per_candidate);
                EvaluationRequest::new(
                    self.persona.id.clone(),
                    chunk.iter().map(RankedCandidate::id).collect(),
                    PromptPayload {
                        system: system.clone(),
                        user,
                        max_tokens,
                        temperature: self.settings.temperature,
                    },
                )
            })
            .collect()
    }

    /// Evaluate the shortlist. Always returns one result per candidate.
    pub async fn evaluate(
        &self,
        candidates: &[RankedCandidate],
        cancel: &CancellationToken,
    ) -> PersonaReport {
        let requests = self.build_requests(candidates);
        let request_count = requests.len();
        debug!(persona = %self.persona.id, requests = request_count, "Dispatching persona chunks");

        let outcomes = self.dispatcher.dispatch(requests, cancel).await;
        let failed_requests = outcomes.iter().filter(|o| !o.is_completed()).count();
        let attempts = outcomes.iter().map(|o| o.attempts).sum();
        let results: Vec<EvaluationResult> = outcomes
            .iter()
            .flat_map(|outcome| self.results_for(outcome))
            .collect();

        let report = PersonaReport {
            persona: self.persona.id.clone(),
            results,
            requests: request_count,
            failed_requests,
            attempts,
        };
        info!(
            persona = %report.persona,
            valid = report.valid_count(),
            invalid = report.invalid_count(),
            failed_requests,
            "Persona evaluation complete"
        );
        report
    }

    fn results_for(&self, outcome: &DispatchOutcome) -> Vec<EvaluationResult> {
        match &outcome.status {
            DispatchStatus::Completed { text, .. } => self.parse_response(&outcome.candidate_ids, text),
            DispatchStatus::Failed { reason } => {
                let reason = ParseError::DispatchFailed(reason.clone()).to_string();
                outcome
                    .candidate_ids
                    .iter()
                    .map(|id| EvaluationResult::invalid(*id, self.persona.id.clone(), reason.clone(), None))
                    .collect()
            }
        }
    }

    /// Parse a raw answer against the expected schema.
    ///
    /// Returns exactly one result per id in `candidate_ids`, in that order.
    /// Entries for ids outside the chunk are ignored; a repeated id keeps
    /// its first entry.
    pub fn parse_response(&self, candidate_ids: &[u32], text: &str) -> Vec<EvaluationResult> {
        let persona = self.persona.id.as_str();
        let entries = match parse_json_array(text) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(persona, error = %error, "Unparseable persona response");
                return candidate_ids
                    .iter()
                    .map(|id| {
                        EvaluationResult::invalid(*id, persona, error.to_string(), Some(text.to_string()))
                    })
                    .collect();
            }
        };

        let mut by_id: HashMap<u32, EvaluationResult> = HashMap::with_capacity(candidate_ids.len());
        for entry in &entries {
            let Some(id) = entry_id(entry) else {
                debug!(persona, "Skipping response entry without player id");
                continue;
            };
            if !candidate_ids.contains(&id) {
                warn!(persona, player = id, "Response names a candidate outside the chunk");
                continue;
            }
            if by_id.contains_key(&id) {
                debug!(persona, player = id, "Duplicate response entry ignored");
                continue;
            }
            let result = match self.parse_distribution(entry) {
                Ok(distribution) => EvaluationResult::valid(
                    id,
                    persona,
                    distribution,
                    self.justification(entry),
                ),
                Err(error) => {
                    EvaluationResult::invalid(id, persona, error.to_string(), Some(entry.to_string()))
                }
            };
            by_id.insert(id, result);
        }

        candidate_ids
            .iter()
            .map(|id| {
                by_id.remove(id).unwrap_or_else(|| {
                    EvaluationResult::invalid(
                        *id,
                        persona,
                        ParseError::MissingCandidate(*id).to_string(),
                        Some(text.to_string()),
                    )
                })
            })
            .collect()
    }

    fn parse_distribution(&self, entry: &Value) -> Result<OutcomeDistribution, ParseError> {
        let probs = entry
            .get("probs")
            .or_else(|| entry.get("probabilities"))
            .and_then(Value::as_object)
            .or_else(|| entry.as_object())
            .ok_or(ParseError::MissingBucket { bucket: BUCKETS[0] })?;

        let mut values = [0.0; 4];
        for (slot, bucket) in values.iter_mut().zip(BUCKETS) {
            let value = bucket_value(probs, bucket).ok_or(ParseError::MissingBucket { bucket })?;
            if !value.is_finite() || value < 0.0 {
                return Err(ParseError::InvalidProbability { bucket, value });
            }
            *slot = value;
        }

        let distribution = OutcomeDistribution::from_array(values);
        let sum = distribution.sum();
        let tolerance = self.settings.probability_tolerance;
        if (sum - 1.0).abs() > tolerance {
            return Err(ParseError::SumOutOfTolerance { sum, tolerance });
        }
        distribution
            .normalized()
            .ok_or(ParseError::SumOutOfTolerance { sum, tolerance })
    }

    fn justification(&self, entry: &Value) -> String {
        let text = entry
            .get("justification")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if text.is_empty() {
            return EMPTY_JUSTIFICATION.to_string();
        }
        text.chars().take(self.settings.justification_max_chars).collect()
    }
}

/// All configured personas, evaluated concurrently.
pub struct ExpertPanel {
    agents: Vec<ExpertAgent>,
}

impl ExpertPanel {
    pub fn from_config(settings: &PanelConfig, dispatcher: &Arc<Dispatcher>) -> Self {
        Self {
            agents: settings
                .personas
                .iter()
                .map(|persona| ExpertAgent::new(persona.clone(), settings, Arc::clone(dispatcher)))
                .collect(),
        }
    }

    pub fn agents(&self) -> &[ExpertAgent] {
        &self.agents
    }

    /// Run every persona and wait for all of them.
    pub async fn evaluate(
        &self,
        candidates: &[RankedCandidate],
        cancel: &CancellationToken,
    ) -> PanelReport {
        let personas = join_all(self.agents.iter().map(|agent| agent.evaluate(candidates, cancel))).await;
        PanelReport { personas }
    }
}

fn entry_id(entry: &Value) -> Option<u32> {
    let raw = entry.get("player_id").or_else(|| entry.get("id"))?;
    let id = match raw {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(id).ok()
}

fn bucket_value(probs: &Map<String, Value>, bucket: &str) -> Option<f64> {
    let value = probs.get(bucket).or_else(|| {
        probs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(bucket))
            .map(|(_, value)| value)
    })?;
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `ceil(candidates * per_candidate * 1.1)` in integer arithmetic.
fn token_budget(candidates: usize, per_candidate: u32) -> u32 {
    let base = candidates as u64 * u64::from(per_candidate);
    let budget = (base * TOKEN_HEADROOM_TENTHS).div_ceil(10);
    u32::try_from(budget).unwrap_or(u32::MAX)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Prompt view of one candidate.
fn compact_candidate(candidate: &RankedCandidate) -> Value {
    let record = &candidate.record;
    let mut object = json!({
        "player_id": record.id,
        "name": record.name,
        "position": record.position.code(),
        "team": record.club,
        "price": record.price,
        "ranker_score": round3(candidate.score),
    });
    if let Value::Object(map) = &mut object {
        for (key, value) in &record.stats {
            if value.is_finite() {
                map.insert(key.clone(), json!(round3(*value)));
            }
        }
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::{MockProvider, MockResponse};
    use crate::domain::models::{DispatchConfig, FallbackTarget, PlayerRecord, Position};
    use crate::domain::ports::{Credential, ProviderError, ReasoningProvider};
    use crate::services::dispatcher::DispatcherConfig;
    use crate::services::rotation::RotationContext;
    use std::time::Duration;

    fn candidates(n: u32) -> Vec<RankedCandidate> {
        (1..=n)
            .map(|id| RankedCandidate {
                record: Arc::new(
                    PlayerRecord::new(id, format!("P{id}"), "ARS", Position::Midfielder, 5.0)
                        .with_stat("expected_points", 4.25),
                ),
                score: 1.0 - f64::from(id) / 100.0,
                rank: id as usize,
            })
            .collect()
    }

    fn dispatcher(provider: Arc<MockProvider>) -> Arc<Dispatcher> {
        let rotation = RotationContext::new(
            &[FallbackTarget::new("mock", "m", "k")],
            &[Credential::new("k", "mock", "s")],
            Duration::from_secs(1),
        )
        .unwrap();
        let mut providers: HashMap<String, Arc<dyn ReasoningProvider>> = HashMap::new();
        providers.insert("mock".to_string(), provider);
        let mut config = DispatcherConfig::from_config(&DispatchConfig::default());
        config.retry.max_retries = 0;
        Arc::new(Dispatcher::new(providers, Arc::new(rotation), config))
    }

    fn agent(chunk_size: usize, provider: Arc<MockProvider>) -> ExpertAgent {
        let settings = PanelConfig {
            chunk_size,
            ..PanelConfig::default()
        };
        ExpertAgent::new(settings.personas[0].clone(), &settings, dispatcher(provider))
    }

    #[test]
    fn test_build_requests_chunks_and_budgets_tokens() {
        let agent = agent(4, Arc::new(MockProvider::new("mock")));
        let requests = agent.build_requests(&candidates(10));

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].candidate_ids, vec![1, 2, 3, 4]);
        assert_eq!(requests[2].candidate_ids, vec![9, 10]);
        assert_eq!(requests[0].payload.max_tokens, 308);
        assert!(requests[0].payload.user.starts_with("Candidates:\n["));
        assert!(requests[0].payload.system.contains("Value Hunter"));
        assert!(requests[0].payload.user.contains("\"expected_points\":4.25"));
    }

    #[test]
    fn test_parse_response_strict_schema() {
        let agent = agent(30, Arc::new(MockProvider::new("mock")));
        let text = r#"Sure! [
            {"player_id": 1, "probs": {"Zeros": 0.1, "Blanks": 0.2, "Tickers": 0.4, "Haulers": 0.32}, "justification": "  "},
            {"player_id": 2, "probs": {"Zeros": 0.5, "Blanks": 0.5, "Tickers": 0.5, "Haulers": 0.5}},
            {"player_id": 3, "probs": {"Zeros": -0.1, "Blanks": 0.5, "Tickers": 0.3, "Haulers": 0.3}},
            {"player_id": "4", "Zeros": 0.25, "blanks": 0.25, "Tickers": 0.25, "Haulers": 0.25, "justification": "ok"},
            {"player_id": 4, "probs": {"Zeros": 1.0, "Blanks": 0.0, "Tickers": 0.0, "Haulers": 0.0}},
            {"player_id": 99, "probs": {"Zeros": 1.0, "Blanks": 0.0, "Tickers": 0.0, "Haulers": 0.0}}
        ]"#;

        let results = agent.parse_response(&[1, 2, 3, 4, 5], text);
        let ids: Vec<u32> = results.iter().map(|r| r.candidate_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        assert!(results[0].is_valid());
        let dist = results[0].distribution.unwrap();
        assert!((dist.sum() - 1.0).abs() < 1e-12);
        assert_eq!(results[0].justification, EMPTY_JUSTIFICATION);

        assert!(!results[1].is_valid());
        assert!(!results[2].is_valid());
        assert!(results[3].is_valid());
        assert!((results[3].distribution.unwrap().zeros - 0.25).abs() < 1e-12);
        assert_eq!(results[3].justification, "ok");
        assert!(!results[4].is_valid());
        assert!(matches!(
            &results[4].validity,
            crate::domain::models::Validity::Invalid { raw: Some(_), .. }
        ));
    }

    #[test]
    fn test_justification_is_truncated() {
        let agent = agent(30, Arc::new(MockProvider::new("mock")));
        let long = "x".repeat(500);
        let text = format!(
            r#"[{{"player_id": 1, "probs": {{"Zeros": 0.25, "Blanks": 0.25, "Tickers": 0.25, "Haulers": 0.25}}, "justification": "{long}"}}]"#
        );
        let results = agent.parse_response(&[1], &text);
        assert_eq!(results[0].justification.chars().count(), 200);
    }

    #[tokio::test]
    async fn test_failed_dispatch_marks_chunk_invalid() {
        let provider = Arc::new(MockProvider::with_default_response(
            "mock",
            MockResponse::failure(ProviderError::Auth("revoked".into())),
        ));
        let agent = agent(3, provider);
        let report = agent.evaluate(&candidates(5), &CancellationToken::new()).await;

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.requests, 2);
        assert_eq!(report.failed_requests, 2);
        assert_eq!(report.valid_count(), 0);
    }

    #[tokio::test]
    async fn test_panel_runs_all_personas() {
        let provider = Arc::new(MockProvider::new("mock"));
        let settings = PanelConfig::default();
        let panel = ExpertPanel::from_config(&settings, &dispatcher(Arc::clone(&provider)));

        let report = panel.evaluate(&candidates(12), &CancellationToken::new()).await;

        assert_eq!(report.personas.len(), 3);
        assert_eq!(report.requests(), 3);
        assert_eq!(report.results().count(), 36);
        assert!(report.results().all(EvaluationResult::is_valid));
        assert_eq!(provider.call_count().await, 3);
    }
}
