//! Credential rotation and model fallback state.
//!
//! A [`RotationContext`] is built once per process (or per test) and handed
//! to the dispatcher. It turns the configured fallback chain into an ordered
//! list of routes for each request and learns from outcomes: a credential
//! that succeeds becomes the first choice for its model, and a credential
//! that hit a rate limit is tried last until its cooldown expires.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::models::FallbackTarget;
use crate::domain::ports::Credential;

/// Errors building a rotation context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RotationError {
    #[error("Fallback chain is empty")]
    EmptyChain,

    #[error("No fallback target has a resolved credential")]
    NoUsableTargets,
}

/// One concrete `(provider, model, credential)` attempt target.
#[derive(Debug, Clone)]
pub struct Route {
    pub provider: String,
    pub model: String,
    pub credential: Credential,
}

impl Route {
    fn group(&self) -> (String, String) {
        (self.provider.clone(), self.model.clone())
    }
}

/// Per-credential counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialStats {
    pub successes: u32,
    pub failures: u32,
    pub rate_limits: u32,
}

#[derive(Debug, Default)]
struct RotationState {
    /// Preferred credential id per (provider, model) group.
    preferred: HashMap<(String, String), String>,
    cooling_until: HashMap<String, Instant>,
    stats: BTreeMap<String, CredentialStats>,
}

/// Shared, injectable rotation state.
#[derive(Debug)]
pub struct RotationContext {
    /// Routes grouped by model, groups in fallback order.
    groups: Vec<Vec<Route>>,
    cooldown: Duration,
    state: Mutex<RotationState>,
}

impl RotationContext {
    /// Build from the configured chain. Targets whose credential was not
    /// resolved are skipped.
    pub fn new(
        chain: &[FallbackTarget],
        credentials: &[Credential],
        cooldown: Duration,
    ) -> Result<Self, RotationError> {
        if chain.is_empty() {
            return Err(RotationError::EmptyChain);
        }

        let by_id: HashMap<&str, &Credential> =
            credentials.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut groups: Vec<Vec<Route>> = Vec::new();
        for target in chain {
            let Some(credential) = by_id.get(target.credential.as_str()) else {
                warn!(
                    provider = %target.provider,
                    model = %target.model,
                    credential = %target.credential,
                    "Skipping fallback target with unresolved credential"
                );
                continue;
            };
            let route = Route {
                provider: target.provider.clone(),
                model: target.model.clone(),
                credential: (*credential).clone(),
            };
            match groups.last_mut() {
                Some(group) if group[0].group() == route.group() => group.push(route),
                _ => groups.push(vec![route]),
            }
        }

        if groups.is_empty() {
            return Err(RotationError::NoUsableTargets);
        }

        Ok(Self {
            groups,
            cooldown,
            state: Mutex::new(RotationState::default()),
        })
    }

    /// Routes to try for the next request, in order.
    ///
    /// Model groups keep their configured order. Within a group the
    /// preferred credential goes first and cooling credentials go last.
    pub async fn plan(&self) -> Vec<Route> {
        let state = self.state.lock().await;
        let now = Instant::now();
        let mut plan = Vec::with_capacity(self.groups.iter().map(Vec::len).sum());

        for group in &self.groups {
            let preferred = state.preferred.get(&group[0].group());
            let mut routes: Vec<(usize, &Route)> = group.iter().enumerate().collect();
            routes.sort_by_key(|(index, route)| {
                let cooling = state
                    .cooling_until
                    .get(&route.credential.id)
                    .is_some_and(|until| *until > now);
                let is_preferred = preferred.is_some_and(|id| *id == route.credential.id);
                (cooling, !is_preferred, *index)
            });
            plan.extend(routes.into_iter().map(|(_, route)| route.clone()));
        }

        plan
    }

    pub async fn record_success(&self, route: &Route) {
        let mut state = self.state.lock().await;
        state
            .preferred
            .insert(route.group(), route.credential.id.clone());
        state.cooling_until.remove(&route.credential.id);
        state
            .stats
            .entry(route.credential.id.clone())
            .or_default()
            .successes += 1;
    }

    /// The route was abandoned. A rate limit puts its credential on cooldown.
    pub async fn record_failure(&self, route: &Route, rate_limited: bool) {
        let mut state = self.state.lock().await;
        let stats = state.stats.entry(route.credential.id.clone()).or_default();
        stats.failures += 1;
        if rate_limited {
            stats.rate_limits += 1;
            let until = Instant::now() + self.cooldown;
            state
                .cooling_until
                .insert(route.credential.id.clone(), until);
            debug!(
                credential = %route.credential.id,
                cooldown_secs = self.cooldown.as_secs(),
                "Credential cooling down after rate limit"
            );
        }
        let group = route.group();
        if state
            .preferred
            .get(&group)
            .is_some_and(|id| *id == route.credential.id)
        {
            state.preferred.remove(&group);
        }
    }

    /// Counters per credential id.
    pub async fn stats(&self) -> BTreeMap<String, CredentialStats> {
        self.state.lock().await.stats.clone()
    }

    /// Total number of routes in the chain.
    pub fn route_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Vec<Credential> {
        vec![
            Credential::new("k1", "groq", "secret-one"),
            Credential::new("k2", "groq", "secret-two"),
        ]
    }

    fn chain() -> Vec<FallbackTarget> {
        vec![
            FallbackTarget::new("groq", "small", "k1"),
            FallbackTarget::new("groq", "small", "k2"),
            FallbackTarget::new("groq", "large", "k1"),
            FallbackTarget::new("groq", "large", "k2"),
        ]
    }

    fn ids(plan: &[Route]) -> Vec<String> {
        plan.iter()
            .map(|r| format!("{}/{}", r.model, r.credential.id))
            .collect()
    }

    #[tokio::test]
    async fn test_plan_follows_chain_order() {
        let ctx = RotationContext::new(&chain(), &credentials(), Duration::from_secs(30)).unwrap();
        assert_eq!(
            ids(&ctx.plan().await),
            vec!["small/k1", "small/k2", "large/k1", "large/k2"]
        );
        assert_eq!(ctx.route_count(), 4);
    }

    #[tokio::test]
    async fn test_success_makes_credential_preferred_within_model() {
        let ctx = RotationContext::new(&chain(), &credentials(), Duration::from_secs(30)).unwrap();
        let plan = ctx.plan().await;
        ctx.record_success(&plan[1]).await;

        assert_eq!(
            ids(&ctx.plan().await),
            vec!["small/k2", "small/k1", "large/k1", "large/k2"]
        );
        assert_eq!(ctx.stats().await["k2"].successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_credential_cools_down() {
        let ctx = RotationContext::new(&chain(), &credentials(), Duration::from_secs(30)).unwrap();
        let plan = ctx.plan().await;
        ctx.record_failure(&plan[0], true).await;

        assert_eq!(
            ids(&ctx.plan().await),
            vec!["small/k2", "small/k1", "large/k2", "large/k1"]
        );

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(
            ids(&ctx.plan().await),
            vec!["small/k1", "small/k2", "large/k1", "large/k2"]
        );
        assert_eq!(ctx.stats().await["k1"].rate_limits, 1);
    }

    #[test]
    fn test_unresolved_credentials_are_skipped() {
        let only_k1 = vec![Credential::new("k1", "groq", "secret-one")];
        let ctx = RotationContext::new(&chain(), &only_k1, Duration::from_secs(30)).unwrap();
        assert_eq!(ctx.route_count(), 2);

        let err = RotationContext::new(&chain(), &[], Duration::from_secs(30)).unwrap_err();
        assert_eq!(err, RotationError::NoUsableTargets);
        let err = RotationContext::new(&[], &only_k1, Duration::from_secs(30)).unwrap_err();
        assert_eq!(err, RotationError::EmptyChain);
    }
}
