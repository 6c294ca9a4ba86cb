//! Constrained squad construction.
//!
//! The primary path maximises consensus value over the shortlist; the
//! fallback uses ranker scores over the whole ranked pool. Both run the same
//! branch-and-bound search and both results are checked against
//! [`Squad::violations`] before they leave this module.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::domain::errors::ConstraintError;
use crate::domain::models::{
    ConsensusReport, Position, Provenance, RankedCandidate, ScoreSource, SharedPlayer, Squad,
    SquadConfig, SquadConstraints, SquadSlot, BUDGET_EPSILON,
};

const VALUE_EPSILON: f64 = 1e-12;

/// One selectable player with the value the search maximises.
#[derive(Debug, Clone)]
struct Entry {
    player: SharedPlayer,
    value: f64,
    source: ScoreSource,
}

impl Entry {
    fn position(&self) -> usize {
        self.player.position.index()
    }

    fn into_slot(self) -> SquadSlot {
        SquadSlot {
            player: self.player,
            value: self.value,
            source: self.source,
        }
    }
}

fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| RankedCandidate::ranking_order(a.value, a.player.id, b.value, b.player.id));
}

#[derive(Debug, Clone)]
pub struct SquadBuilder {
    constraints: SquadConstraints,
    node_limit: u64,
}

impl SquadBuilder {
    pub const fn new(constraints: SquadConstraints, node_limit: u64) -> Self {
        Self {
            constraints,
            node_limit,
        }
    }

    pub const fn from_config(config: &SquadConfig) -> Self {
        Self::new(config.constraints(), config.search_node_limit)
    }

    pub const fn constraints(&self) -> &SquadConstraints {
        &self.constraints
    }

    /// Build from consensus when possible, otherwise from ranker scores.
    ///
    /// Errors only when the fallback itself finds no legal squad.
    pub fn build(
        &self,
        shortlist: &[RankedCandidate],
        pool: &[RankedCandidate],
        consensus: &ConsensusReport,
    ) -> Result<Squad, ConstraintError> {
        match self.build_primary(shortlist, consensus) {
            Ok(squad) => Ok(squad),
            Err(reason) => {
                warn!(reason = %reason, "Primary squad search failed, using ranker fallback");
                Ok(self.build_fallback(pool)?.with_fallback_reason(reason.to_string()))
            }
        }
    }

    /// Maximise consensus value over the shortlist.
    ///
    /// Candidates without a consensus score keep their ranker score.
    pub fn build_primary(
        &self,
        shortlist: &[RankedCandidate],
        consensus: &ConsensusReport,
    ) -> Result<Squad, ConstraintError> {
        let required = self.constraints.formation.as_array();
        for position in Position::ALL {
            let covered = shortlist
                .iter()
                .filter(|c| c.position() == position && consensus.get(c.id()).is_some())
                .count();
            let needed = required[position.index()];
            if covered < needed {
                return Err(ConstraintError::InsufficientCoverage {
                    position,
                    covered,
                    required: needed,
                });
            }
        }

        let mut entries = Vec::with_capacity(shortlist.len());
        let mut vetoed = Vec::new();
        let mut strong = Vec::new();
        for candidate in shortlist {
            let entry = match consensus.get(candidate.id()) {
                Some(score) => {
                    if score.vetoed {
                        vetoed.push(candidate.id());
                    }
                    if score.strong_pick {
                        strong.push(candidate.id());
                    }
                    Entry {
                        player: candidate.record.clone(),
                        value: score.merged_score,
                        source: ScoreSource::Consensus,
                    }
                }
                None => Entry {
                    player: candidate.record.clone(),
                    value: candidate.score,
                    source: ScoreSource::Ranker,
                },
            };
            if !entry.value.is_finite() {
                return Err(ConstraintError::MalformedScore(candidate.id()));
            }
            entries.push(entry);
        }
        sort_entries(&mut entries);
        let entries = self.drop_vetoed(entries, &vetoed);

        let locked = self.lock_strong_picks(&entries, &strong);
        let chosen = if locked.is_empty() {
            self.search(&entries, &[])?
        } else {
            match self.search(&entries, &locked) {
                Ok(chosen) => chosen,
                Err(error) => {
                    debug!(locked = locked.len(), error = %error, "Releasing strong pick lock");
                    self.search(&entries, &[])?
                }
            }
        };

        let squad = self.finish(chosen, Provenance::ConsensusBuilt)?;
        info!(
            total_price = squad.total_price(),
            total_value = squad.total_value(),
            "Consensus squad built"
        );
        Ok(squad)
    }

    /// Build from ranker scores alone over the full ranked pool.
    pub fn build_fallback(&self, pool: &[RankedCandidate]) -> Result<Squad, ConstraintError> {
        let required = self.constraints.formation.as_array();
        for position in Position::ALL {
            let available = pool.iter().filter(|c| c.position() == position).count();
            let needed = required[position.index()];
            if available < needed {
                return Err(ConstraintError::InsufficientCandidates {
                    position,
                    available,
                    required: needed,
                });
            }
        }

        let mut entries: Vec<Entry> = pool
            .iter()
            .filter(|c| c.score.is_finite())
            .map(|c| Entry {
                player: c.record.clone(),
                value: c.score,
                source: ScoreSource::Ranker,
            })
            .collect();
        sort_entries(&mut entries);

        let chosen = self.search(&entries, &[]).map_err(|error| {
            warn!(error = %error, "Fallback search found no squad");
            ConstraintError::Infeasible {
                budget: self.constraints.budget,
                max_per_club: self.constraints.max_per_club,
            }
        })?;

        let squad = self.finish(chosen, Provenance::FallbackBuilt)?;
        info!(
            total_price = squad.total_price(),
            total_value = squad.total_value(),
            "Fallback squad built"
        );
        Ok(squad)
    }

    /// Drop vetoed entries, lowest value first, while every position keeps
    /// its required count.
    fn drop_vetoed(&self, entries: Vec<Entry>, vetoed: &[u32]) -> Vec<Entry> {
        if vetoed.is_empty() {
            return entries;
        }
        let required = self.constraints.formation.as_array();
        let mut available = [0usize; 4];
        for entry in &entries {
            available[entry.position()] += 1;
        }

        let mut dropped = Vec::new();
        for entry in entries.iter().rev() {
            let p = entry.position();
            if vetoed.contains(&entry.player.id) && available[p] > required[p] {
                available[p] -= 1;
                dropped.push(entry.player.id);
            }
        }
        if !dropped.is_empty() {
            debug!(dropped = ?dropped, "Vetoed candidates removed");
        }
        entries
            .into_iter()
            .filter(|e| !dropped.contains(&e.player.id))
            .collect()
    }

    /// Strong picks that fit together, best first.
    fn lock_strong_picks(&self, entries: &[Entry], strong: &[u32]) -> Vec<usize> {
        let required = self.constraints.formation.as_array();
        let mut counts = [0usize; 4];
        let mut clubs: HashMap<&str, usize> = HashMap::new();
        let mut spent = 0.0;
        let mut locked = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            if !strong.contains(&entry.player.id) {
                continue;
            }
            let p = entry.position();
            let club = clubs.entry(entry.player.club.as_str()).or_default();
            if counts[p] < required[p]
                && *club < self.constraints.max_per_club
                && spent + entry.player.price <= self.constraints.budget + BUDGET_EPSILON
            {
                counts[p] += 1;
                *club += 1;
                spent += entry.player.price;
                locked.push(index);
            }
        }
        locked
    }

    fn search(&self, entries: &[Entry], locked: &[usize]) -> Result<Vec<Entry>, ConstraintError> {
        let mut search = Search::new(entries, &self.constraints, self.node_limit, locked);
        search.seed_greedy();
        if search.best.is_none() {
            // The greedy pass completes whenever any legal squad exists.
            return Err(ConstraintError::SearchExhausted { nodes: 0 });
        }
        search.run();
        let nodes = search.nodes;
        match search.best.take() {
            Some((value, indices)) => {
                debug!(nodes, value, "Squad search finished");
                Ok(indices.into_iter().map(|i| entries[i].clone()).collect())
            }
            None => Err(ConstraintError::SearchExhausted { nodes }),
        }
    }

    fn finish(&self, chosen: Vec<Entry>, provenance: Provenance) -> Result<Squad, ConstraintError> {
        let squad = Squad::new(chosen.into_iter().map(Entry::into_slot).collect(), provenance);
        let violations = squad.violations(&self.constraints);
        if violations.is_empty() {
            Ok(squad)
        } else {
            let joined = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            Err(ConstraintError::Violations(joined))
        }
    }
}

/// Depth-first branch and bound over entries sorted by value.
struct Search<'a> {
    entries: &'a [Entry],
    constraints: &'a SquadConstraints,
    required: [usize; 4],
    node_limit: u64,
    nodes: u64,
    /// Per index, how many entries of each position precede it.
    seen_before: Vec<[usize; 4]>,
    per_position: [usize; 4],
    /// Prefix sums of values per position, in value order.
    value_prefix: [Vec<f64>; 4],
    /// Prefix sums of the cheapest prices per position.
    cheapest_prefix: [Vec<f64>; 4],
    locked: Vec<bool>,
    chosen: Vec<usize>,
    counts: [usize; 4],
    clubs: HashMap<&'a str, usize>,
    spent: f64,
    value: f64,
    best: Option<(f64, Vec<usize>)>,
}

impl<'a> Search<'a> {
    fn new(
        entries: &'a [Entry],
        constraints: &'a SquadConstraints,
        node_limit: u64,
        locked: &[usize],
    ) -> Self {
        let mut is_locked = vec![false; entries.len()];
        for &i in locked {
            is_locked[i] = true;
        }

        let mut seen_before = Vec::with_capacity(entries.len() + 1);
        let mut running = [0usize; 4];
        let mut value_prefix: [Vec<f64>; 4] = Default::default();
        let mut prices: [Vec<f64>; 4] = Default::default();
        for prefix in &mut value_prefix {
            prefix.push(0.0);
        }
        for (i, entry) in entries.iter().enumerate() {
            seen_before.push(running);
            if is_locked[i] {
                continue;
            }
            let p = entry.position();
            running[p] += 1;
            let last = value_prefix[p].last().copied().unwrap_or(0.0);
            value_prefix[p].push(last + entry.value);
            prices[p].push(entry.player.price);
        }
        seen_before.push(running);

        let cheapest_prefix = prices.map(|mut list| {
            list.sort_by(f64::total_cmp);
            let mut prefix = Vec::with_capacity(list.len() + 1);
            prefix.push(0.0);
            for price in list {
                let last = prefix.last().copied().unwrap_or(0.0);
                prefix.push(last + price);
            }
            prefix
        });

        let mut search = Self {
            entries,
            constraints,
            required: constraints.formation.as_array(),
            node_limit,
            nodes: 0,
            seen_before,
            per_position: running,
            value_prefix,
            cheapest_prefix,
            locked: is_locked,
            chosen: Vec::new(),
            counts: [0; 4],
            clubs: HashMap::new(),
            spent: 0.0,
            value: 0.0,
            best: None,
        };
        for &i in locked {
            search.include(i);
        }
        search
    }

    fn club_count(&self, entry: &Entry) -> usize {
        self.clubs.get(entry.player.club.as_str()).copied().unwrap_or(0)
    }

    fn can_include(&self, i: usize) -> bool {
        let entry = &self.entries[i];
        let p = entry.position();
        self.counts[p] < self.required[p]
            && self.club_count(entry) < self.constraints.max_per_club
            && self.spent + entry.player.price <= self.constraints.budget + BUDGET_EPSILON
    }

    fn include(&mut self, i: usize) {
        let entries = self.entries;
        let entry = &entries[i];
        self.counts[entry.position()] += 1;
        *self.clubs.entry(entry.player.club.as_str()).or_default() += 1;
        self.spent += entry.player.price;
        self.value += entry.value;
        self.chosen.push(i);
    }

    fn exclude_last(&mut self) {
        if let Some(i) = self.chosen.pop() {
            let entries = self.entries;
            let entry = &entries[i];
            self.counts[entry.position()] -= 1;
            if let Some(count) = self.clubs.get_mut(entry.player.club.as_str()) {
                *count -= 1;
            }
            self.spent -= entry.player.price;
            self.value -= entry.value;
        }
    }

    fn is_complete(&self) -> bool {
        self.counts == self.required
    }

    fn offer(&mut self) {
        let improves = self
            .best
            .as_ref()
            .map_or(true, |(best, _)| self.value > best + VALUE_EPSILON);
        if improves {
            let mut chosen = self.chosen.clone();
            chosen.sort_unstable();
            self.best = Some((self.value, chosen));
        }
    }

    /// Best-value-first pass. Each pick is kept only if the open slots can
    /// still be filled from later entries, so the pass reaches a full squad
    /// whenever one exists.
    fn seed_greedy(&mut self) {
        let base = self.chosen.len();
        for i in 0..self.entries.len() {
            if self.is_complete() {
                break;
            }
            if self.locked[i] || !self.can_include(i) {
                continue;
            }
            self.include(i);
            if !self.can_complete(i + 1) {
                self.exclude_last();
            }
        }
        if self.is_complete() {
            self.offer();
        }
        while self.chosen.len() > base {
            self.exclude_last();
        }
    }

    fn can_complete(&self, from: usize) -> bool {
        let limit = self.constraints.budget + BUDGET_EPSILON;
        // Club-blind bound first; the flow is only needed when it passes.
        self.spent + self.completion_cost(from) <= limit
            && self
                .cheapest_completion(from)
                .is_some_and(|cost| self.spent + cost <= limit)
    }

    /// Cheapest way to fill the open slots from entries at or after `from`,
    /// honouring the club cap. `None` when the slots cannot be filled.
    ///
    /// Min-cost flow: source -> position (open slots) -> club (one unit per
    /// candidate, priced) -> sink (remaining club allowance). Successive
    /// shortest paths with Bellman-Ford; the graph has 4 + clubs nodes.
    fn cheapest_completion(&self, from: usize) -> Option<f64> {
        let need: [usize; 4] = std::array::from_fn(|p| self.required[p] - self.counts[p]);
        let total: usize = need.iter().sum();
        if total == 0 {
            return Some(0.0);
        }

        let mut club_index: HashMap<&str, usize> = HashMap::new();
        let mut allowance: Vec<usize> = Vec::new();
        // Per club, per position: candidate prices ascending.
        let mut lanes: Vec<[Vec<f64>; 4]> = Vec::new();
        for (offset, entry) in self.entries[from..].iter().enumerate() {
            let p = entry.position();
            if need[p] == 0 || self.locked[from + offset] {
                continue;
            }
            let club = entry.player.club.as_str();
            let c = match club_index.get(club) {
                Some(&c) => c,
                None => {
                    let used = self.clubs.get(club).copied().unwrap_or(0);
                    allowance.push(self.constraints.max_per_club.saturating_sub(used));
                    lanes.push(Default::default());
                    club_index.insert(club, lanes.len() - 1);
                    lanes.len() - 1
                }
            };
            lanes[c][p].push(entry.player.price);
        }
        for lane in &mut lanes {
            for prices in lane.iter_mut() {
                prices.sort_by(f64::total_cmp);
            }
        }

        let clubs = lanes.len();
        let sink = 5 + clubs;
        let mut position_flow = [0usize; 4];
        let mut club_flow = vec![0usize; clubs];
        let mut lane_flow = vec![[0usize; 4]; clubs];
        let mut cost = 0.0;

        for _ in 0..total {
            // Nodes: 0 source, 1..=4 positions, 5.. clubs, then sink.
            let mut dist = vec![f64::INFINITY; sink + 1];
            let mut pred = vec![usize::MAX; sink + 1];
            dist[0] = 0.0;
            for _ in 0..=sink {
                let mut changed = false;
                let mut relax = |from: usize, to: usize, weight: f64, dist: &mut [f64]| {
                    if dist[from] + weight < dist[to] - VALUE_EPSILON {
                        dist[to] = dist[from] + weight;
                        pred[to] = from;
                        changed = true;
                    }
                };
                for p in 0..4 {
                    if position_flow[p] < need[p] {
                        relax(0, 1 + p, 0.0, &mut dist);
                    }
                }
                for c in 0..clubs {
                    for p in 0..4 {
                        let used = lane_flow[c][p];
                        if let Some(&price) = lanes[c][p].get(used) {
                            relax(1 + p, 5 + c, price, &mut dist);
                        }
                        if used > 0 {
                            relax(5 + c, 1 + p, -lanes[c][p][used - 1], &mut dist);
                        }
                    }
                    if club_flow[c] < allowance[c] {
                        relax(5 + c, sink, 0.0, &mut dist);
                    }
                }
                if !changed {
                    break;
                }
            }
            if !dist[sink].is_finite() {
                return None;
            }
            cost += dist[sink];

            let mut node = sink;
            while node != 0 {
                let prev = pred[node];
                match (prev, node) {
                    (0, p) => position_flow[p - 1] += 1,
                    (c, n) if n == sink => club_flow[c - 5] += 1,
                    (p, c) if p <= 4 => lane_flow[c - 5][p - 1] += 1,
                    (c, p) => lane_flow[c - 5][p - 1] -= 1,
                }
                node = prev;
            }
        }
        Some(cost)
    }

    /// Cheapest way to fill the remaining slots from entries at or after
    /// `from`, ignoring the club cap.
    fn completion_cost(&self, from: usize) -> f64 {
        let mut cost = 0.0;
        for p in 0..4 {
            let need = self.required[p] - self.counts[p];
            if need == 0 {
                continue;
            }
            let mut prices: Vec<f64> = self.entries[from..]
                .iter()
                .enumerate()
                .filter(|(offset, e)| e.position() == p && !self.locked[from + offset])
                .map(|(_, e)| e.player.price)
                .collect();
            if prices.len() < need {
                return f64::INFINITY;
            }
            prices.sort_by(f64::total_cmp);
            cost += prices[..need].iter().sum::<f64>();
        }
        cost
    }

    fn run(&mut self) {
        self.descend(0);
    }

    fn descend(&mut self, i: usize) {
        if self.nodes >= self.node_limit {
            return;
        }
        self.nodes += 1;

        if self.is_complete() {
            self.offer();
            return;
        }
        if i >= self.entries.len() {
            return;
        }

        let before = self.seen_before[i];
        let mut bound = self.value;
        let mut min_cost = self.spent;
        for p in 0..4 {
            let need = self.required[p] - self.counts[p];
            let remaining = self.per_position[p] - before[p];
            if need > remaining {
                return;
            }
            bound += self.value_prefix[p][before[p] + need] - self.value_prefix[p][before[p]];
            min_cost += self.cheapest_prefix[p][need];
        }
        if min_cost > self.constraints.budget + BUDGET_EPSILON {
            return;
        }
        if let Some((best, _)) = &self.best {
            if bound <= best + VALUE_EPSILON {
                return;
            }
        }

        if self.locked[i] {
            self.descend(i + 1);
            return;
        }
        if self.can_include(i) {
            self.include(i);
            self.descend(i + 1);
            self.exclude_last();
        }
        self.descend(i + 1);
    }
}
