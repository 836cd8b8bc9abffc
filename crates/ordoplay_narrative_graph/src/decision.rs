// SPDX-License-Identifier: MIT OR Apache-2.0
//! Decision point data: candidates, strategy reference and selection record.
//!
//! The decision point only stores authored and recorded state. Running a
//! strategy against it is the sequencer's job.

use crate::constraint::Constraint;
use crate::node::NarrativeObjectId;
use crate::variable::VariableValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of most recent selections a [`SelectionRecord`] keeps in order
pub const RECENT_SELECTIONS: usize = 64;

/// Reference to a pluggable strategy by registry name, with typed parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRef {
    /// Registry name (e.g. "First", "Random", "HasPlayedAll")
    pub name: String,
    /// Strategy parameters
    #[serde(default)]
    pub params: IndexMap<String, VariableValue>,
}

impl StrategyRef {
    /// Reference a strategy by name with no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: IndexMap::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The "First" selection strategy
    pub fn first() -> Self {
        Self::new("First")
    }

    /// The "Random" selection strategy
    pub fn random() -> Self {
        Self::new("Random")
    }

    /// The "All" selection strategy
    pub fn all() -> Self {
        Self::new("All")
    }

    /// Get a float parameter (integers widen)
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(VariableValue::as_float)
    }

    /// Get a non-negative integer parameter
    pub fn param_usize(&self, key: &str) -> Option<usize> {
        self.params
            .get(key)
            .and_then(VariableValue::as_int)
            .and_then(|v| usize::try_from(v).ok())
    }

    /// Get a bool parameter
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(VariableValue::as_bool)
    }
}

impl Default for StrategyRef {
    fn default() -> Self {
        Self::first()
    }
}

/// Processing state of a decision point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionState {
    /// Not processing
    #[default]
    Idle,
    /// Strategy is running
    Selecting,
    /// Strategy produced a selection
    Selected,
    /// Finished without a selection
    Terminated,
}

/// Which decision point of a node is meant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionRef {
    /// The node's output selection
    Output(NarrativeObjectId),
    /// A group node's child selection
    Group(NarrativeObjectId),
    /// A layer node's layer selection
    Layer(NarrativeObjectId),
}

impl DecisionRef {
    /// The node owning the decision point
    pub fn node(&self) -> NarrativeObjectId {
        match self {
            Self::Output(id) | Self::Group(id) | Self::Layer(id) => *id,
        }
    }

    /// Short label for diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Output(_) => "output selection",
            Self::Group(_) => "group selection",
            Self::Layer(_) => "layer selection",
        }
    }
}

/// Candidate list edit, raised for external views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateChange<C> {
    /// Candidate appended
    Added(C),
    /// Candidate removed
    Removed(C),
}

/// What a decision point has selected so far.
///
/// Per-candidate counts and the total are exact; the ordered list keeps
/// only the last [`RECENT_SELECTIONS`] picks, so a decision point on a
/// looping path stays bounded however long playback runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord<C> {
    counts: Vec<(C, usize)>,
    total: usize,
    recent: VecDeque<C>,
}

impl<C> Default for SelectionRecord<C> {
    fn default() -> Self {
        Self {
            counts: Vec::new(),
            total: 0,
            recent: VecDeque::new(),
        }
    }
}

impl<C: Copy + PartialEq> SelectionRecord<C> {
    /// Record one selection
    pub fn record(&mut self, candidate: C) {
        match self.counts.iter_mut().find(|(c, _)| *c == candidate) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((candidate, 1)),
        }
        self.total += 1;
        if self.recent.len() == RECENT_SELECTIONS {
            self.recent.pop_front();
        }
        self.recent.push_back(candidate);
    }

    /// How many times a candidate has been selected
    pub fn times_selected(&self, candidate: C) -> usize {
        self.counts
            .iter()
            .find(|(c, _)| *c == candidate)
            .map_or(0, |(_, count)| *count)
    }

    /// Total selections recorded
    pub fn total(&self) -> usize {
        self.total
    }

    /// Most recent selections, oldest first
    pub fn recent(&self) -> impl Iterator<Item = C> + '_ {
        self.recent.iter().copied()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
        self.recent.clear();
    }
}

/// Candidates plus the strategy that picks among them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPoint<C = NarrativeObjectId> {
    /// Display name, used in diagnostics
    pub name: String,
    /// Ordered candidates; order matters for "First"
    candidates: Vec<C>,
    /// Constraints every selected candidate must satisfy
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Strategy resolving this decision point
    #[serde(default)]
    pub strategy: StrategyRef,
    /// Selections made so far
    #[serde(default)]
    selections: SelectionRecord<C>,
    #[serde(skip)]
    state: DecisionState,
    #[serde(skip)]
    pending_changes: Vec<CandidateChange<C>>,
}

impl<C: Copy + PartialEq> DecisionPoint<C> {
    /// Create an empty decision point
    pub fn new(name: impl Into<String>, strategy: StrategyRef) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
            constraints: Vec::new(),
            strategy,
            selections: SelectionRecord::default(),
            state: DecisionState::Idle,
            pending_changes: Vec::new(),
        }
    }

    /// Append a candidate. Returns false if it was already present.
    pub fn add_candidate(&mut self, candidate: C) -> bool {
        if self.candidates.contains(&candidate) {
            return false;
        }
        self.candidates.push(candidate);
        self.pending_changes.push(CandidateChange::Added(candidate));
        true
    }

    /// Remove a candidate. Returns false if it was not present.
    pub fn remove_candidate(&mut self, candidate: C) -> bool {
        let Some(index) = self.candidates.iter().position(|c| *c == candidate) else {
            return false;
        };
        self.candidates.remove(index);
        self.pending_changes.push(CandidateChange::Removed(candidate));
        true
    }

    /// Get all candidates in order
    pub fn candidates(&self) -> &[C] {
        &self.candidates
    }

    /// Get a candidate by position
    pub fn candidate(&self, position: usize) -> Option<C> {
        self.candidates.get(position).copied()
    }

    /// Whether a candidate is present
    pub fn has_candidate(&self, candidate: C) -> bool {
        self.candidates.contains(&candidate)
    }

    /// Most recent selections, oldest first
    pub fn history(&self) -> impl Iterator<Item = C> + '_ {
        self.selections.recent()
    }

    /// Everything selected so far
    pub fn selections(&self) -> &SelectionRecord<C> {
        &self.selections
    }

    /// Total selections made
    pub fn selection_count(&self) -> usize {
        self.selections.total()
    }

    /// Record a selection
    pub fn record_selection(&mut self, candidate: C) {
        self.selections.record(candidate);
    }

    /// Forget all previous selections
    pub fn clear_history(&mut self) {
        self.selections.clear();
    }

    /// Replace the selection record (used when resuming)
    pub fn restore_selections(&mut self, selections: SelectionRecord<C>) {
        self.selections = selections;
    }

    /// How many times a candidate has been selected
    pub fn times_selected(&self, candidate: C) -> usize {
        self.selections.times_selected(candidate)
    }

    /// Current processing state
    pub fn state(&self) -> DecisionState {
        self.state
    }

    /// Set the processing state
    pub fn set_state(&mut self, state: DecisionState) {
        self.state = state;
    }

    /// Drain candidate change notifications
    pub fn take_changes(&mut self) -> Vec<CandidateChange<C>> {
        std::mem::take(&mut self.pending_changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_edits_notify() {
        let a = NarrativeObjectId::new();
        let b = NarrativeObjectId::new();
        let mut decision = DecisionPoint::new("next", StrategyRef::first());

        assert!(decision.add_candidate(a));
        assert!(decision.add_candidate(b));
        assert!(!decision.add_candidate(a));
        assert!(decision.remove_candidate(a));
        assert!(!decision.remove_candidate(a));

        assert_eq!(decision.candidates(), &[b]);
        assert_eq!(
            decision.take_changes(),
            vec![
                CandidateChange::Added(a),
                CandidateChange::Added(b),
                CandidateChange::Removed(a),
            ]
        );
    }

    #[test]
    fn test_history_counts() {
        let a = NarrativeObjectId::new();
        let b = NarrativeObjectId::new();
        let mut decision = DecisionPoint::new("group", StrategyRef::random());
        decision.record_selection(a);
        decision.record_selection(b);
        decision.record_selection(a);

        assert_eq!(decision.times_selected(a), 2);
        assert_eq!(decision.times_selected(b), 1);
        assert_eq!(decision.selection_count(), 3);
        assert_eq!(decision.history().collect::<Vec<_>>(), vec![a, b, a]);
        decision.clear_history();
        assert_eq!(decision.history().count(), 0);
        assert_eq!(decision.times_selected(a), 0);
    }

    #[test]
    fn test_selection_record_stays_bounded() {
        let a = NarrativeObjectId::new();
        let b = NarrativeObjectId::new();
        let mut record = SelectionRecord::default();
        for _ in 0..1000 {
            record.record(a);
        }
        record.record(b);

        assert_eq!(record.total(), 1001);
        assert_eq!(record.times_selected(a), 1000);
        assert_eq!(record.times_selected(b), 1);
        assert_eq!(record.recent().count(), RECENT_SELECTIONS);
        assert_eq!(record.recent().last(), Some(b));
        assert_eq!(record.counts.len(), 2);
    }

    #[test]
    fn test_strategy_params() {
        let strategy = StrategyRef::new("WaitThenSelect")
            .with_param("seconds", 2_i64)
            .with_param("count", 3_i64);

        assert_eq!(strategy.param_f64("seconds"), Some(2.0));
        assert_eq!(strategy.param_usize("count"), Some(3));
        assert_eq!(strategy.param_bool("missing"), None);
    }
}
