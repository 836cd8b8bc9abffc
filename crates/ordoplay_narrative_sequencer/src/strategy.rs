// SPDX-License-Identifier: MIT OR Apache-2.0
//! Selection and termination strategies.
//!
//! Decision points name their strategy; the [`StrategyRegistry`] resolves
//! the name at run time. Selection strategies return candidate positions so
//! the same strategy serves node and layer-definition decisions alike.
//!
//! Built-in selection strategies:
//! - `First`: first valid candidate
//! - `Random`: one valid candidate, uniformly
//! - `Select`: least-selected valid candidate, ties by order
//! - `SelectUnique`: first valid candidate never selected before
//! - `WaitThenSelect`: waits until `seconds` before the layer end, then `First`
//! - `All`: every valid candidate
//!
//! Built-in termination strategies:
//! - `HasPlayedAll`: every candidate selected at least once
//! - `Count`: `count` selections made
//! - `PlayCount`: every candidate selected at least `count` times
//! - `Never`: loop until no progress

use crate::error::Result;
use crate::layer::LayerId;
use crate::process::Runtime;
use crate::task::yield_now;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use indexmap::IndexMap;
use ordoplay_narrative_graph::{
    Candidate, DecisionPoint, DecisionRef, LayerDefinitionId, NarrativeObjectId, NarrativeSpace,
    SequenceHistory, Solver, StrategyRef,
};
use rand::Rng;
use std::rc::Rc;

/// Future returned by a selection strategy
pub type SelectionFuture = LocalBoxFuture<'static, Result<Vec<usize>>>;

/// A candidate as seen by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateEntry {
    /// Position in the decision point's candidate list
    pub position: usize,
    /// How often it has been selected
    pub times_selected: usize,
}

/// Read access to a running decision for strategies
pub struct SelectionContext {
    runtime: Runtime,
    decision: DecisionRef,
    layer: LayerId,
    strategy: StrategyRef,
}

impl SelectionContext {
    pub(crate) fn new(runtime: Runtime, decision: DecisionRef, layer: LayerId, strategy: StrategyRef) -> Self {
        Self {
            runtime,
            decision,
            layer,
            strategy,
        }
    }

    /// The decision point being resolved
    pub fn decision(&self) -> DecisionRef {
        self.decision
    }

    /// Layer the decision runs on
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Strategy reference with its parameters
    pub fn params(&self) -> &StrategyRef {
        &self.strategy
    }

    /// Current playhead
    pub fn playhead(&self) -> f64 {
        self.runtime.timeline.borrow().playhead()
    }

    /// Effective end time of the decision's layer
    pub fn layer_end_time(&self) -> f64 {
        self.runtime.timeline.borrow().end_time(self.layer)
    }

    /// Every candidate, in order
    pub fn candidates(&self) -> Vec<CandidateEntry> {
        self.entries(false)
    }

    /// Candidates passing the constraint solver, in order
    pub fn valid_candidates(&self) -> Vec<CandidateEntry> {
        self.entries(true)
    }

    /// Number of selections recorded on the decision point
    pub fn selection_count(&self) -> usize {
        let space = self.runtime.space.borrow();
        match self.decision {
            DecisionRef::Layer(_) => {
                LayerDefinitionId::decision_point(&space, self.decision).map_or(0, DecisionPoint::selection_count)
            }
            DecisionRef::Output(_) | DecisionRef::Group(_) => {
                NarrativeObjectId::decision_point(&space, self.decision).map_or(0, DecisionPoint::selection_count)
            }
        }
    }

    /// Uniform random index below `len`, from the sequencer's generator
    pub fn random_index(&self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.runtime.rng.borrow_mut().gen_range(0..len))
    }

    fn entries(&self, valid_only: bool) -> Vec<CandidateEntry> {
        let space = self.runtime.space.borrow();
        let timeline = self.runtime.timeline.borrow();
        match self.decision {
            DecisionRef::Layer(_) => {
                entries::<LayerDefinitionId>(&space, &*timeline, self.decision, valid_only)
            }
            DecisionRef::Output(_) | DecisionRef::Group(_) => {
                entries::<NarrativeObjectId>(&space, &*timeline, self.decision, valid_only)
            }
        }
    }
}

fn entries<C: Candidate>(
    space: &NarrativeSpace,
    history: &dyn SequenceHistory,
    at: DecisionRef,
    valid_only: bool,
) -> Vec<CandidateEntry> {
    let Some(decision) = C::decision_point(space, at) else {
        return Vec::new();
    };
    let positions: Vec<usize> = if valid_only {
        Solver::solve_positions(space, history, decision.candidates(), &decision.constraints)
    } else {
        (0..decision.candidates().len()).collect()
    };
    positions
        .into_iter()
        .filter_map(|position| {
            decision.candidate(position).map(|candidate| CandidateEntry {
                position,
                times_selected: decision.times_selected(candidate),
            })
        })
        .collect()
}

/// Picks among the candidates of a decision point.
/// An empty result means no selection.
pub trait SelectionStrategy {
    /// Run the strategy; it may suspend across ticks
    fn select(&self, ctx: SelectionContext) -> SelectionFuture;
}

/// Decides when a group's selection loop ends
pub trait TerminationStrategy {
    /// Whether the loop should stop before the next selection
    fn should_terminate(&self, ctx: &SelectionContext) -> bool;
}

fn ready(positions: Vec<usize>) -> SelectionFuture {
    future::ready(Ok(positions)).boxed_local()
}

/// First valid candidate
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstStrategy;

impl SelectionStrategy for FirstStrategy {
    fn select(&self, ctx: SelectionContext) -> SelectionFuture {
        ready(ctx.valid_candidates().first().map(|c| c.position).into_iter().collect())
    }
}

/// One valid candidate, uniformly at random
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStrategy;

impl SelectionStrategy for RandomStrategy {
    fn select(&self, ctx: SelectionContext) -> SelectionFuture {
        let valid = ctx.valid_candidates();
        let picked = ctx.random_index(valid.len()).map(|i| valid[i].position);
        ready(picked.into_iter().collect())
    }
}

/// Least-selected valid candidate; ties go to the earliest
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectStrategy;

impl SelectionStrategy for SelectStrategy {
    fn select(&self, ctx: SelectionContext) -> SelectionFuture {
        let picked = ctx
            .valid_candidates()
            .into_iter()
            .min_by_key(|c| c.times_selected)
            .map(|c| c.position);
        ready(picked.into_iter().collect())
    }
}

/// First valid candidate that has never been selected
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectUniqueStrategy;

impl SelectionStrategy for SelectUniqueStrategy {
    fn select(&self, ctx: SelectionContext) -> SelectionFuture {
        let picked = ctx
            .valid_candidates()
            .into_iter()
            .find(|c| c.times_selected == 0)
            .map(|c| c.position);
        ready(picked.into_iter().collect())
    }
}

/// Waits until the playhead is within `seconds` of the layer end, then
/// picks the first candidate valid at that moment
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitThenSelectStrategy;

impl SelectionStrategy for WaitThenSelectStrategy {
    fn select(&self, ctx: SelectionContext) -> SelectionFuture {
        async move {
            let lead = ctx.params().param_f64("seconds").unwrap_or(0.0);
            while ctx.playhead() < ctx.layer_end_time() - lead {
                yield_now().await;
            }
            Ok(ctx.valid_candidates().first().map(|c| c.position).into_iter().collect())
        }
        .boxed_local()
    }
}

/// Every valid candidate, in order
#[derive(Debug, Default, Clone, Copy)]
pub struct AllStrategy;

impl SelectionStrategy for AllStrategy {
    fn select(&self, ctx: SelectionContext) -> SelectionFuture {
        ready(ctx.valid_candidates().into_iter().map(|c| c.position).collect())
    }
}

/// Stop once every candidate has been selected
#[derive(Debug, Default, Clone, Copy)]
pub struct HasPlayedAllTermination;

impl TerminationStrategy for HasPlayedAllTermination {
    fn should_terminate(&self, ctx: &SelectionContext) -> bool {
        ctx.candidates().iter().all(|c| c.times_selected > 0)
    }
}

/// Stop after `count` selections (default 1)
#[derive(Debug, Default, Clone, Copy)]
pub struct CountTermination;

impl TerminationStrategy for CountTermination {
    fn should_terminate(&self, ctx: &SelectionContext) -> bool {
        ctx.selection_count() >= ctx.params().param_usize("count").unwrap_or(1)
    }
}

/// Stop once every candidate has been selected `count` times (default 1)
#[derive(Debug, Default, Clone, Copy)]
pub struct PlayCountTermination;

impl TerminationStrategy for PlayCountTermination {
    fn should_terminate(&self, ctx: &SelectionContext) -> bool {
        let count = ctx.params().param_usize("count").unwrap_or(1);
        ctx.candidates().iter().all(|c| c.times_selected >= count)
    }
}

/// Never stop; the loop ends only when selection makes no progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverTermination;

impl TerminationStrategy for NeverTermination {
    fn should_terminate(&self, _ctx: &SelectionContext) -> bool {
        false
    }
}

/// Strategies by registry name
#[derive(Clone)]
pub struct StrategyRegistry {
    selection: IndexMap<String, Rc<dyn SelectionStrategy>>,
    termination: IndexMap<String, Rc<dyn TerminationStrategy>>,
}

impl StrategyRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            selection: IndexMap::new(),
            termination: IndexMap::new(),
        }
    }

    /// Create a registry holding the built-in strategies
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_selection("First", FirstStrategy);
        registry.register_selection("Random", RandomStrategy);
        registry.register_selection("Select", SelectStrategy);
        registry.register_selection("SelectUnique", SelectUniqueStrategy);
        registry.register_selection("WaitThenSelect", WaitThenSelectStrategy);
        registry.register_selection("All", AllStrategy);
        registry.register_termination("HasPlayedAll", HasPlayedAllTermination);
        registry.register_termination("Count", CountTermination);
        registry.register_termination("PlayCount", PlayCountTermination);
        registry.register_termination("Never", NeverTermination);
        registry
    }

    /// Register a selection strategy, replacing any with the same name
    pub fn register_selection(&mut self, name: impl Into<String>, strategy: impl SelectionStrategy + 'static) {
        self.selection.insert(name.into(), Rc::new(strategy));
    }

    /// Register a termination strategy, replacing any with the same name
    pub fn register_termination(
        &mut self,
        name: impl Into<String>,
        strategy: impl TerminationStrategy + 'static,
    ) {
        self.termination.insert(name.into(), Rc::new(strategy));
    }

    /// Get a selection strategy by name
    pub fn selection(&self, name: &str) -> Option<Rc<dyn SelectionStrategy>> {
        self.selection.get(name).cloned()
    }

    /// Get a termination strategy by name
    pub fn termination(&self, name: &str) -> Option<Rc<dyn TerminationStrategy>> {
        self.termination.get(name).cloned()
    }

    /// Strategy references in the space that this registry cannot resolve,
    /// as `(decision point, strategy name)` pairs
    pub fn unresolved(&self, space: &NarrativeSpace) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        let mut check_selection = |decision: &str, strategy: &StrategyRef| {
            if !self.selection.contains_key(&strategy.name) {
                missing.push((decision.to_string(), strategy.name.clone()));
            }
        };
        for node in space.nodes() {
            check_selection(&node.output_selection.name, &node.output_selection.strategy);
            if let Some(group) = node.group_selection() {
                check_selection(&group.selection.name, &group.selection.strategy);
            }
            if let Some(layer) = node.layer_selection() {
                check_selection(&layer.selection.name, &layer.selection.strategy);
            }
        }
        for node in space.nodes() {
            if let Some(group) = node.group_selection() {
                if !self.termination.contains_key(&group.termination.name) {
                    missing.push((group.selection.name.clone(), group.termination.name.clone()));
                }
            }
        }
        missing
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("selection", &self.selection.keys().collect::<Vec<_>>())
            .field("termination", &self.termination.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordoplay_narrative_graph::{MediaReference, NarrativeObject};

    #[test]
    fn test_builtins_registered() {
        let registry = StrategyRegistry::with_builtins();
        for name in ["First", "Random", "Select", "SelectUnique", "WaitThenSelect", "All"] {
            assert!(registry.selection(name).is_some(), "{name}");
        }
        for name in ["HasPlayedAll", "Count", "PlayCount", "Never"] {
            assert!(registry.termination(name).is_some(), "{name}");
        }
        assert!(StrategyRegistry::new().selection("First").is_none());
    }

    #[test]
    fn test_unresolved_references() {
        let mut space = NarrativeSpace::new("test");
        let a = space.add_node(
            NarrativeObject::atomic("a", MediaReference::video("a"), 1.0)
                .with_output_strategy(StrategyRef::new("Shuffle")),
        );
        let group = space.add_node(NarrativeObject::group(
            "loop",
            StrategyRef::random(),
            StrategyRef::new("UntilBored"),
        ));
        space.add_group_child(group, a).unwrap();

        let unresolved = StrategyRegistry::with_builtins().unresolved(&space);
        let names: Vec<&str> = unresolved.iter().map(|(_, s)| s.as_str()).collect();
        assert_eq!(names, vec!["Shuffle", "UntilBored"]);
    }
}
