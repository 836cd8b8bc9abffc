// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constraint solver filtering decision-point candidates.

use crate::constraint::{Constraint, EvaluationContext, SequenceHistory};
use crate::decision::{DecisionPoint, DecisionRef};
use crate::layer_definition::LayerDefinitionId;
use crate::node::NarrativeObjectId;
use crate::space::NarrativeSpace;
use std::fmt::Debug;
use std::hash::Hash;

/// Something a decision point can choose
pub trait Candidate: Copy + Eq + Hash + Debug {
    /// The candidate's own constraints, or `None` if it does not exist
    fn constraints<'a>(&self, space: &'a NarrativeSpace) -> Option<&'a [Constraint]>;

    /// Node whose local variables back local-scope lookups
    fn subject(&self, space: &NarrativeSpace) -> Option<NarrativeObjectId>;

    /// Resolve a decision point holding this candidate type
    fn decision_point<'a>(
        space: &'a NarrativeSpace,
        at: DecisionRef,
    ) -> Option<&'a DecisionPoint<Self>>;

    /// Resolve a decision point holding this candidate type, mutably
    fn decision_point_mut<'a>(
        space: &'a mut NarrativeSpace,
        at: DecisionRef,
    ) -> Option<&'a mut DecisionPoint<Self>>;
}

impl Candidate for NarrativeObjectId {
    fn constraints<'a>(&self, space: &'a NarrativeSpace) -> Option<&'a [Constraint]> {
        space.node(*self).map(|node| node.constraints.as_slice())
    }

    fn subject(&self, _space: &NarrativeSpace) -> Option<NarrativeObjectId> {
        Some(*self)
    }

    fn decision_point<'a>(
        space: &'a NarrativeSpace,
        at: DecisionRef,
    ) -> Option<&'a DecisionPoint<Self>> {
        match at {
            DecisionRef::Output(id) => space.node(id).map(|node| &node.output_selection),
            DecisionRef::Group(id) => space
                .node(id)
                .and_then(|node| node.group_selection())
                .map(|group| &group.selection),
            DecisionRef::Layer(_) => None,
        }
    }

    fn decision_point_mut<'a>(
        space: &'a mut NarrativeSpace,
        at: DecisionRef,
    ) -> Option<&'a mut DecisionPoint<Self>> {
        match at {
            DecisionRef::Output(id) => space.node_mut(id).map(|node| &mut node.output_selection),
            DecisionRef::Group(id) => space
                .node_mut(id)
                .and_then(|node| node.group_selection_mut())
                .map(|group| &mut group.selection),
            DecisionRef::Layer(_) => None,
        }
    }
}

impl Candidate for LayerDefinitionId {
    fn constraints<'a>(&self, space: &'a NarrativeSpace) -> Option<&'a [Constraint]> {
        space
            .layer_definition(*self)
            .map(|definition| definition.constraints.as_slice())
    }

    fn subject(&self, space: &NarrativeSpace) -> Option<NarrativeObjectId> {
        space.layer_definition(*self).and_then(|definition| definition.root)
    }

    fn decision_point<'a>(
        space: &'a NarrativeSpace,
        at: DecisionRef,
    ) -> Option<&'a DecisionPoint<Self>> {
        match at {
            DecisionRef::Layer(id) => space
                .node(id)
                .and_then(|node| node.layer_selection())
                .map(|layer| &layer.selection),
            DecisionRef::Output(_) | DecisionRef::Group(_) => None,
        }
    }

    fn decision_point_mut<'a>(
        space: &'a mut NarrativeSpace,
        at: DecisionRef,
    ) -> Option<&'a mut DecisionPoint<Self>> {
        match at {
            DecisionRef::Layer(id) => space
                .node_mut(id)
                .and_then(|node| node.layer_selection_mut())
                .map(|layer| &mut layer.selection),
            DecisionRef::Output(_) | DecisionRef::Group(_) => None,
        }
    }
}

/// Filters candidates by the decision point's constraints and their own
pub struct Solver;

impl Solver {
    /// Whether a candidate passes the decision constraints and its own.
    /// Missing candidates never pass.
    pub fn admits<C: Candidate>(
        space: &NarrativeSpace,
        history: &dyn SequenceHistory,
        candidate: C,
        constraints: &[Constraint],
    ) -> bool {
        let Some(own) = candidate.constraints(space) else {
            tracing::warn!(candidate = ?candidate, "Candidate does not exist in the narrative space");
            return false;
        };
        let ctx = EvaluationContext::new(space, history, candidate.subject(space));
        constraints.iter().all(|c| c.evaluate(&ctx)) && own.iter().all(|c| c.evaluate(&ctx))
    }

    /// Positions of the candidates that pass, in original order
    pub fn solve_positions<C: Candidate>(
        space: &NarrativeSpace,
        history: &dyn SequenceHistory,
        candidates: &[C],
        constraints: &[Constraint],
    ) -> Vec<usize> {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, candidate)| Self::admits(space, history, **candidate, constraints))
            .map(|(position, _)| position)
            .collect()
    }

    /// The candidates that pass, in original order
    pub fn solve<C: Candidate>(
        space: &NarrativeSpace,
        history: &dyn SequenceHistory,
        candidates: &[C],
        constraints: &[Constraint],
    ) -> Vec<C> {
        Self::solve_positions(space, history, candidates, constraints)
            .into_iter()
            .map(|position| candidates[position])
            .collect()
    }

    /// Solve a decision point in place. Returns `None` if it does not exist.
    pub fn solve_decision<C: Candidate>(
        space: &NarrativeSpace,
        history: &dyn SequenceHistory,
        at: DecisionRef,
    ) -> Option<Vec<usize>> {
        let decision = C::decision_point(space, at)?;
        Some(Self::solve_positions(
            space,
            history,
            decision.candidates(),
            &decision.constraints,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{OrderingOperator, SequenceOperator, VariableRef};
    use crate::node::{MediaReference, NarrativeObject};
    use crate::variable::Variable;
    use std::collections::HashSet;

    #[test]
    fn test_solve_keeps_order_and_applies_both_constraint_sets() {
        let mut space = NarrativeSpace::new("test");
        space.globals_mut().add_variable(Variable::new("day", 3_i64));

        let a = space.add_node(
            NarrativeObject::atomic("a", MediaReference::video("a"), 1.0)
                .with_variable(Variable::new("level", 1_i64)),
        );
        let b = space.add_node(
            NarrativeObject::atomic("b", MediaReference::video("b"), 1.0)
                .with_variable(Variable::new("level", 5_i64)),
        );
        // c vetoes itself whatever the decision point wants
        let c = space.add_node(
            NarrativeObject::atomic("c", MediaReference::video("c"), 1.0)
                .with_variable(Variable::new("level", 9_i64))
                .with_constraint(Constraint::int(VariableRef::global("day"), OrderingOperator::GreaterThan, 5)),
        );
        let d = space.add_node(
            NarrativeObject::atomic("d", MediaReference::video("d"), 1.0)
                .with_variable(Variable::new("level", 7_i64)),
        );

        let history: HashSet<NarrativeObjectId> = HashSet::new();
        let decision_constraints =
            vec![Constraint::int(VariableRef::local("level"), OrderingOperator::GreaterOrEqual, 2)];

        let solved = Solver::solve(&space, &history, &[d, c, b, a], &decision_constraints);
        assert_eq!(solved, vec![d, b]);
    }

    #[test]
    fn test_missing_candidate_is_removed() {
        let mut space = NarrativeSpace::new("test");
        let a = space.add_node(NarrativeObject::atomic("a", MediaReference::video("a"), 1.0));
        let ghost = NarrativeObjectId::new();
        let history: HashSet<NarrativeObjectId> = HashSet::new();

        assert_eq!(Solver::solve_positions(&space, &history, &[ghost, a], &[]), vec![1]);
    }

    #[test]
    fn test_solve_decision_uses_history() {
        let mut space = NarrativeSpace::new("test");
        let intro = space.add_node(NarrativeObject::atomic("intro", MediaReference::video("i"), 1.0));
        let reprise = space.add_node(
            NarrativeObject::atomic("reprise", MediaReference::video("r"), 1.0)
                .with_constraint(Constraint::sequenced(SequenceOperator::Contains, intro)),
        );
        let hub = space.add_node(NarrativeObject::atomic("hub", MediaReference::video("h"), 1.0));
        space.connect(hub, reprise).unwrap();
        space.connect(hub, intro).unwrap();

        let mut history: HashSet<NarrativeObjectId> = HashSet::new();
        let at = DecisionRef::Output(hub);
        assert_eq!(Solver::solve_decision::<NarrativeObjectId>(&space, &history, at), Some(vec![1]));

        history.insert(intro);
        assert_eq!(Solver::solve_decision::<NarrativeObjectId>(&space, &history, at), Some(vec![0, 1]));
    }
}
