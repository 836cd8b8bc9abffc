// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constraint predicates over variable-store state and sequencing history.
//!
//! Evaluation is pure: it reads the narrative space and the sequencer's
//! history and never mutates either. A nested constraint is only evaluated
//! once its parent resolved true, and the results are ANDed.

use crate::node::NarrativeObjectId;
use crate::space::NarrativeSpace;
use crate::variable::{FromVariable, VariableStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::BuildHasher;

/// Where a constraint looks up its variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VariableScope {
    /// The narrative space's global store
    #[default]
    Global,
    /// The store of the candidate node being evaluated
    NarrativeObjectLocal,
}

/// Variable a constraint reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRef {
    /// Variable name
    pub name: String,
    /// Lookup scope
    #[serde(default)]
    pub scope: VariableScope,
}

impl VariableRef {
    /// Reference a global variable
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: VariableScope::Global,
        }
    }

    /// Reference a node-local variable
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: VariableScope::NarrativeObjectLocal,
        }
    }
}

/// Operators for bool constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualityOperator {
    /// `==`
    EqualTo,
    /// `!=`
    NotEqualTo,
}

/// Operators for numeric and date-time constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingOperator {
    /// `==`
    EqualTo,
    /// `!=`
    NotEqualTo,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,
}

impl OrderingOperator {
    fn holds(self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        let Some(ordering) = ordering else {
            // NaN compares unordered
            return self == Self::NotEqualTo;
        };
        match self {
            Self::EqualTo => ordering == Equal,
            Self::NotEqualTo => ordering != Equal,
            Self::LessThan => ordering == Less,
            Self::GreaterThan => ordering == Greater,
            Self::LessOrEqual => ordering != Greater,
            Self::GreaterOrEqual => ordering != Less,
        }
    }
}

/// Operators for string constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringOperator {
    /// Exact match
    EqualTo,
    /// Not an exact match
    NotEqualTo,
    /// Variable contains the reference text
    Contains,
    /// Variable does not contain the reference text
    DoesNotContain,
}

/// Operators for sequencing-history constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceOperator {
    /// The target has already been sequenced ("only after target")
    Contains,
    /// The target has not been sequenced yet ("only before target")
    DoesNotContain,
}

/// Variant-specific predicate data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Compare a bool variable
    Bool {
        /// Variable to read
        variable: VariableRef,
        /// Comparison
        op: EqualityOperator,
        /// Reference value
        value: bool,
    },
    /// Compare an int variable
    Int {
        /// Variable to read
        variable: VariableRef,
        /// Comparison
        op: OrderingOperator,
        /// Reference value
        value: i64,
    },
    /// Compare a float variable
    Float {
        /// Variable to read
        variable: VariableRef,
        /// Comparison
        op: OrderingOperator,
        /// Reference value
        value: f64,
    },
    /// Compare a string variable
    String {
        /// Variable to read
        variable: VariableRef,
        /// Comparison
        op: StringOperator,
        /// Reference value
        value: String,
    },
    /// Compare a date-time variable
    DateTime {
        /// Variable to read
        variable: VariableRef,
        /// Comparison
        op: OrderingOperator,
        /// Reference value
        value: DateTime<Utc>,
    },
    /// Test whether a node has been sequenced
    NarrativeObject {
        /// Membership test
        op: SequenceOperator,
        /// Node looked up in the sequencer's history
        target: NarrativeObjectId,
    },
}

/// Sequencing history a constraint may query
pub trait SequenceHistory {
    /// Whether the node has been scheduled at least once
    fn has_been_sequenced(&self, node: NarrativeObjectId) -> bool;
}

impl<S: BuildHasher> SequenceHistory for HashSet<NarrativeObjectId, S> {
    fn has_been_sequenced(&self, node: NarrativeObjectId) -> bool {
        self.contains(&node)
    }
}

impl<S: BuildHasher> SequenceHistory for indexmap::IndexSet<NarrativeObjectId, S> {
    fn has_been_sequenced(&self, node: NarrativeObjectId) -> bool {
        self.contains(&node)
    }
}

/// Everything a constraint reads during evaluation
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// The narrative space (global and local variables)
    pub space: &'a NarrativeSpace,
    /// Sequencing history
    pub history: &'a dyn SequenceHistory,
    /// Candidate node whose local store backs local-scope lookups
    pub subject: Option<NarrativeObjectId>,
}

impl<'a> EvaluationContext<'a> {
    /// Create an evaluation context
    pub fn new(
        space: &'a NarrativeSpace,
        history: &'a dyn SequenceHistory,
        subject: Option<NarrativeObjectId>,
    ) -> Self {
        Self {
            space,
            history,
            subject,
        }
    }

    fn store(&self, scope: VariableScope) -> Option<&'a VariableStore> {
        match scope {
            VariableScope::Global => Some(self.space.globals()),
            VariableScope::NarrativeObjectLocal => self
                .subject
                .and_then(|id| self.space.node(id))
                .map(|node| &node.variables),
        }
    }
}

/// A predicate with optional nested predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Predicate data
    pub kind: ConstraintKind,
    /// Evaluated only when this constraint holds
    #[serde(default)]
    pub nested: Vec<Constraint>,
}

impl Constraint {
    /// Create a constraint
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            kind,
            nested: Vec::new(),
        }
    }

    /// Bool variable comparison
    pub fn bool(variable: VariableRef, op: EqualityOperator, value: bool) -> Self {
        Self::new(ConstraintKind::Bool {
            variable,
            op,
            value,
        })
    }

    /// Int variable comparison
    pub fn int(variable: VariableRef, op: OrderingOperator, value: i64) -> Self {
        Self::new(ConstraintKind::Int {
            variable,
            op,
            value,
        })
    }

    /// Float variable comparison
    pub fn float(variable: VariableRef, op: OrderingOperator, value: f64) -> Self {
        Self::new(ConstraintKind::Float {
            variable,
            op,
            value,
        })
    }

    /// String variable comparison
    pub fn string(variable: VariableRef, op: StringOperator, value: impl Into<String>) -> Self {
        Self::new(ConstraintKind::String {
            variable,
            op,
            value: value.into(),
        })
    }

    /// Date-time variable comparison
    pub fn date_time(variable: VariableRef, op: OrderingOperator, value: DateTime<Utc>) -> Self {
        Self::new(ConstraintKind::DateTime {
            variable,
            op,
            value,
        })
    }

    /// Sequencing history test
    pub fn sequenced(op: SequenceOperator, target: NarrativeObjectId) -> Self {
        Self::new(ConstraintKind::NarrativeObject { op, target })
    }

    /// Add a nested constraint
    pub fn with_nested(mut self, constraint: Constraint) -> Self {
        self.nested.push(constraint);
        self
    }

    /// Evaluate this constraint, then its nested constraints if it holds
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> bool {
        self.evaluate_own(ctx) && self.nested.iter().all(|c| c.evaluate(ctx))
    }

    fn evaluate_own(&self, ctx: &EvaluationContext<'_>) -> bool {
        match &self.kind {
            ConstraintKind::Bool {
                variable,
                op,
                value,
            } => compare_all::<bool>(ctx, variable, |v| match op {
                EqualityOperator::EqualTo => v == *value,
                EqualityOperator::NotEqualTo => v != *value,
            }),
            ConstraintKind::Int {
                variable,
                op,
                value,
            } => compare_all::<i64>(ctx, variable, |v| op.holds(v.partial_cmp(value))),
            ConstraintKind::Float {
                variable,
                op,
                value,
            } => compare_all::<f64>(ctx, variable, |v| op.holds(v.partial_cmp(value))),
            ConstraintKind::String {
                variable,
                op,
                value,
            } => compare_all::<String>(ctx, variable, |v| match op {
                StringOperator::EqualTo => v == *value,
                StringOperator::NotEqualTo => v != *value,
                StringOperator::Contains => v.contains(value.as_str()),
                StringOperator::DoesNotContain => !v.contains(value.as_str()),
            }),
            ConstraintKind::DateTime {
                variable,
                op,
                value,
            } => compare_all::<DateTime<Utc>>(ctx, variable, |v| op.holds(v.partial_cmp(value))),
            ConstraintKind::NarrativeObject { op, target } => {
                let sequenced = ctx.history.has_been_sequenced(*target);
                match op {
                    SequenceOperator::Contains => sequenced,
                    SequenceOperator::DoesNotContain => !sequenced,
                }
            }
        }
    }
}

/// Every variable of the name and type must satisfy the comparison.
/// Fails closed when none exists.
fn compare_all<T: FromVariable>(
    ctx: &EvaluationContext<'_>,
    variable: &VariableRef,
    compare: impl FnMut(T) -> bool,
) -> bool {
    let Some(store) = ctx.store(variable.scope) else {
        tracing::warn!(
            variable = %variable.name,
            subject = ?ctx.subject,
            "Constraint has no variable store to read from"
        );
        return false;
    };

    let values = store.get_variables::<T>(&variable.name);
    if values.is_empty() {
        tracing::warn!(
            variable = %variable.name,
            scope = ?variable.scope,
            kind = T::KIND.name(),
            "Constraint variable not found"
        );
        return false;
    }
    values.into_iter().all(compare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MediaReference, NarrativeObject};
    use crate::variable::Variable;

    fn space_with_globals() -> NarrativeSpace {
        let mut space = NarrativeSpace::new("test");
        space.globals_mut().add_variable(Variable::new("chapter", 2_i64));
        space.globals_mut().add_variable(Variable::new("mood", "gloomy rain"));
        space.globals_mut().add_variable(Variable::new("lights", true));
        space
    }

    #[test]
    fn test_global_comparisons() {
        let space = space_with_globals();
        let history: HashSet<NarrativeObjectId> = HashSet::new();
        let ctx = EvaluationContext::new(&space, &history, None);

        assert!(Constraint::int(VariableRef::global("chapter"), OrderingOperator::GreaterOrEqual, 2).evaluate(&ctx));
        assert!(!Constraint::int(VariableRef::global("chapter"), OrderingOperator::LessThan, 2).evaluate(&ctx));
        assert!(Constraint::string(VariableRef::global("mood"), StringOperator::Contains, "rain").evaluate(&ctx));
        assert!(Constraint::bool(VariableRef::global("lights"), EqualityOperator::EqualTo, true).evaluate(&ctx));
    }

    #[test]
    fn test_missing_variable_fails_closed() {
        let space = space_with_globals();
        let history: HashSet<NarrativeObjectId> = HashSet::new();
        let ctx = EvaluationContext::new(&space, &history, None);

        assert!(!Constraint::int(VariableRef::global("nope"), OrderingOperator::NotEqualTo, 0).evaluate(&ctx));
        // Wrong type counts as not found
        assert!(!Constraint::bool(VariableRef::global("chapter"), EqualityOperator::NotEqualTo, true).evaluate(&ctx));
        // Local scope without a subject
        assert!(!Constraint::int(VariableRef::local("chapter"), OrderingOperator::EqualTo, 2).evaluate(&ctx));
    }

    #[test]
    fn test_nested_constraints_are_anded() {
        let space = space_with_globals();
        let history: HashSet<NarrativeObjectId> = HashSet::new();
        let ctx = EvaluationContext::new(&space, &history, None);

        let passing = Constraint::int(VariableRef::global("chapter"), OrderingOperator::EqualTo, 2)
            .with_nested(Constraint::bool(VariableRef::global("lights"), EqualityOperator::EqualTo, true));
        let failing_nested = Constraint::int(VariableRef::global("chapter"), OrderingOperator::EqualTo, 2)
            .with_nested(Constraint::bool(VariableRef::global("lights"), EqualityOperator::EqualTo, false));

        assert!(passing.evaluate(&ctx));
        assert!(!failing_nested.evaluate(&ctx));
    }

    #[test]
    fn test_local_scope_reads_subject_and_checks_all_matches() {
        let mut space = NarrativeSpace::new("test");
        let node = NarrativeObject::atomic("a", MediaReference::video("a.mp4"), 1.0)
            .with_variable(Variable::new("weight", 1.5))
            .with_variable(Variable::new("weight", 3.0));
        let id = space.add_node(node);
        let history: HashSet<NarrativeObjectId> = HashSet::new();
        let ctx = EvaluationContext::new(&space, &history, Some(id));

        assert!(Constraint::float(VariableRef::local("weight"), OrderingOperator::GreaterThan, 1.0).evaluate(&ctx));
        // One instance fails, so the constraint fails
        assert!(!Constraint::float(VariableRef::local("weight"), OrderingOperator::GreaterThan, 2.0).evaluate(&ctx));
    }

    #[test]
    fn test_sequence_history_constraint() {
        let space = NarrativeSpace::new("test");
        let seen = NarrativeObjectId::new();
        let unseen = NarrativeObjectId::new();
        let mut history: HashSet<NarrativeObjectId> = HashSet::new();
        history.insert(seen);
        let ctx = EvaluationContext::new(&space, &history, None);

        assert!(Constraint::sequenced(SequenceOperator::Contains, seen).evaluate(&ctx));
        assert!(!Constraint::sequenced(SequenceOperator::Contains, unseen).evaluate(&ctx));
        assert!(Constraint::sequenced(SequenceOperator::DoesNotContain, unseen).evaluate(&ctx));
    }

    #[test]
    fn test_date_time_ordering() {
        let mut space = NarrativeSpace::new("test");
        let opened = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        space.globals_mut().add_variable(Variable::new("opened", opened));
        let history: HashSet<NarrativeObjectId> = HashSet::new();
        let ctx = EvaluationContext::new(&space, &history, None);

        let later = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z").unwrap().with_timezone(&Utc);
        assert!(Constraint::date_time(VariableRef::global("opened"), OrderingOperator::LessThan, later).evaluate(&ctx));
        assert!(!Constraint::date_time(VariableRef::global("opened"), OrderingOperator::GreaterOrEqual, later).evaluate(&ctx));
    }
}
