//! Causal queries and estimand types
//!
//! A query names a treatment set and an outcome set, picks the causal
//! quantity to identify, and may carry caller-supplied context: an
//! effect-modifier conditioning set, an explicit mediator set for the
//! mediation estimand types, or a forced adjustment set (the unsound
//! escape hatch honored only after every strategy has failed).
//!
//! Queries are immutable once constructed; builders consume `self`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The causal quantity a query asks for.
///
/// Each variant fixes the do-calculus target expression and the sub-graph
/// manipulation the estimand builder applies before dispatching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimandType {
    /// Total (average) effect of treatment on outcome
    TotalEffect,
    /// Natural direct effect: paths not through the mediators
    NaturalDirectEffect,
    /// Natural indirect effect: paths through the mediators
    NaturalIndirectEffect,
    /// Controlled direct effect: mediators held fixed by intervention
    ControlledDirectEffect,
}

impl EstimandType {
    /// Whether this estimand type needs a mediator set.
    pub fn requires_mediators(self) -> bool {
        !matches!(self, EstimandType::TotalEffect)
    }
}

/// An identification query: what effect of what on what, in what context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalQuery {
    /// Treatment variables
    pub treatment: BTreeSet<String>,
    /// Outcome variables
    pub outcome: BTreeSet<String>,
    /// Causal quantity requested
    pub estimand_type: EstimandType,
    /// Effect-modifier context the final estimand conditions on
    pub conditioning: BTreeSet<String>,
    /// Explicit mediator set; defaults to all nodes on directed
    /// treatment → outcome paths when absent
    pub mediators: Option<BTreeSet<String>>,
    /// Caller-forced adjustment set, applied (and logged as unsound)
    /// only when every strategy fails
    pub forced_adjustment: Option<BTreeSet<String>>,
}

impl CausalQuery {
    /// Create a query over treatment and outcome sets.
    pub fn new<T, Y>(treatment: T, outcome: Y, estimand_type: EstimandType) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        Y: IntoIterator,
        Y::Item: Into<String>,
    {
        CausalQuery {
            treatment: treatment.into_iter().map(Into::into).collect(),
            outcome: outcome.into_iter().map(Into::into).collect(),
            estimand_type,
            conditioning: BTreeSet::new(),
            mediators: None,
            forced_adjustment: None,
        }
    }

    /// Total-effect query for a single treatment/outcome pair.
    pub fn total_effect(treatment: impl Into<String>, outcome: impl Into<String>) -> Self {
        CausalQuery::new([treatment.into()], [outcome.into()], EstimandType::TotalEffect)
    }

    /// Add an effect-modifier conditioning variable.
    pub fn given(mut self, var: impl Into<String>) -> Self {
        self.conditioning.insert(var.into());
        self
    }

    /// Supply an explicit mediator set.
    pub fn with_mediators<M>(mut self, mediators: M) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
    {
        self.mediators = Some(mediators.into_iter().map(Into::into).collect());
        self
    }

    /// Supply a forced adjustment set, the explicit opt-in escape hatch.
    pub fn with_forced_adjustment<Z>(mut self, adjustment: Z) -> Self
    where
        Z: IntoIterator,
        Z::Item: Into<String>,
    {
        self.forced_adjustment = Some(adjustment.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let query = CausalQuery::total_effect("T", "Y")
            .given("W")
            .with_mediators(["M"]);
        assert!(query.treatment.contains("T"));
        assert!(query.outcome.contains("Y"));
        assert_eq!(query.estimand_type, EstimandType::TotalEffect);
        assert!(query.conditioning.contains("W"));
        assert_eq!(query.mediators.as_ref().map(|m| m.len()), Some(1));
        assert!(query.forced_adjustment.is_none());
    }

    #[test]
    fn test_requires_mediators() {
        assert!(!EstimandType::TotalEffect.requires_mediators());
        assert!(EstimandType::NaturalDirectEffect.requires_mediators());
        assert!(EstimandType::NaturalIndirectEffect.requires_mediators());
        assert!(EstimandType::ControlledDirectEffect.requires_mediators());
    }
}
