//! Estimand builder and strategy orchestration
//!
//! Dispatches an identification query across the strategy chain
//! (backdoor, frontdoor, instrumental variables, then the general
//! algorithm) and assembles the [`IdentifiedEstimand`] returned to the
//! caller. The earlier strategies are preferred because their estimands
//! are simpler to read; the general algorithm subsumes them and runs
//! last.
//!
//! Mediation estimand types are rewritten into mediator-respecting
//! sub-queries first: severed mediator→outcome edges for the natural
//! direct effect, severed direct treatment→outcome edges for the natural
//! indirect effect, and mediators promoted into the treatment set for
//! the controlled direct effect. The same chain then runs unchanged.
//!
//! Identification failure is a value, not an error: the orchestrator
//! reports the obstructing hedge so callers can explain *why* to an end
//! user and branch, including the explicit opt-in escape hatch of a
//! caller-forced adjustment set, which is honored only after every
//! strategy has failed and is logged as unsound.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backdoor;
use crate::error::IdentificationError;
use crate::estimand::Estimand;
use crate::frontdoor;
use crate::graph::{CausalGraph, NodeId};
use crate::id_algorithm::{self, Hedge};
use crate::instrument;
use crate::query::{CausalQuery, EstimandType};

/// The closed set of identification strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Adjustment on a backdoor-admissible set
    Backdoor,
    /// Frontdoor mediation formula
    Frontdoor,
    /// Instrumental-variable witness (partial identification)
    InstrumentalVariable,
    /// General C-component decomposition
    GeneralId,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Backdoor => "backdoor",
            Strategy::Frontdoor => "frontdoor",
            Strategy::InstrumentalVariable => "instrumental-variable",
            Strategy::GeneralId => "general-id",
        };
        write!(f, "{}", name)
    }
}

/// Terminal outcome of an identification call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentificationOutcome {
    /// The effect equals a closed expression over observed distributions
    Identified { estimand: Estimand },
    /// Only an instrument witness is available; bounds are the
    /// estimation layer's business
    PartiallyIdentified { instruments: BTreeSet<String> },
    /// Every strategy failed; the obstruction explains why
    NotIdentified {
        reason: String,
        hedge: Option<Hedge>,
    },
}

/// Everything a caller learns from one identification call.
///
/// Owned by the caller; the identification core retains nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedEstimand {
    /// The query as posed
    pub query: CausalQuery,
    /// Strategy that produced the outcome, absent when none succeeded
    pub strategy: Option<Strategy>,
    /// Estimand, partial witness, or explicit not-identified marker
    pub outcome: IdentificationOutcome,
    /// Backdoor witness: the adjustment set
    pub adjustment_set: Option<BTreeSet<String>>,
    /// Frontdoor witness: the mediator set
    pub mediators: Option<BTreeSet<String>>,
    /// IV witness: the instrument set
    pub instruments: Option<BTreeSet<String>>,
    /// Set when the estimand came from a caller-forced adjustment set
    /// that no strategy licensed
    pub unsound: bool,
}

impl IdentifiedEstimand {
    /// Whether a full symbolic estimand was produced.
    pub fn is_identified(&self) -> bool {
        matches!(self.outcome, IdentificationOutcome::Identified { .. })
    }

    /// The estimand, when fully identified.
    pub fn estimand(&self) -> Option<&Estimand> {
        match &self.outcome {
            IdentificationOutcome::Identified { estimand } => Some(estimand),
            _ => None,
        }
    }
}

impl fmt::Display for IdentifiedEstimand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            IdentificationOutcome::Identified { estimand } => match self.strategy {
                Some(strategy) => write!(f, "identified via {}: {}", strategy, estimand),
                None => write!(f, "identified: {}", estimand),
            },
            IdentificationOutcome::PartiallyIdentified { instruments } => {
                let witness: Vec<&str> = instruments.iter().map(String::as_str).collect();
                write!(f, "partially identified via instruments {{{}}}", witness.join(", "))
            }
            IdentificationOutcome::NotIdentified { reason, .. } => {
                write!(f, "not identified: {}", reason)
            }
        }
    }
}

/// Identify a causal effect, the crate's main entry point.
pub fn identify_effect(
    graph: &CausalGraph,
    query: &CausalQuery,
) -> Result<IdentifiedEstimand, IdentificationError> {
    EffectIdentifier::new(graph).identify(query)
}

/// Identification engine over a borrowed, immutable graph.
///
/// Every call works on private derived views; the underlying graph is
/// never touched, so one identifier (or many) may serve concurrent
/// queries.
pub struct EffectIdentifier<'a> {
    graph: &'a CausalGraph,
}

/// A validated query lowered onto a working graph.
struct Prepared {
    working: CausalGraph,
    treatment: BTreeSet<NodeId>,
    outcome: BTreeSet<NodeId>,
}

impl<'a> EffectIdentifier<'a> {
    /// Create an identifier for the given graph.
    pub fn new(graph: &'a CausalGraph) -> Self {
        EffectIdentifier { graph }
    }

    /// Run the full strategy chain for a query.
    pub fn identify(
        &self,
        query: &CausalQuery,
    ) -> Result<IdentifiedEstimand, IdentificationError> {
        let prepared = self.prepare(query)?;
        for strategy in [
            Strategy::Backdoor,
            Strategy::Frontdoor,
            Strategy::InstrumentalVariable,
        ] {
            debug!("trying {} strategy", strategy);
            if let Some(result) = self.attempt(query, &prepared, strategy) {
                info!("identified via {} strategy", strategy);
                return Ok(result);
            }
        }
        debug!("trying {} strategy", Strategy::GeneralId);
        match id_algorithm::identify(&prepared.working, &prepared.treatment, &prepared.outcome) {
            Ok(expr) => {
                info!("identified via {} strategy", Strategy::GeneralId);
                Ok(self.assemble(query, Strategy::GeneralId, Estimand::new(expr)))
            }
            Err(hedge) => Ok(self.not_identified(query, &prepared, hedge)),
        }
    }

    /// Run exactly one strategy for a query.
    pub fn identify_with(
        &self,
        query: &CausalQuery,
        strategy: Strategy,
    ) -> Result<IdentifiedEstimand, IdentificationError> {
        let prepared = self.prepare(query)?;
        if strategy == Strategy::GeneralId {
            return match id_algorithm::identify(
                &prepared.working,
                &prepared.treatment,
                &prepared.outcome,
            ) {
                Ok(expr) => Ok(self.assemble(query, Strategy::GeneralId, Estimand::new(expr))),
                Err(hedge) => Ok(IdentifiedEstimand {
                    query: query.clone(),
                    strategy: None,
                    outcome: IdentificationOutcome::NotIdentified {
                        reason: hedge.to_string(),
                        hedge: Some(hedge),
                    },
                    adjustment_set: None,
                    mediators: None,
                    instruments: None,
                    unsound: false,
                }),
            };
        }
        match self.attempt(query, &prepared, strategy) {
            Some(result) => Ok(result),
            None => Ok(IdentifiedEstimand {
                query: query.clone(),
                strategy: None,
                outcome: IdentificationOutcome::NotIdentified {
                    reason: format!("the {} strategy found no witness", strategy),
                    hedge: None,
                },
                adjustment_set: None,
                mediators: None,
                instruments: None,
                unsound: false,
            }),
        }
    }

    /// Validate the query and lower it onto the mediator-respecting
    /// working graph for its estimand type.
    fn prepare(&self, query: &CausalQuery) -> Result<Prepared, IdentificationError> {
        if query.treatment.is_empty() || query.outcome.is_empty() {
            return Err(IdentificationError::InvalidQuery(
                "treatment and outcome sets must be nonempty".to_string(),
            ));
        }
        let treatment = self.graph.resolve_names(&query.treatment)?;
        let outcome = self.graph.resolve_names(&query.outcome)?;
        let conditioning = self.graph.resolve_names(&query.conditioning)?;
        if treatment.intersection(&outcome).next().is_some() {
            return Err(IdentificationError::InvalidQuery(
                "treatment and outcome sets overlap".to_string(),
            ));
        }
        if conditioning
            .iter()
            .any(|id| treatment.contains(id) || outcome.contains(id))
        {
            return Err(IdentificationError::InvalidQuery(
                "conditioning context overlaps treatment or outcome".to_string(),
            ));
        }
        let post_treatment = self.graph.descendants(&treatment);
        if conditioning
            .iter()
            .any(|id| post_treatment.contains(id) && !treatment.contains(id))
        {
            return Err(IdentificationError::UnsupportedQuery(
                "conditioning on a post-treatment variable is not covered by any strategy"
                    .to_string(),
            ));
        }

        if !query.estimand_type.requires_mediators() {
            return Ok(Prepared {
                working: self.graph.clone(),
                treatment,
                outcome,
            });
        }

        let mediators = match &query.mediators {
            Some(explicit) => {
                let resolved = self.graph.resolve_names(explicit)?;
                if resolved
                    .iter()
                    .any(|id| treatment.contains(id) || outcome.contains(id))
                {
                    return Err(IdentificationError::InvalidQuery(
                        "mediator set overlaps treatment or outcome".to_string(),
                    ));
                }
                resolved
            }
            None => frontdoor::on_path_nodes(self.graph, &treatment, &outcome),
        };
        if mediators.is_empty() {
            return Err(IdentificationError::InvalidQuery(format!(
                "{:?} requires a mediator set, and the graph has none",
                query.estimand_type
            )));
        }
        debug!("mediators for sub-query: {:?}", self.graph.names(&mediators));

        let prepared = match query.estimand_type {
            EstimandType::NaturalDirectEffect => Prepared {
                working: self.graph.without_edges(&mediators, &outcome),
                treatment,
                outcome,
            },
            EstimandType::NaturalIndirectEffect => Prepared {
                working: self.graph.without_edges(&treatment, &outcome),
                treatment,
                outcome,
            },
            EstimandType::ControlledDirectEffect => Prepared {
                working: self.graph.clone(),
                treatment: treatment.union(&mediators).copied().collect(),
                outcome,
            },
            EstimandType::TotalEffect => unreachable!("handled above"),
        };
        Ok(prepared)
    }

    /// Try one criterion-based strategy against the prepared sub-query.
    fn attempt(
        &self,
        query: &CausalQuery,
        prepared: &Prepared,
        strategy: Strategy,
    ) -> Option<IdentifiedEstimand> {
        let g = &prepared.working;
        let treatment_names = g.names(&prepared.treatment);
        let outcome_names = g.names(&prepared.outcome);
        match strategy {
            Strategy::Backdoor => {
                let found = backdoor::find_adjustment_set(g, &prepared.treatment, &prepared.outcome)?;
                let adjustment = g.names(&found);
                let estimand = backdoor::adjustment_estimand(
                    &treatment_names,
                    &outcome_names,
                    &adjustment,
                    &query.conditioning,
                );
                let mut result = self.assemble(query, Strategy::Backdoor, estimand);
                result.adjustment_set = Some(adjustment);
                Some(result)
            }
            Strategy::Frontdoor => {
                let found = frontdoor::find_mediator_set(g, &prepared.treatment, &prepared.outcome)?;
                let mediators = g.names(&found);
                let estimand = frontdoor::frontdoor_estimand(
                    &treatment_names,
                    &outcome_names,
                    &mediators,
                    &query.conditioning,
                );
                let mut result = self.assemble(query, Strategy::Frontdoor, estimand);
                result.mediators = Some(mediators);
                Some(result)
            }
            Strategy::InstrumentalVariable => {
                let found =
                    instrument::find_instruments(g, &prepared.treatment, &prepared.outcome)?;
                let instruments = g.names(&found);
                Some(IdentifiedEstimand {
                    query: query.clone(),
                    strategy: Some(Strategy::InstrumentalVariable),
                    outcome: IdentificationOutcome::PartiallyIdentified {
                        instruments: instruments.clone(),
                    },
                    adjustment_set: None,
                    mediators: None,
                    instruments: Some(instruments),
                    unsound: false,
                })
            }
            Strategy::GeneralId => None,
        }
    }

    fn assemble(
        &self,
        query: &CausalQuery,
        strategy: Strategy,
        estimand: Estimand,
    ) -> IdentifiedEstimand {
        IdentifiedEstimand {
            query: query.clone(),
            strategy: Some(strategy),
            outcome: IdentificationOutcome::Identified { estimand },
            adjustment_set: None,
            mediators: None,
            instruments: None,
            unsound: false,
        }
    }

    /// Total failure: report the hedge, or honor the forced-adjustment
    /// escape hatch.
    fn not_identified(
        &self,
        query: &CausalQuery,
        prepared: &Prepared,
        hedge: Hedge,
    ) -> IdentifiedEstimand {
        if let Some(forced) = &query.forced_adjustment {
            warn!(
                "no strategy licensed the effect; proceeding with caller-forced \
                 adjustment set {:?} is unsound",
                forced
            );
            let estimand = backdoor::adjustment_estimand(
                &prepared.working.names(&prepared.treatment),
                &prepared.working.names(&prepared.outcome),
                forced,
                &query.conditioning,
            );
            let mut result = self.assemble(query, Strategy::Backdoor, estimand);
            result.adjustment_set = Some(forced.clone());
            result.unsound = true;
            return result;
        }
        IdentifiedEstimand {
            query: query.clone(),
            strategy: None,
            outcome: IdentificationOutcome::NotIdentified {
                reason: hedge.to_string(),
                hedge: Some(hedge),
            },
            adjustment_set: None,
            mediators: None,
            instruments: None,
            unsound: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    /// T <- U -> Y, T -> Y
    fn confounded_graph() -> CausalGraph {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("Y").unwrap();
        g.add_node("U").unwrap();
        g.add_edge("T", "Y").unwrap();
        g.add_edge("U", "T").unwrap();
        g.add_edge("U", "Y").unwrap();
        g
    }

    /// T -> M -> Y with latent confounding T <-> Y
    fn frontdoor_graph() -> CausalGraph {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("M").unwrap();
        g.add_node("Y").unwrap();
        g.add_edge("T", "M").unwrap();
        g.add_edge("M", "Y").unwrap();
        g.add_bidirected("T", "Y").unwrap();
        g
    }

    /// T -> M -> Y, T -> Y, no confounding
    fn mediation_graph() -> CausalGraph {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("M").unwrap();
        g.add_node("Y").unwrap();
        g.add_edge("T", "M").unwrap();
        g.add_edge("M", "Y").unwrap();
        g.add_edge("T", "Y").unwrap();
        g
    }

    /// T <-> Y only
    fn bow_free_latent_graph() -> CausalGraph {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("Y").unwrap();
        g.add_bidirected("T", "Y").unwrap();
        g
    }

    #[test]
    fn test_backdoor_dispatch() {
        let g = confounded_graph();
        let result = identify_effect(&g, &CausalQuery::total_effect("T", "Y")).unwrap();
        assert_eq!(result.strategy, Some(Strategy::Backdoor));
        assert_eq!(result.estimand().unwrap().render(), "Σ_{U} P(Y|T,U)·P(U)");
        let witness: BTreeSet<String> = ["U".to_string()].into_iter().collect();
        assert_eq!(result.adjustment_set, Some(witness));
    }

    #[test]
    fn test_chain_identified_trivially() {
        let mut g = CausalGraph::new();
        g.add_node("T").unwrap();
        g.add_node("M").unwrap();
        g.add_node("Y").unwrap();
        g.add_edge("T", "M").unwrap();
        g.add_edge("M", "Y").unwrap();
        let result = identify_effect(&g, &CausalQuery::total_effect("T", "Y")).unwrap();
        assert_eq!(result.strategy, Some(Strategy::Backdoor));
        assert_eq!(result.adjustment_set, Some(BTreeSet::new()));
        assert_eq!(result.estimand().unwrap().render(), "P(Y|T)");
    }

    #[test]
    fn test_frontdoor_dispatch() {
        let g = frontdoor_graph();
        let result = identify_effect(&g, &CausalQuery::total_effect("T", "Y")).unwrap();
        assert_eq!(result.strategy, Some(Strategy::Frontdoor));
        let witness: BTreeSet<String> = ["M".to_string()].into_iter().collect();
        assert_eq!(result.mediators, Some(witness));
        assert_eq!(
            result.estimand().unwrap().render(),
            "Σ_{M} P(M|T)·(Σ_{T'} P(Y|M,T')·P(T'))"
        );
    }

    #[test]
    fn test_instrument_dispatch() {
        let mut g = CausalGraph::new();
        g.add_node("I").unwrap();
        g.add_node("T").unwrap();
        g.add_node("Y").unwrap();
        g.add_edge("I", "T").unwrap();
        g.add_edge("T", "Y").unwrap();
        g.add_bidirected("T", "Y").unwrap();
        let result = identify_effect(&g, &CausalQuery::total_effect("T", "Y")).unwrap();
        assert_eq!(result.strategy, Some(Strategy::InstrumentalVariable));
        assert!(!result.is_identified());
        let witness: BTreeSet<String> = ["I".to_string()].into_iter().collect();
        assert_eq!(result.instruments, Some(witness.clone()));
        assert_eq!(
            result.outcome,
            IdentificationOutcome::PartiallyIdentified {
                instruments: witness
            }
        );
    }

    #[test]
    fn test_full_latent_confounding_not_identified() {
        let g = bow_free_latent_graph();
        let result = identify_effect(&g, &CausalQuery::total_effect("T", "Y")).unwrap();
        assert_eq!(result.strategy, None);
        match &result.outcome {
            IdentificationOutcome::NotIdentified { hedge, .. } => {
                let hedge = hedge.as_ref().expect("hedge witness");
                let span: BTreeSet<String> =
                    ["T".to_string(), "Y".to_string()].into_iter().collect();
                assert_eq!(hedge.component, span);
            }
            other => panic!("expected not-identified, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_query_rejected() {
        let g = confounded_graph();
        let query = CausalQuery::total_effect("T", "T");
        assert!(matches!(
            identify_effect(&g, &query),
            Err(IdentificationError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_unknown_node_is_graph_error() {
        let g = confounded_graph();
        let query = CausalQuery::total_effect("T", "Z");
        assert!(matches!(
            identify_effect(&g, &query),
            Err(IdentificationError::InvalidGraph(GraphError::NodeNotFound(_)))
        ));
    }

    #[test]
    fn test_post_treatment_conditioning_unsupported() {
        let g = mediation_graph();
        let query = CausalQuery::total_effect("T", "Y").given("M");
        assert!(matches!(
            identify_effect(&g, &query),
            Err(IdentificationError::UnsupportedQuery(_))
        ));
    }

    #[test]
    fn test_forced_adjustment_is_unsound_escape_hatch() {
        let g = bow_free_latent_graph();
        let query = CausalQuery::total_effect("T", "Y").with_forced_adjustment(["W"]);
        let mut g = g;
        g.add_node("W").unwrap();
        let result = identify_effect(&g, &query).unwrap();
        assert!(result.unsound);
        assert_eq!(result.strategy, Some(Strategy::Backdoor));
        assert_eq!(result.estimand().unwrap().render(), "Σ_{W} P(Y|T,W)·P(W)");
    }

    #[test]
    fn test_controlled_direct_effect_promotes_mediators() {
        let g = mediation_graph();
        let query = CausalQuery::new(["T"], ["Y"], EstimandType::ControlledDirectEffect);
        let result = identify_effect(&g, &query).unwrap();
        assert_eq!(result.strategy, Some(Strategy::Backdoor));
        assert_eq!(result.estimand().unwrap().render(), "P(Y|M,T)");
    }

    #[test]
    fn test_natural_direct_effect_severs_mediated_paths() {
        let g = mediation_graph();
        let query = CausalQuery::new(["T"], ["Y"], EstimandType::NaturalDirectEffect);
        let result = identify_effect(&g, &query).unwrap();
        assert_eq!(result.strategy, Some(Strategy::Backdoor));
        assert_eq!(result.estimand().unwrap().render(), "P(Y|T)");
    }

    #[test]
    fn test_mediation_without_mediator_rejected() {
        let g = confounded_graph();
        let query = CausalQuery::new(["T"], ["Y"], EstimandType::NaturalIndirectEffect);
        assert!(matches!(
            identify_effect(&g, &query),
            Err(IdentificationError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_identify_with_general_id() {
        let g = confounded_graph();
        let identifier = EffectIdentifier::new(&g);
        let result = identifier
            .identify_with(&CausalQuery::total_effect("T", "Y"), Strategy::GeneralId)
            .unwrap();
        assert_eq!(result.strategy, Some(Strategy::GeneralId));
        assert_eq!(result.estimand().unwrap().render(), "Σ_{U} P(Y|T,U)·P(U)");
    }

    #[test]
    fn test_identify_with_frontdoor_misses() {
        let g = confounded_graph();
        let identifier = EffectIdentifier::new(&g);
        let result = identifier
            .identify_with(&CausalQuery::total_effect("T", "Y"), Strategy::Frontdoor)
            .unwrap();
        assert!(!result.is_identified());
        assert!(matches!(
            result.outcome,
            IdentificationOutcome::NotIdentified { hedge: None, .. }
        ));
    }

    #[test]
    fn test_display_summarizes() {
        let g = confounded_graph();
        let result = identify_effect(&g, &CausalQuery::total_effect("T", "Y")).unwrap();
        assert_eq!(
            result.to_string(),
            "identified via backdoor: Σ_{U} P(Y|T,U)·P(U)"
        );
    }
}
